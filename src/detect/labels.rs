use std::collections::BTreeSet;

use crate::detect::bounds::DetectionSet;
use crate::error::{ConfigError, DetectError};

/// 类别标签表，下标即class_id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { labels: labels.into_iter().map(Into::into).collect() }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// 按下标查找标签，越界返回`OutOfRangeClass`
    pub fn label(&self, class_id: usize) -> Result<&str, DetectError> {
        self.labels
            .get(class_id)
            .map(String::as_str)
            .ok_or(DetectError::OutOfRangeClass { class_id, table_len: self.labels.len() })
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|label| label == name)
    }

    /// 检查一帧结果中的所有类别是否都在表内
    pub fn check(&self, detections: &DetectionSet) -> Result<(), DetectError> {
        for detection in detections {
            self.label(detection.class_id)?;
        }
        Ok(())
    }
}

/// 报警规则：帧内出现任一可报警类别即为真
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertRule {
    alertable: BTreeSet<usize>,
}

impl AlertRule {
    /// 由类别名构建，未知类别名视为配置错误
    pub fn from_names<S: AsRef<str>>(labels: &LabelTable, names: &[S]) -> Result<Self, ConfigError> {
        let mut alertable = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let index = labels
                .index_of(name)
                .ok_or_else(|| ConfigError::Invalid(format!("报警类别 {name} 不在标签表中")))?;
            alertable.insert(index);
        }
        Ok(Self { alertable })
    }

    /// 标签表中的全部类别都可报警
    pub fn all(labels: &LabelTable) -> Self {
        Self { alertable: (0..labels.len()).collect() }
    }

    pub fn is_alertable(&self, class_id: usize) -> bool {
        self.alertable.contains(&class_id)
    }

    pub fn evaluate(&self, detections: &DetectionSet) -> bool {
        detections.iter().any(|d| self.is_alertable(d.class_id))
    }
}
