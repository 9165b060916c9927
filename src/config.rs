use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::alert::AlertPolicy;
use crate::error::ConfigError;

pub const DEFAULT_MODEL_PATH: &str = "yolov5_highway_n_320.onnx";
pub const DEFAULT_STREAMS: [&str; 2] = ["highway4", "highway"];
pub const DEFAULT_CLASSES: [&str; 2] = ["car", "trunk"];

// 目标检测超参数配置
pub const DEFAULT_INPUT_SIZE: u32 = 320;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.45;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.3;
pub const DEFAULT_SNAPSHOT_EVERY: u64 = 30;

pub const ENV_MODEL: &str = "ROADWATCH_MODEL";
pub const ENV_STREAMS: &str = "ROADWATCH_STREAMS";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    model_path: Option<PathBuf>,
    streams: Option<Vec<String>>,
    classes: Option<Vec<String>>,
    alertable: Option<Vec<String>>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    alert_policy: Option<AlertPolicy>,
    snapshots: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct SnapshotConfigFile {
    dir: Option<PathBuf>,
    every: Option<u64>,
}

/// 标注帧保存配置
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSettings {
    pub dir: PathBuf,
    pub every: u64,
}

/// 运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// 模型文件路径
    pub model_path: PathBuf,
    /// 视频源标识列表，每个一路工作线程
    pub streams: Vec<String>,
    /// 类别标签表，下标即class_id
    pub classes: Vec<String>,
    /// 可报警的类别名
    pub alertable: Vec<String>,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub alert_policy: AlertPolicy,
    /// 为空时不保存标注帧
    pub snapshots: Option<SnapshotSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl AppConfig {
    /// 读取配置文件（可选），再应用环境变量覆盖并校验
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file);
        cfg.apply_env(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从TOML文本解析，不读取环境变量
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|source| ConfigError::Parse { path: "<inline>".to_string(), source })?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let classes = file
            .classes
            .unwrap_or_else(|| DEFAULT_CLASSES.iter().map(|c| c.to_string()).collect());
        let alertable = file.alertable.unwrap_or_else(|| classes.clone());
        let snapshots = file.snapshots.and_then(|snap| {
            snap.dir.map(|dir| SnapshotSettings {
                dir,
                every: snap.every.unwrap_or(DEFAULT_SNAPSHOT_EVERY),
            })
        });

        Self {
            model_path: file.model_path.unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            streams: file
                .streams
                .unwrap_or_else(|| DEFAULT_STREAMS.iter().map(|s| s.to_string()).collect()),
            classes,
            alertable,
            input_size: file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence_threshold: file.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            iou_threshold: file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            alert_policy: file.alert_policy.unwrap_or_default(),
            snapshots,
        }
    }

    /// 环境变量覆盖，`lookup`按变量名取值
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(ENV_MODEL) {
            if !model.trim().is_empty() {
                self.model_path = PathBuf::from(model.trim());
            }
        }
        if let Some(streams) = lookup(ENV_STREAMS) {
            let parsed = split_csv(&streams);
            if !parsed.is_empty() {
                self.streams = parsed;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streams.is_empty() {
            return Err(ConfigError::Invalid("至少需要一路视频源".to_string()));
        }
        if self.classes.is_empty() {
            return Err(ConfigError::Invalid("类别标签表不能为空".to_string()));
        }
        if self.input_size == 0 {
            return Err(ConfigError::Invalid("input_size 必须大于0".to_string()));
        }
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} 必须在 [0, 1] 之间: {value}")));
            }
        }
        if let Some(unknown) = self.alertable.iter().find(|name| !self.classes.contains(*name)) {
            return Err(ConfigError::Invalid(format!("报警类别 {unknown} 不在标签表中")));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
