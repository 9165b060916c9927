//! 模型输出后处理模块
//!
//! 负责置信度过滤、按类别分组、坐标转换以及逐类别的非极大值抑制(NMS)。

use crate::detect::bounds::{CenterBox, Detection, DetectionSet};
use crate::detect::labels::LabelTable;
use crate::detect::nms::suppress;
use crate::error::DetectError;

/// 每个候选框前5列：cx, cy, w, h, objectness
pub const BOX_FIELDS: usize = 5;

/// 模型原始输出
///
/// 固定形状 `[N, 5 + C]` 的行主序数据，在构造时校验一次。
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrediction {
    data: Vec<f32>,
    num_candidates: usize,
    fields: usize,
}

impl RawPrediction {
    /// 由推理引擎输出的 `[1, N, F]` 张量构造
    ///
    /// # 错误处理
    /// 形状不是三维、batch不为1、每行字段少于6个或数据长度不符时返回`ShapeMismatch`
    pub fn from_shape(shape: &[i64], data: &[f32]) -> Result<Self, DetectError> {
        let mismatch = || DetectError::ShapeMismatch { shape: shape.to_vec(), len: data.len() };

        let [batch, candidates, fields] = shape else {
            return Err(mismatch());
        };
        if *batch != 1 || *candidates < 0 || *fields <= BOX_FIELDS as i64 {
            return Err(mismatch());
        }
        let (num_candidates, fields) = (*candidates as usize, *fields as usize);
        if num_candidates.checked_mul(fields) != Some(data.len()) {
            return Err(mismatch());
        }

        Ok(Self { data: data.to_vec(), num_candidates, fields })
    }

    /// 由逐行数据构造，各行长度必须一致且大于5
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, DetectError> {
        let fields = rows.first().map(Vec::len).unwrap_or(BOX_FIELDS + 1);
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        if rows.iter().any(|row| row.len() != fields) {
            return Err(DetectError::ShapeMismatch {
                shape: vec![1, rows.len() as i64, fields as i64],
                len: data.len(),
            });
        }
        Self::from_shape(&[1, rows.len() as i64, fields as i64], &data)
    }

    /// 没有任何候选框的输出
    pub fn empty(num_classes: usize) -> Self {
        Self { data: Vec::new(), num_candidates: 0, fields: BOX_FIELDS + num_classes.max(1) }
    }

    pub fn num_candidates(&self) -> usize {
        self.num_candidates
    }

    pub fn num_classes(&self) -> usize {
        self.fields - BOX_FIELDS
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.fields)
    }
}

/// 通过置信度过滤后的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub center: CenterBox,
    pub objectness: f32,
    pub class_id: usize,
}

impl Candidate {
    fn from_row(row: &[f32]) -> Self {
        Self {
            center: CenterBox::new(row[0], row[1], row[2], row[3]),
            objectness: row[4],
            class_id: argmax(&row[BOX_FIELDS..]),
        }
    }
}

/// 取最大值的下标，相等时取第一个，NaN不会胜出
fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] || (scores[best].is_nan() && !score.is_nan()) {
            best = i;
        }
    }
    best
}

/// 解码一帧模型输出
///
/// 1. 丢弃 objectness 不大于 `conf_threshold` 的候选框
/// 2. 按类别分组，组的顺序为类别首次出现的顺序
/// 3. 每组转换为左上/右下形式后单独做NMS
///
/// 排序和输出使用的分数都是 objectness，类别分数不参与相乘。
///
/// # 参数
/// * `raw` - 模型原始输出
/// * `conf_threshold` - 置信度阈值
/// * `iou_threshold` - NMS阈值
///
/// # 返回值
/// 检测结果集合，没有候选框时为空集合
///
/// # 示例
///
/// ```
/// use roadwatch::detect::posts::{decode, RawPrediction};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // 两个类别，第二行objectness未超过阈值
/// let raw = RawPrediction::from_rows(&[
///     vec![16.0, 16.0, 8.0, 8.0, 0.8, 0.1, 0.9],
///     vec![40.0, 40.0, 8.0, 8.0, 0.3, 0.9, 0.1],
/// ])?;
/// let detections = decode(&raw, 0.45, 0.3);
/// assert_eq!(detections.len(), 1);
/// assert_eq!(detections.get(0).map(|d| d.class_id), Some(1));
/// # Ok(())
/// # }
/// ```
pub fn decode(raw: &RawPrediction, conf_threshold: f32, iou_threshold: f32) -> DetectionSet {
    let mut groups: Vec<(usize, Vec<Candidate>)> = Vec::new();

    for row in raw.rows() {
        let objectness = row[4];
        if objectness.is_nan() || objectness <= conf_threshold {
            continue;
        }
        let candidate = Candidate::from_row(row);
        match groups.iter_mut().find(|(class_id, _)| *class_id == candidate.class_id) {
            Some((_, group)) => group.push(candidate),
            None => groups.push((candidate.class_id, vec![candidate])),
        }
    }

    let mut detections = DetectionSet::new();
    for (class_id, group) in &groups {
        let boxes: Vec<_> = group.iter().map(|c| c.center.to_corner_form()).collect();
        let scores: Vec<_> = group.iter().map(|c| c.objectness).collect();

        for index in suppress(&boxes, &scores, iou_threshold) {
            detections.push(Detection::new(boxes[index], scores[index], *class_id));
        }
    }
    detections
}

/// 带标签表的解码器
///
/// 在`decode`之后校验所有类别下标，越界的帧整体作废。
#[derive(Debug, Clone)]
pub struct Decoder {
    confidence_threshold: f32,
    iou_threshold: f32,
    labels: LabelTable,
}

impl Decoder {
    pub fn new(labels: LabelTable, confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self { confidence_threshold, iou_threshold, labels }
    }

    pub fn decode(&self, raw: &RawPrediction) -> Result<DetectionSet, DetectError> {
        let detections = decode(raw, self.confidence_threshold, self.iou_threshold);
        self.labels.check(&detections)?;
        Ok(detections)
    }
}
