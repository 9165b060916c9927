//! 非极大值抑制(NMS)
//!
//! 只处理同一类别的候选框，不同类别的框永远不会互相抑制。

use crate::detect::bounds::BoundingBox;

/// 按像素包含约定计算两个边界框的IoU
///
/// 交集宽高为 `max(0, x2 - x1 + 1)`，并集面积为两框面积之和减去交集。
/// 并集不大于0时返回0。
pub fn pixel_iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x_left = a.x1.max(b.x1);
    let y_top = a.y1.max(b.y1);
    let x_right = a.x2.min(b.x2);
    let y_bottom = a.y2.min(b.y2);

    let inter = (x_right - x_left + 1.0).max(0.0) * (y_bottom - y_top + 1.0).max(0.0);
    let union = a.pixel_area() + b.pixel_area() - inter;
    if union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// 应用非极大值抑制
///
/// 按分数降序（稳定排序，分数相同时保留先出现的下标）依次选出最高分的框，
/// 并删除与其IoU大于阈值的其余候选框。
///
/// # 参数
/// * `boxes` - 同一类别的候选框（左上/右下形式）
/// * `scores` - 与`boxes`一一对应的分数
/// * `threshold` - IoU阈值
///
/// # 返回值
/// 保留下来的下标，按选中顺序（分数从高到低）排列
///
/// # 示例
///
/// ```
/// use roadwatch::detect::{suppress, BoundingBox};
///
/// let boxes = [
///     BoundingBox::new(1.0, 1.0, 10.0, 10.0),
///     BoundingBox::new(0.0, 0.0, 10.0, 10.0),
///     BoundingBox::new(50.0, 50.0, 60.0, 60.0),
/// ];
/// let keep = suppress(&boxes, &[0.8, 0.9, 0.5], 0.3);
/// assert_eq!(keep, vec![1, 2]);
/// ```
pub fn suppress(boxes: &[BoundingBox], scores: &[f32], threshold: f32) -> Vec<usize> {
    let count = boxes.len().min(scores.len());
    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; count];

    for (rank, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &order[rank + 1..] {
            if !suppressed[j] && pixel_iou(&boxes[i], &boxes[j]) > threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}
