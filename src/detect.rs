//! 检测模块 - 基于YOLO的目标检测后处理
//!
//! 该模块提供从模型输入到检测结果的完整流程：
//! - 图像预处理（缩放、归一化）
//! - 模型推理（ONNX Runtime）
//! - 结果后处理（置信度过滤、逐类别NMS、坐标转换）
//! - 可视化绘制
//!
//! # 工作流程
//!
//! 1. 使用`OrtLoader`加载ONNX模型
//! 2. 使用`prepare_input`把帧转换为模型输入
//! 3. 调用`InferenceEngine::infer`得到`RawPrediction`
//! 4. 调用`Decoder::decode`得到`DetectionSet`
//! 5. 使用`draw_detections`绘制检测结果
//!
//! # 示例
//!
//! ```
//! use roadwatch::detect::{decode, RawPrediction};
//!
//! let raw = RawPrediction::from_rows(&[
//!     vec![5.0, 5.0, 10.0, 10.0, 0.9, 0.1, 0.8],
//!     vec![5.5, 5.5, 9.0, 9.0, 0.8, 0.2, 0.7],
//! ])?;
//! let detections = decode(&raw, 0.45, 0.3);
//! assert_eq!(detections.len(), 1);
//! # Ok::<(), roadwatch::DetectError>(())
//! ```

pub mod bounds;
pub mod draw;
pub mod infer;
pub mod labels;
pub mod model;
pub mod nms;
pub mod posts;
pub mod prevs;

// 重新导出常用类型和函数
pub use bounds::{BoundingBox, CenterBox, Detection, DetectionSet};
pub use draw::{draw_detections, draw_fps};
pub use infer::{EngineLoader, InferenceEngine, OrtEngine, OrtLoader};
pub use labels::{AlertRule, LabelTable};
pub use model::load_model;
pub use nms::{pixel_iou, suppress};
pub use posts::{decode, Candidate, Decoder, RawPrediction};
pub use prevs::{image_to_tensor, prepare_input, resize_image};
