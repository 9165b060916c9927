use std::path::Path;

use ort::session::{builder::GraphOptimizationLevel, Session};

/// 加载ONNX格式的YOLO模型，并应用优化配置
///
/// # 参数
/// * `model_path` - 模型文件路径
///
/// # 错误处理
/// 文件不存在或模型加载失败会返回Err
///
/// # 示例
///
/// ```no_run
/// use std::path::Path;
/// use roadwatch::detect::model::load_model;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let session = load_model(Path::new("yolov5_highway_n_320.onnx"))?;
/// println!("模型输入: {}", session.inputs.len());
/// # Ok(())
/// # }
/// ```
pub fn load_model(model_path: &Path) -> Result<Session, ort::Error> {
    let model = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(model_path)?;
    Ok(model)
}
