use std::path::Path;

use log::debug;
use ndarray::Array4;
use ort::{inputs, session::Session, value::Tensor};

use crate::detect::model::load_model;
use crate::detect::posts::RawPrediction;
use crate::error::DetectError;

/// 模型默认输入名
const DEFAULT_INPUT_NAME: &str = "images";

/// 推理引擎
///
/// 输入为 `[1, 3, H, W]` 的RGB张量，输出为第一个 `[1, N, 5 + C]` 张量。
/// 每个工作线程持有自己的引擎，不跨线程共享。
pub trait InferenceEngine: Send {
    fn infer(&mut self, input: &Array4<f32>) -> Result<RawPrediction, DetectError>;
}

/// 按模型路径创建推理引擎
pub trait EngineLoader: Send + Sync {
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceEngine>, DetectError>;
}

/// 基于ONNX Runtime的推理引擎
pub struct OrtEngine {
    session: Session,
    input_name: String,
}

impl OrtEngine {
    pub fn new(session: Session) -> Self {
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| DEFAULT_INPUT_NAME.to_string());
        Self { session, input_name }
    }

    /// 从模型文件创建引擎
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use image::DynamicImage;
    /// use roadwatch::detect::{prepare_input, InferenceEngine, OrtEngine};
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut engine = OrtEngine::from_file(Path::new("yolov5_highway_n_320.onnx"))?;
    /// let (_, tensor) = prepare_input(&DynamicImage::new_rgb8(640, 480), 320);
    /// let raw = engine.infer(&tensor)?;
    /// println!("候选框数量: {}", raw.num_candidates());
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file(model_path: &Path) -> Result<Self, DetectError> {
        if !model_path.exists() {
            return Err(DetectError::EngineFailure(format!(
                "模型文件不存在: {}",
                model_path.display()
            )));
        }
        let session = load_model(model_path)?;
        Ok(Self::new(session))
    }
}

impl InferenceEngine for OrtEngine {
    /// 运行模型推理
    ///
    /// 只取第一个输出，其余辅助输出忽略。
    fn infer(&mut self, input: &Array4<f32>) -> Result<RawPrediction, DetectError> {
        let shape: Vec<usize> = input.shape().to_vec();
        let (data, _offset) = input.clone().into_raw_vec_and_offset();
        let input_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data))?;

        let outputs = self.session.run(inputs![self.input_name.as_str() => input_tensor])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        debug!("模型输出形状: {:?}", &shape[..]);
        RawPrediction::from_shape(shape, data)
    }
}

/// 创建`OrtEngine`的加载器
#[derive(Debug, Clone, Copy, Default)]
pub struct OrtLoader;

impl EngineLoader for OrtLoader {
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceEngine>, DetectError> {
        Ok(Box::new(OrtEngine::from_file(model_path)?))
    }
}
