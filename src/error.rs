//! 错误类型
//!
//! 所有错误都只影响单个视频流的工作线程，不会向其他流传播。

use thiserror::Error;

/// 检测流水线中的错误
#[derive(Debug, Error)]
pub enum DetectError {
    /// 帧源无法打开
    #[error("无法打开视频源 {source_id}: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// 帧读取失败（按流结束处理）
    #[error("读取帧失败 {source_id}: {reason}")]
    ReadFailed { source_id: String, reason: String },

    /// 推理引擎加载或运行失败
    #[error("推理引擎错误: {0}")]
    EngineFailure(String),

    /// 模型输出形状不符合 [1, N, 5 + C]
    #[error("模型输出形状不符合预期: {shape:?} (数据长度 {len})")]
    ShapeMismatch { shape: Vec<i64>, len: usize },

    /// 类别索引超出标签表
    #[error("类别索引 {class_id} 超出标签表范围 (共 {table_len} 类)")]
    OutOfRangeClass { class_id: usize, table_len: usize },

    /// 绘制或输出帧失败
    #[error("渲染失败: {0}")]
    Render(String),
}

impl DetectError {
    /// 只影响当前帧的数据契约错误，跳过该帧即可
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            DetectError::ShapeMismatch { .. } | DetectError::OutOfRangeClass { .. }
        )
    }
}

impl From<ort::Error> for DetectError {
    fn from(e: ort::Error) -> Self {
        DetectError::EngineFailure(e.to_string())
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("配置文件格式错误 {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("配置无效: {0}")]
    Invalid(String),
}
