pub mod alert;
pub mod config;
pub mod detect;
pub mod error;
pub mod monitor;
pub mod sink;
pub mod source;
pub mod worker;

// 重新导出常用类型和函数
pub use alert::{AlertBoard, AlertPolicy, AlertSink, SharedFlag};
pub use config::AppConfig;
pub use detect::{AlertRule, Decoder, Detection, DetectionSet, LabelTable, RawPrediction, decode};
pub use error::{ConfigError, DetectError};
pub use monitor::Monitor;
pub use worker::{StopSignal, StreamContext, StreamWorker, WorkerReport, WorkerState};
