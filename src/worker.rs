//! 单路视频流的工作线程
//!
//! 状态：`Opening → Running → (Stopped | Failed)`。
//! 每个工作线程独占自己的帧源和推理引擎，只通过报警状态与外界交互。

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use log::{debug, error, info, warn};

use crate::alert::AlertSink;
use crate::config::DEFAULT_INPUT_SIZE;
use crate::detect::{AlertRule, Decoder, EngineLoader, InferenceEngine, prepare_input};
use crate::error::DetectError;
use crate::sink::{FpsCounter, FrameSink, NullSink};
use crate::source::FrameSource;

/// 工作线程的不可变上下文
#[derive(Clone)]
pub struct StreamContext {
    /// 工作线程标识，同时作为报警状态中的键
    pub worker_id: String,
    /// 视频源标识
    pub source_id: String,
    /// 模型路径（所有工作线程共用同一模型文件，各自加载）
    pub model_path: PathBuf,
    /// 共享报警状态
    pub alert: Arc<dyn AlertSink>,
}

impl fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamContext")
            .field("worker_id", &self.worker_id)
            .field("source_id", &self.source_id)
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

/// 工作线程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Opening,
    Running,
    /// 流结束、读取失败或收到停止信号
    Stopped,
    /// 无法打开帧源或推理引擎出错
    Failed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Opening => "opening",
            WorkerState::Running => "running",
            WorkerState::Stopped => "stopped",
            WorkerState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// 停止信号，每次循环开始时检查
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 工作线程结束时的汇总
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker_id: String,
    pub state: WorkerState,
    /// 完整处理的帧数
    pub frames: u64,
    /// 因数据契约错误跳过的帧数
    pub skipped: u64,
    /// 判定为报警的帧数
    pub alert_frames: u64,
}

/// 单路视频流工作线程
pub struct StreamWorker {
    ctx: StreamContext,
    source: Box<dyn FrameSource>,
    loader: Arc<dyn EngineLoader>,
    decoder: Decoder,
    rule: AlertRule,
    sink: Box<dyn FrameSink>,
    input_size: u32,
    stop: StopSignal,
    state: WorkerState,
}

impl StreamWorker {
    pub fn new(
        ctx: StreamContext,
        source: Box<dyn FrameSource>,
        loader: Arc<dyn EngineLoader>,
        decoder: Decoder,
        rule: AlertRule,
    ) -> Self {
        Self {
            ctx,
            source,
            loader,
            decoder,
            rule,
            sink: Box::new(NullSink),
            input_size: DEFAULT_INPUT_SIZE,
            stop: StopSignal::new(),
            state: WorkerState::Opening,
        }
    }

    /// 设置显示/输出端
    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }

    /// 设置模型输入边长
    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    /// 使用外部提供的停止信号
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.ctx.worker_id
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn transition(&mut self, next: WorkerState) {
        debug!("[{}] {} -> {}", self.ctx.worker_id, self.state, next);
        self.state = next;
    }

    /// 运行直到流结束、收到停止信号或出错
    ///
    /// 无论以何种状态结束，都会释放帧源并清除本线程的报警贡献。
    pub fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            worker_id: self.ctx.worker_id.clone(),
            state: WorkerState::Opening,
            frames: 0,
            skipped: 0,
            alert_frames: 0,
        };

        info!("[{}] 启动, 视频源 {}", self.ctx.worker_id, self.ctx.source_id);
        match self.open() {
            Ok(mut engine) => {
                self.transition(WorkerState::Running);
                let end = self.run_loop(engine.as_mut(), &mut report);
                self.transition(end);
            }
            Err(e) => {
                error!("[{}] 打开失败: {e}", self.ctx.worker_id);
                self.transition(WorkerState::Failed);
            }
        }

        self.teardown();
        report.state = self.state;
        info!(
            "[{}] 结束: {}, 处理 {} 帧, 跳过 {} 帧, 报警 {} 帧",
            report.worker_id, report.state, report.frames, report.skipped, report.alert_frames
        );
        report
    }

    fn open(&mut self) -> Result<Box<dyn InferenceEngine>, DetectError> {
        let engine = self.loader.load(&self.ctx.model_path)?;
        self.source.open()?;
        Ok(engine)
    }

    /// 逐帧处理直到结束
    ///
    /// 数据契约错误只作废当前帧，本流的报警贡献置为未检测到。
    fn run_loop(&mut self, engine: &mut dyn InferenceEngine, report: &mut WorkerReport) -> WorkerState {
        let mut fps = FpsCounter::start();

        loop {
            if self.stop.is_stopped() {
                info!("[{}] 收到停止信号", self.ctx.worker_id);
                return WorkerState::Stopped;
            }

            let frame = match self.source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("[{}] 视频流结束", self.ctx.worker_id);
                    return WorkerState::Stopped;
                }
                Err(e) => {
                    warn!("[{}] {e}", self.ctx.worker_id);
                    return WorkerState::Stopped;
                }
            };

            match self.process_frame(engine, &frame, &mut fps) {
                Ok(detected) => {
                    report.frames += 1;
                    if detected {
                        report.alert_frames += 1;
                    }
                }
                Err(e) if e.is_frame_local() => {
                    // 作废的帧按未检测到目标发布
                    warn!("[{}] 跳过当前帧: {e}", self.ctx.worker_id);
                    self.ctx.alert.publish(&self.ctx.worker_id, false);
                    report.skipped += 1;
                }
                Err(e) => {
                    error!("[{}] {e}", self.ctx.worker_id);
                    return WorkerState::Failed;
                }
            }
        }
    }

    /// 处理一帧：预处理、推理、解码、报警判定、输出
    ///
    /// # 返回值
    /// 本帧的报警判定结果
    fn process_frame(
        &mut self,
        engine: &mut dyn InferenceEngine,
        frame: &DynamicImage,
        fps: &mut FpsCounter,
    ) -> Result<bool, DetectError> {
        let (resized, tensor) = prepare_input(frame, self.input_size);
        let raw = engine.infer(&tensor)?;
        let detections = self.decoder.decode(&raw)?;

        let detected = self.rule.evaluate(&detections);
        self.ctx.alert.publish(&self.ctx.worker_id, detected);

        let current_fps = fps.tick();
        if let Err(e) = self.sink.render(&resized, &detections, current_fps) {
            warn!("[{}] {e}", self.ctx.worker_id);
        }

        debug!(
            "[{}] 目标数 {}, 报警 {}, FPS {:.2}",
            self.ctx.worker_id,
            detections.len(),
            detected,
            current_fps
        );
        Ok(detected)
    }

    fn teardown(&mut self) {
        self.source.release();
        self.ctx.alert.clear(&self.ctx.worker_id);
    }
}
