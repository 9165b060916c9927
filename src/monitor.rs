use std::sync::Arc;
use std::thread;

use log::{error, info};

use crate::alert::AlertSink;
use crate::config::AppConfig;
use crate::detect::{AlertRule, Decoder, EngineLoader};
use crate::error::DetectError;
use crate::sink::SnapshotSink;
use crate::source::open_source;
use crate::worker::{StopSignal, StreamContext, StreamWorker, WorkerReport, WorkerState};

/// 按配置为每路视频源创建工作线程，不启动
///
/// 工作线程依次命名为 `stream1`、`stream2` ……。
/// 任一路的输出端创建失败时返回错误，此时尚未有任何线程运行。
///
/// # 参数
/// * `cfg` - 已校验的配置
/// * `alert` - 共享报警状态
/// * `loader` - 推理引擎加载器，每个工作线程各自加载
/// * `decoder` - 解码器
/// * `rule` - 报警判定规则
pub fn build_workers(
    cfg: &AppConfig,
    alert: &Arc<dyn AlertSink>,
    loader: &Arc<dyn EngineLoader>,
    decoder: &Decoder,
    rule: &AlertRule,
) -> Result<Vec<StreamWorker>, DetectError> {
    let mut workers = Vec::with_capacity(cfg.streams.len());
    for (idx, source_id) in cfg.streams.iter().enumerate() {
        let worker_id = format!("stream{}", idx + 1);
        let ctx = StreamContext {
            worker_id: worker_id.clone(),
            source_id: source_id.clone(),
            model_path: cfg.model_path.clone(),
            alert: Arc::clone(alert),
        };
        let mut worker = StreamWorker::new(
            ctx,
            open_source(source_id),
            Arc::clone(loader),
            decoder.clone(),
            rule.clone(),
        )
        .with_input_size(cfg.input_size);

        if let Some(snapshots) = &cfg.snapshots {
            let sink = SnapshotSink::new(snapshots.dir.join(&worker_id), worker_id.as_str(), snapshots.every)?;
            worker = worker.with_sink(Box::new(sink));
        }
        workers.push(worker);
    }
    Ok(workers)
}

/// 多路视频流监控
///
/// 每路流一个独立线程，互不影响；不会重启失败的工作线程。
pub struct Monitor {
    /// 共享报警状态，由上级传入
    pub alert: Arc<dyn AlertSink>,

    workers: Vec<(String, StopSignal, thread::JoinHandle<WorkerReport>)>,
}

impl Monitor {
    pub fn new(alert: Arc<dyn AlertSink>) -> Self {
        Self { alert, workers: Vec::new() }
    }

    /// 在独立线程中启动一个工作线程
    pub fn spawn(&mut self, worker: StreamWorker) -> std::io::Result<()> {
        let worker_id = worker.worker_id().to_string();
        let stop = worker.stop_signal();
        let handle = thread::Builder::new()
            .name(worker_id.clone())
            .spawn(move || worker.run())?;

        info!("已启动工作线程 {worker_id}");
        self.workers.push((worker_id, stop, handle));
        Ok(())
    }

    /// 工作线程数量
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 所有工作线程的停止信号
    pub fn stop_signals(&self) -> Vec<StopSignal> {
        self.workers.iter().map(|(_, stop, _)| stop.clone()).collect()
    }

    /// 通知所有工作线程停止
    pub fn stop_all(&self) {
        for (_, stop, _) in &self.workers {
            stop.stop();
        }
    }

    /// 等待所有工作线程结束，最后再清除一次报警状态
    pub fn join_all(self) -> Vec<WorkerReport> {
        let mut reports = Vec::with_capacity(self.workers.len());
        for (worker_id, _, handle) in self.workers {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    error!("工作线程 {worker_id} 异常退出");
                    self.alert.clear(&worker_id);
                    reports.push(WorkerReport {
                        worker_id,
                        state: WorkerState::Failed,
                        frames: 0,
                        skipped: 0,
                        alert_frames: 0,
                    });
                }
            }
        }

        self.alert.reset();
        info!("所有工作线程已结束");
        reports
    }
}
