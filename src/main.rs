//! roadwatch - 多路视频流目标检测与报警
//!
//! 每路视频源一个工作线程，独立完成预处理、推理、后处理和报警判定，
//! 所有工作线程共用一个报警状态。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use roadwatch::detect::{EngineLoader, OrtLoader};
use roadwatch::monitor::build_workers;
use roadwatch::{AlertPolicy, AlertRule, AlertSink, AppConfig, Decoder, LabelTable, Monitor};

#[derive(Debug, Parser)]
#[command(name = "roadwatch", version, about = "多路视频流目标检测与报警")]
struct Cli {
    /// TOML配置文件
    #[arg(long, env = "ROADWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// 模型文件路径
    #[arg(long)]
    model: Option<PathBuf>,

    /// 视频源（帧图像目录），可重复
    #[arg(long = "stream")]
    streams: Vec<String>,

    /// 保存标注帧的目录
    #[arg(long)]
    snapshots: Option<PathBuf>,

    /// 报警策略: any_stream | last_write
    #[arg(long)]
    policy: Option<AlertPolicy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = resolve_config(cli)?;
    info!(
        "模型 {}, {} 路视频源, 置信度阈值 {}, NMS阈值 {}, 报警策略 {:?}",
        cfg.model_path.display(),
        cfg.streams.len(),
        cfg.confidence_threshold,
        cfg.iou_threshold,
        cfg.alert_policy
    );

    let alert = cfg.alert_policy.build();
    let labels = LabelTable::new(cfg.classes.iter().cloned());
    let rule = AlertRule::from_names(&labels, &cfg.alertable)?;
    let decoder = Decoder::new(labels, cfg.confidence_threshold, cfg.iou_threshold);
    let loader: Arc<dyn EngineLoader> = Arc::new(OrtLoader);

    // 先创建全部工作线程，再统一启动
    let workers = build_workers(&cfg, &alert, &loader, &decoder, &rule).context("创建工作线程失败")?;

    let mut monitor = Monitor::new(Arc::clone(&alert));
    for worker in workers {
        let worker_id = worker.worker_id().to_string();
        if let Err(e) = monitor.spawn(worker) {
            error!("无法启动工作线程 {worker_id}: {e}");
        }
    }

    let stops = monitor.stop_signals();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，停止所有工作线程");
            for stop in &stops {
                stop.stop();
            }
        }
    });
    let watcher = tokio::spawn(watch_alert(Arc::clone(&alert)));

    let reports = tokio::task::spawn_blocking(move || monitor.join_all())
        .await
        .context("等待工作线程失败")?;
    watcher.abort();

    for report in &reports {
        info!(
            "{}: {}, 处理 {} 帧, 报警 {} 帧",
            report.worker_id, report.state, report.frames, report.alert_frames
        );
    }
    Ok(())
}

/// 合并配置文件、环境变量和命令行参数
fn resolve_config(cli: Cli) -> Result<AppConfig> {
    let mut cfg = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(model) = cli.model {
        cfg.model_path = model;
    }
    if !cli.streams.is_empty() {
        cfg.streams = cli.streams;
    }
    if let Some(dir) = cli.snapshots {
        let every = cfg
            .snapshots
            .as_ref()
            .map(|snap| snap.every)
            .unwrap_or(roadwatch::config::DEFAULT_SNAPSHOT_EVERY);
        cfg.snapshots = Some(roadwatch::config::SnapshotSettings { dir, every });
    }
    if let Some(policy) = cli.policy {
        cfg.alert_policy = policy;
    }
    cfg.validate()?;
    Ok(cfg)
}

/// 报警状态的消费者：记录状态变化
async fn watch_alert(alert: Arc<dyn AlertSink>) {
    let mut interval = tokio::time::interval(Duration::from_millis(100));
    let mut last = false;
    loop {
        interval.tick().await;
        let raised = alert.is_raised();
        if raised == last {
            continue;
        }
        if raised {
            warn!("报警: 检测到目标 {:?}", alert.snapshot());
        } else {
            info!("报警解除");
        }
        last = raised;
    }
}
