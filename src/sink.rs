//! 显示/输出端
//!
//! 接收缩放后的帧、检测结果和当前FPS。

use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, imageops::FilterType};
use log::{debug, info};

use crate::detect::{DetectionSet, draw_detections, draw_fps};
use crate::error::DetectError;

/// 显示窗口尺寸
pub const DISPLAY_SIZE: u32 = 640;

/// 帧输出端
pub trait FrameSink: Send {
    fn render(&mut self, frame: &DynamicImage, detections: &DetectionSet, fps: f32) -> Result<(), DetectError>;
}

/// 帧率统计：从循环开始累计的帧数除以经过的时间
#[derive(Debug, Clone)]
pub struct FpsCounter {
    start: Instant,
    frames: u64,
}

impl FpsCounter {
    pub fn start() -> Self {
        Self { start: Instant::now(), frames: 0 }
    }

    /// 记录一帧并返回当前帧率
    pub fn tick(&mut self) -> f32 {
        self.frames += 1;
        let elapsed = self.start.elapsed().as_secs_f32();
        if elapsed <= f32::EPSILON {
            return 0.0;
        }
        self.frames as f32 / elapsed
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

/// 不输出任何内容
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn render(&mut self, _frame: &DynamicImage, _detections: &DetectionSet, _fps: f32) -> Result<(), DetectError> {
        Ok(())
    }
}

/// 把标注后的帧（检测框和FPS）按间隔保存为PNG
pub struct SnapshotSink {
    dir: PathBuf,
    prefix: String,
    every: u64,
    rendered: u64,
}

impl SnapshotSink {
    /// # 参数
    /// * `dir` - 输出目录，不存在时自动创建
    /// * `prefix` - 文件名前缀（通常为工作线程名）
    /// * `every` - 每隔多少帧保存一次，0按1处理
    pub fn new(dir: impl AsRef<Path>, prefix: impl Into<String>, every: u64) -> Result<Self, DetectError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| DetectError::Render(format!("无法创建输出目录 {}: {e}", dir.display())))?;
        Ok(Self { dir, prefix: prefix.into(), every: every.max(1), rendered: 0 })
    }
}

impl FrameSink for SnapshotSink {
    fn render(&mut self, frame: &DynamicImage, detections: &DetectionSet, fps: f32) -> Result<(), DetectError> {
        let index = self.rendered;
        self.rendered += 1;
        if index % self.every != 0 {
            return Ok(());
        }

        let annotated = draw_detections(frame, detections)?;
        let display = annotated.resize_exact(DISPLAY_SIZE, DISPLAY_SIZE, FilterType::Triangle);
        let display = draw_fps(&display, fps)?;
        let path = self.dir.join(format!("{}_{:06}.png", self.prefix, index));
        display
            .save(&path)
            .map_err(|e| DetectError::Render(format!("保存 {} 失败: {e}", path.display())))?;

        debug!("已保存 {}", path.display());
        info!("[{}] FPS: {:.2}, 目标数 {}", self.prefix, fps, detections.len());
        Ok(())
    }
}
