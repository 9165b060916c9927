//! 帧源
//!
//! 帧源按顺序产出帧，读完后报告流结束；无法打开时报告`SourceUnavailable`。

use std::path::{Path, PathBuf};

use image::DynamicImage;
use log::{debug, info};

use crate::error::DetectError;

/// 支持的帧图像扩展名
const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// 顺序帧源
pub trait FrameSource: Send {
    /// 帧源标识（用于日志和报警状态）
    fn id(&self) -> &str;

    /// 打开帧源
    fn open(&mut self) -> Result<(), DetectError>;

    /// 读取下一帧，流结束时返回`Ok(None)`
    fn read(&mut self) -> Result<Option<DynamicImage>, DetectError>;

    /// 释放帧源，可重复调用
    fn release(&mut self);
}

/// 图像目录帧源
///
/// 目录中的每个图像文件为一帧，按文件名排序播放。
pub struct ImageDirSource {
    id: String,
    dir: PathBuf,
    frames: Vec<PathBuf>,
    cursor: usize,
    opened: bool,
}

impl ImageDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            id: dir.display().to_string(),
            dir,
            frames: Vec::new(),
            cursor: 0,
            opened: false,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn unavailable(&self, reason: impl Into<String>) -> DetectError {
        DetectError::SourceUnavailable { source_id: self.id.clone(), reason: reason.into() }
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), DetectError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| self.unavailable(e.to_string()))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_frame_file(path))
            .collect();
        if frames.is_empty() {
            return Err(self.unavailable("目录中没有帧图像"));
        }
        frames.sort();

        info!("打开视频源 {}: 共 {} 帧", self.id, frames.len());
        self.frames = frames;
        self.cursor = 0;
        self.opened = true;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<DynamicImage>, DetectError> {
        if !self.opened {
            return Err(DetectError::ReadFailed {
                source_id: self.id.clone(),
                reason: "视频源未打开".to_string(),
            });
        }
        let Some(path) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        debug!("读取帧 {}", path.display());
        image::open(path).map(Some).map_err(|e| DetectError::ReadFailed {
            source_id: self.id.clone(),
            reason: format!("{}: {e}", path.display()),
        })
    }

    fn release(&mut self) {
        if self.opened {
            debug!("释放视频源 {}", self.id);
        }
        self.opened = false;
        self.frames.clear();
        self.cursor = 0;
    }
}

/// 内存帧源，按给定顺序产出帧
pub struct MemorySource {
    id: String,
    frames: std::vec::IntoIter<DynamicImage>,
    available: bool,
}

impl MemorySource {
    pub fn new(id: impl Into<String>, frames: Vec<DynamicImage>) -> Self {
        Self { id: id.into(), frames: frames.into_iter(), available: true }
    }

    /// 打开即失败的帧源
    pub fn unavailable(id: impl Into<String>) -> Self {
        Self { id: id.into(), frames: Vec::new().into_iter(), available: false }
    }
}

impl FrameSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn open(&mut self) -> Result<(), DetectError> {
        if self.available {
            Ok(())
        } else {
            Err(DetectError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: "帧源不可用".to_string(),
            })
        }
    }

    fn read(&mut self) -> Result<Option<DynamicImage>, DetectError> {
        Ok(self.frames.next())
    }

    fn release(&mut self) {}
}

/// 根据配置中的标识创建帧源
pub fn open_source(source_id: &str) -> Box<dyn FrameSource> {
    Box::new(ImageDirSource::new(source_id))
}
