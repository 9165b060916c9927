//! 共享报警状态
//!
//! 两种写入策略：
//! - `SharedFlag`：单个布尔值，各工作线程无条件置位/清除，最后写入者生效
//! - `AlertBoard`：按流记录各自的结果，对外可见的报警为所有流的逻辑或

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde::Deserialize;

/// 报警状态的写入和读取接口
pub trait AlertSink: Send + Sync {
    /// 发布某个流当前帧的判定结果
    fn publish(&self, stream_id: &str, detected: bool);

    /// 清除某个流的贡献（工作线程退出时调用）
    fn clear(&self, stream_id: &str);

    /// 清除全部状态
    fn reset(&self);

    /// 当前对外可见的报警状态
    fn is_raised(&self) -> bool;

    /// 各流最近一次写入的结果
    fn snapshot(&self) -> BTreeMap<String, bool>;
}

/// 单个共享布尔值，最后写入者生效
///
/// 多路流时一路的"清除"会覆盖另一路仍在检测到目标的"置位"。
#[derive(Debug, Default)]
pub struct SharedFlag {
    raised: AtomicBool,
    last_writes: Mutex<BTreeMap<String, bool>>,
}

impl SharedFlag {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, stream_id: &str, detected: bool) {
        lock(&self.last_writes).insert(stream_id.to_string(), detected);
    }
}

impl AlertSink for SharedFlag {
    fn publish(&self, stream_id: &str, detected: bool) {
        self.raised.store(detected, Ordering::SeqCst);
        self.record(stream_id, detected);
    }

    fn clear(&self, stream_id: &str) {
        self.raised.store(false, Ordering::SeqCst);
        self.record(stream_id, false);
    }

    fn reset(&self) {
        self.raised.store(false, Ordering::SeqCst);
        lock(&self.last_writes).clear();
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> BTreeMap<String, bool> {
        lock(&self.last_writes).clone()
    }
}

/// 按流聚合的报警状态
///
/// 每次更新后重新计算所有流的逻辑或。
#[derive(Debug, Default)]
pub struct AlertBoard {
    streams: Mutex<BTreeMap<String, bool>>,
    raised: AtomicBool,
}

impl AlertBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, stream_id: &str, detected: bool) {
        let mut streams = lock(&self.streams);
        streams.insert(stream_id.to_string(), detected);
        let any = streams.values().any(|&d| d);
        self.raised.store(any, Ordering::SeqCst);
        debug!("报警聚合: {stream_id}={detected}, 总体={any}");
    }
}

impl AlertSink for AlertBoard {
    fn publish(&self, stream_id: &str, detected: bool) {
        self.update(stream_id, detected);
    }

    fn clear(&self, stream_id: &str) {
        self.update(stream_id, false);
    }

    fn reset(&self) {
        let mut streams = lock(&self.streams);
        streams.clear();
        self.raised.store(false, Ordering::SeqCst);
    }

    fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> BTreeMap<String, bool> {
        lock(&self.streams).clone()
    }
}

/// 持锁线程panic后仍继续使用其中的数据，报警状态只是信号
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 报警写入策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// 任一路检测到即报警
    #[default]
    AnyStream,
    /// 最后写入者生效
    LastWrite,
}

impl AlertPolicy {
    pub fn build(self) -> Arc<dyn AlertSink> {
        match self {
            AlertPolicy::AnyStream => Arc::new(AlertBoard::new()),
            AlertPolicy::LastWrite => Arc::new(SharedFlag::new()),
        }
    }
}

impl FromStr for AlertPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "any_stream" => Ok(AlertPolicy::AnyStream),
            "last_write" => Ok(AlertPolicy::LastWrite),
            other => Err(format!("未知的报警策略: {other} (可选 any_stream, last_write)")),
        }
    }
}
