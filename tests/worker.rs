use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use ndarray::Array4;

use roadwatch::alert::AlertSink;
use roadwatch::detect::{EngineLoader, InferenceEngine};
use roadwatch::config::SnapshotSettings;
use roadwatch::detect::DetectionSet;
use roadwatch::monitor::build_workers;
use roadwatch::sink::{FrameSink, SnapshotSink};
use roadwatch::source::{FrameSource, ImageDirSource, MemorySource};
use roadwatch::{
    AlertBoard, AlertRule, AppConfig, Decoder, DetectError, LabelTable, Monitor, RawPrediction,
    SharedFlag, StopSignal, StreamContext, StreamWorker, WorkerState,
};

/// 按脚本返回输出的推理引擎
struct ScriptedEngine {
    outputs: Vec<RawPrediction>,
    calls: usize,
    fail_at: Option<usize>,
    mismatch_at: Option<usize>,
}

impl InferenceEngine for ScriptedEngine {
    fn infer(&mut self, input: &Array4<f32>) -> Result<RawPrediction, DetectError> {
        assert_eq!(input.shape(), &[1, 3, 32, 32]);
        let call = self.calls;
        self.calls += 1;
        if self.fail_at == Some(call) {
            return Err(DetectError::EngineFailure("scripted failure".to_string()));
        }
        if self.mismatch_at == Some(call) {
            return Err(DetectError::ShapeMismatch { shape: vec![1, 3, 4], len: 12 });
        }
        Ok(self.outputs.get(call).cloned().unwrap_or_else(|| RawPrediction::empty(2)))
    }
}

#[derive(Clone, Default)]
struct ScriptedLoader {
    outputs: Vec<RawPrediction>,
    fail_at: Option<usize>,
    mismatch_at: Option<usize>,
    fail_load: bool,
}

impl EngineLoader for ScriptedLoader {
    fn load(&self, _model_path: &Path) -> Result<Box<dyn InferenceEngine>, DetectError> {
        if self.fail_load {
            return Err(DetectError::EngineFailure("no model".to_string()));
        }
        Ok(Box::new(ScriptedEngine {
            outputs: self.outputs.clone(),
            calls: 0,
            fail_at: self.fail_at,
            mismatch_at: self.mismatch_at,
        }))
    }
}

/// 总是渲染失败的输出端
struct BrokenSink {
    calls: Arc<Mutex<usize>>,
}

impl FrameSink for BrokenSink {
    fn render(&mut self, _frame: &DynamicImage, _detections: &DetectionSet, _fps: f32) -> Result<(), DetectError> {
        *self.calls.lock().unwrap() += 1;
        Err(DetectError::Render("display closed".to_string()))
    }
}

/// 记录每次写入的报警状态
#[derive(Default)]
struct RecordingAlert {
    inner: AlertBoard,
    events: Mutex<Vec<(String, bool)>>,
}

impl RecordingAlert {
    fn events(&self) -> Vec<(String, bool)> {
        self.events.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlert {
    fn publish(&self, stream_id: &str, detected: bool) {
        self.events.lock().unwrap().push((stream_id.to_string(), detected));
        self.inner.publish(stream_id, detected);
    }

    fn clear(&self, stream_id: &str) {
        self.events.lock().unwrap().push((format!("clear:{stream_id}"), false));
        self.inner.clear(stream_id);
    }

    fn reset(&self) {
        self.inner.reset();
    }

    fn is_raised(&self) -> bool {
        self.inner.is_raised()
    }

    fn snapshot(&self) -> std::collections::BTreeMap<String, bool> {
        self.inner.snapshot()
    }
}

fn car_frame() -> RawPrediction {
    RawPrediction::from_rows(&[vec![10.0, 10.0, 8.0, 8.0, 0.9, 0.9, 0.1]]).unwrap()
}

fn frames(count: usize) -> Vec<DynamicImage> {
    (0..count).map(|_| DynamicImage::new_rgb8(64, 48)).collect()
}

fn worker(
    id: &str,
    source: Box<dyn FrameSource>,
    loader: ScriptedLoader,
    alert: Arc<dyn AlertSink>,
    alertable: &[&str],
) -> StreamWorker {
    let labels = LabelTable::new(["car", "trunk"]);
    let rule = AlertRule::from_names(&labels, alertable).unwrap();
    let ctx = StreamContext {
        worker_id: id.to_string(),
        source_id: source.id().to_string(),
        model_path: PathBuf::from("model.onnx"),
        alert,
    };
    StreamWorker::new(ctx, source, Arc::new(loader), Decoder::new(labels, 0.45, 0.3), rule)
        .with_input_size(32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alertable_detection_raises_and_empty_clears() {
        let alert = Arc::new(RecordingAlert::default());
        let loader = ScriptedLoader {
            outputs: vec![car_frame(), RawPrediction::empty(2), car_frame()],
            ..ScriptedLoader::default()
        };
        let source = Box::new(MemorySource::new("cam", frames(3)));

        let report = worker("w1", source, loader, alert.clone(), &["car"]).run();

        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.frames, 3);
        assert_eq!(report.alert_frames, 2);
        assert_eq!(
            alert.events(),
            vec![
                ("w1".to_string(), true),
                ("w1".to_string(), false),
                ("w1".to_string(), true),
                ("clear:w1".to_string(), false),
            ]
        );
        assert!(!alert.is_raised());
    }

    #[test]
    fn non_alertable_class_does_not_raise() {
        let alert = Arc::new(RecordingAlert::default());
        let loader = ScriptedLoader { outputs: vec![car_frame()], ..ScriptedLoader::default() };
        let source = Box::new(MemorySource::new("cam", frames(1)));

        let report = worker("w1", source, loader, alert.clone(), &["trunk"]).run();
        assert_eq!(report.alert_frames, 0);
        assert_eq!(alert.events()[0], ("w1".to_string(), false));
    }

    #[test]
    fn unavailable_source_fails_without_publishing() {
        let alert = Arc::new(RecordingAlert::default());
        let source = Box::new(MemorySource::unavailable("missing"));

        let report = worker("w1", source, ScriptedLoader::default(), alert.clone(), &["car"]).run();
        assert_eq!(report.state, WorkerState::Failed);
        assert_eq!(report.frames, 0);
        assert_eq!(alert.events(), vec![("clear:w1".to_string(), false)]);
    }

    #[test]
    fn model_load_failure_fails_worker() {
        let alert = Arc::new(AlertBoard::new());
        let loader = ScriptedLoader { fail_load: true, ..ScriptedLoader::default() };
        let source = Box::new(MemorySource::new("cam", frames(2)));

        let report = worker("w1", source, loader, alert, &["car"]).run();
        assert_eq!(report.state, WorkerState::Failed);
    }

    #[test]
    fn engine_failure_ends_worker_and_clears_alert() {
        let alert = Arc::new(AlertBoard::new());
        let loader = ScriptedLoader {
            outputs: vec![car_frame(), car_frame(), car_frame()],
            fail_at: Some(1),
            ..ScriptedLoader::default()
        };
        let source = Box::new(MemorySource::new("cam", frames(3)));

        let report = worker("w1", source, loader, alert.clone(), &["car"]).run();
        assert_eq!(report.state, WorkerState::Failed);
        assert_eq!(report.frames, 1);
        assert!(!alert.is_raised());
    }

    #[test]
    fn out_of_range_class_skips_only_that_frame() {
        let alert = Arc::new(RecordingAlert::default());
        let bad = RawPrediction::from_rows(&[vec![10.0, 10.0, 8.0, 8.0, 0.9, 0.0, 0.0, 1.0]]).unwrap();
        let loader = ScriptedLoader { outputs: vec![bad, car_frame()], ..ScriptedLoader::default() };
        let source = Box::new(MemorySource::new("cam", frames(2)));

        let report = worker("w1", source, loader, alert.clone(), &["car"]).run();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.frames, 1);
        assert_eq!(
            alert.events(),
            vec![
                ("w1".to_string(), false),
                ("w1".to_string(), true),
                ("clear:w1".to_string(), false),
            ]
        );
    }

    #[test]
    fn shape_mismatch_skips_frame_and_drops_previous_alert() {
        let alert = Arc::new(RecordingAlert::default());
        let loader = ScriptedLoader {
            outputs: vec![car_frame(), car_frame(), car_frame()],
            mismatch_at: Some(1),
            ..ScriptedLoader::default()
        };
        let source = Box::new(MemorySource::new("cam", frames(3)));

        let report = worker("w1", source, loader, alert.clone(), &["car"]).run();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.frames, 2);
        assert_eq!(report.alert_frames, 2);
        assert_eq!(
            alert.events(),
            vec![
                ("w1".to_string(), true),
                ("w1".to_string(), false),
                ("w1".to_string(), true),
                ("clear:w1".to_string(), false),
            ]
        );
    }

    #[test]
    fn sink_failure_does_not_stop_worker() {
        let alert = Arc::new(RecordingAlert::default());
        let calls = Arc::new(Mutex::new(0));
        let loader = ScriptedLoader { outputs: vec![car_frame(); 3], ..ScriptedLoader::default() };
        let source = Box::new(MemorySource::new("cam", frames(3)));

        let report = worker("w1", source, loader, alert.clone(), &["car"])
            .with_sink(Box::new(BrokenSink { calls: Arc::clone(&calls) }))
            .run();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.frames, 3);
        assert_eq!(report.alert_frames, 3);
        assert_eq!(*calls.lock().unwrap(), 3);

        let published: Vec<_> = alert.events().into_iter().filter(|(id, _)| id == "w1").collect();
        assert_eq!(published, vec![("w1".to_string(), true); 3]);
    }

    #[test]
    fn build_workers_names_streams_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let cfg = AppConfig {
            streams: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            snapshots: Some(SnapshotSettings { dir: dir.path().to_path_buf(), every: 5 }),
            ..AppConfig::default()
        };
        let alert: Arc<dyn AlertSink> = Arc::new(AlertBoard::new());
        let loader: Arc<dyn EngineLoader> = Arc::new(ScriptedLoader::default());
        let labels = LabelTable::new(["car", "trunk"]);
        let rule = AlertRule::all(&labels);
        let decoder = Decoder::new(labels, 0.45, 0.3);

        let workers = build_workers(&cfg, &alert, &loader, &decoder, &rule)?;
        let ids: Vec<_> = workers.iter().map(|w| w.worker_id().to_string()).collect();
        assert_eq!(ids, vec!["stream1", "stream2", "stream3"]);
        assert!(dir.path().join("stream3").is_dir());
        Ok(())
    }

    #[test]
    fn build_workers_fails_before_any_worker_runs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        // 普通文件下无法创建输出目录
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file")?;
        let cfg = AppConfig {
            streams: vec!["a".to_string(), "b".to_string()],
            snapshots: Some(SnapshotSettings { dir: blocker, every: 1 }),
            ..AppConfig::default()
        };
        let alert: Arc<dyn AlertSink> = Arc::new(AlertBoard::new());
        let loader: Arc<dyn EngineLoader> = Arc::new(ScriptedLoader::default());
        let labels = LabelTable::new(["car", "trunk"]);
        let rule = AlertRule::all(&labels);
        let decoder = Decoder::new(labels, 0.45, 0.3);

        let result = build_workers(&cfg, &alert, &loader, &decoder, &rule);
        assert!(matches!(result, Err(DetectError::Render(_))));
        assert!(alert.snapshot().is_empty());
        Ok(())
    }

    #[test]
    fn stop_signal_is_observed_before_reading() {
        let alert = Arc::new(AlertBoard::new());
        let stop = StopSignal::new();
        stop.stop();
        let source = Box::new(MemorySource::new("cam", frames(5)));

        let report = worker("w1", source, ScriptedLoader::default(), alert, &["car"])
            .with_stop_signal(stop)
            .run();
        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.frames, 0);
    }

    #[test]
    fn last_write_wins_across_workers() {
        let flag = SharedFlag::new();
        flag.publish("w1", true);
        flag.publish("w2", false);
        assert!(!flag.is_raised());

        let board = AlertBoard::new();
        board.publish("w1", true);
        board.publish("w2", false);
        assert!(board.is_raised());
    }

    #[test]
    fn monitor_joins_all_workers_and_resets_alert() {
        let alert: Arc<dyn AlertSink> = Arc::new(AlertBoard::new());
        let mut monitor = Monitor::new(Arc::clone(&alert));

        let good = ScriptedLoader { outputs: vec![car_frame(); 4], ..ScriptedLoader::default() };
        monitor
            .spawn(worker("w1", Box::new(MemorySource::new("a", frames(4))), good, Arc::clone(&alert), &["car"]))
            .unwrap();
        monitor
            .spawn(worker(
                "w2",
                Box::new(MemorySource::unavailable("b")),
                ScriptedLoader::default(),
                Arc::clone(&alert),
                &["car"],
            ))
            .unwrap();
        assert_eq!(monitor.len(), 2);

        let mut reports = monitor.join_all();
        reports.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        assert_eq!(reports[0].state, WorkerState::Stopped);
        assert_eq!(reports[0].frames, 4);
        assert_eq!(reports[1].state, WorkerState::Failed);
        assert!(!alert.is_raised());
        assert!(alert.snapshot().is_empty());
    }

    #[test]
    fn image_dir_source_reads_sorted_frames() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        for name in ["b.png", "a.png", "c.png"] {
            DynamicImage::new_rgb8(8, 8).save(dir.path().join(name))?;
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame")?;

        let mut source = ImageDirSource::new(dir.path());
        source.open()?;
        assert_eq!(source.len(), 3);

        let mut count = 0;
        while source.read()?.is_some() {
            count += 1;
        }
        assert_eq!(count, 3);
        source.release();
        Ok(())
    }

    #[test]
    fn image_dir_source_reports_unavailable() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mut empty = ImageDirSource::new(dir.path());
        assert!(matches!(empty.open(), Err(DetectError::SourceUnavailable { .. })));

        let mut missing = ImageDirSource::new(dir.path().join("nope"));
        assert!(matches!(missing.open(), Err(DetectError::SourceUnavailable { .. })));
        Ok(())
    }

    #[test]
    fn corrupt_frame_stops_worker() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        DynamicImage::new_rgb8(8, 8).save(dir.path().join("0001.png"))?;
        std::fs::write(dir.path().join("0002.png"), b"garbage")?;
        DynamicImage::new_rgb8(8, 8).save(dir.path().join("0003.png"))?;

        let alert = Arc::new(AlertBoard::new());
        let source = Box::new(ImageDirSource::new(dir.path()));
        let report = worker("w1", source, ScriptedLoader::default(), alert, &["car"]).run();

        assert_eq!(report.state, WorkerState::Stopped);
        assert_eq!(report.frames, 1);
        Ok(())
    }

    #[test]
    fn snapshot_sink_writes_annotated_frames() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let alert = Arc::new(AlertBoard::new());
        let loader = ScriptedLoader { outputs: vec![car_frame(); 3], ..ScriptedLoader::default() };
        let sink = SnapshotSink::new(dir.path(), "w1", 2)?;

        let report = worker("w1", Box::new(MemorySource::new("cam", frames(3))), loader, alert, &["car"])
            .with_sink(Box::new(sink))
            .run();
        assert_eq!(report.frames, 3);

        let mut written: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        written.sort();
        assert_eq!(written, vec!["w1_000000.png", "w1_000002.png"]);

        let saved = image::open(dir.path().join("w1_000000.png"))?;
        assert_eq!((saved.width(), saved.height()), (640, 640));
        // 左上角的FPS文字
        let label = saved.to_rgba8().get_pixel(6, 9).0;
        assert!(label[0] > 128 && label[1] > 128 && label[2] > 128, "{label:?}");
        Ok(())
    }
}
