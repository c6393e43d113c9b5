//! Pipeline lifecycle against an in-memory encoder.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::RgbImage;
use scenecast_common::config::{CanvasConfig, StreamConfig};
use scenecast_common::error::{ScenecastError, ScenecastResult};
use scenecast_stream_engine::{
    AbortHandle, EncoderLauncher, EncoderSettings, EncoderSink, StreamPipeline, StreamState,
    StreamTarget,
};

/// What the fake encoders observed, shared with the test.
#[derive(Default)]
struct Recorder {
    launches: AtomicUsize,
    video_frames: AtomicUsize,
    audio_bytes: AtomicUsize,
    finished: AtomicUsize,
    aborted: AtomicUsize,
    /// Simulates the subprocess dying.
    exited: AtomicBool,
    fail_launch: AtomicBool,
    /// Makes `finish` hang until aborted.
    hang_on_finish: AtomicBool,
    /// Makes `write_video` block until aborted, then fail like a closed pipe.
    hang_on_write: AtomicBool,
    targets: Mutex<Vec<String>>,
}

struct FakeLauncher(Arc<Recorder>);

struct FakeEncoder {
    recorder: Arc<Recorder>,
    killed: Arc<AtomicBool>,
}

impl EncoderLauncher for FakeLauncher {
    fn launch(
        &self,
        _settings: &EncoderSettings,
        target: &StreamTarget,
    ) -> ScenecastResult<Box<dyn EncoderSink>> {
        if self.0.fail_launch.load(Ordering::SeqCst) {
            return Err(ScenecastError::stream("ffmpeg not found"));
        }
        self.0.launches.fetch_add(1, Ordering::SeqCst);
        self.0.targets.lock().unwrap().push(target.destination());
        Ok(Box::new(FakeEncoder {
            recorder: Arc::clone(&self.0),
            killed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

impl EncoderSink for FakeEncoder {
    fn write_video(&mut self, _frame: &[u8]) -> ScenecastResult<()> {
        if self.recorder.hang_on_write.load(Ordering::SeqCst) {
            while !self.killed.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe).into());
        }
        self.recorder.video_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn write_audio(&mut self, samples: &[u8]) -> ScenecastResult<()> {
        self.recorder
            .audio_bytes
            .fetch_add(samples.len(), Ordering::SeqCst);
        Ok(())
    }

    fn poll_exit(&mut self) -> ScenecastResult<()> {
        if self.recorder.exited.load(Ordering::SeqCst) {
            return Err(ScenecastError::stream("Encoder exited (status 1)"));
        }
        Ok(())
    }

    fn finish(&mut self) -> ScenecastResult<()> {
        while self.recorder.hang_on_finish.load(Ordering::SeqCst)
            && !self.killed.load(Ordering::SeqCst)
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.recorder.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn abort_handle(&self) -> AbortHandle {
        let killed = Arc::clone(&self.killed);
        let recorder = Arc::clone(&self.recorder);
        AbortHandle::new(move || {
            if !killed.swap(true, Ordering::SeqCst) {
                recorder.aborted.fetch_add(1, Ordering::SeqCst);
            }
        })
    }
}

fn canvas() -> CanvasConfig {
    CanvasConfig {
        width: 8,
        height: 4,
        fps: 100,
        upscale: true,
    }
}

fn pipeline(recorder: &Arc<Recorder>, audio: bool) -> StreamPipeline {
    let stream = StreamConfig {
        audio_enabled: audio,
        stop_grace_ms: 200,
        ..StreamConfig::default()
    };
    StreamPipeline::with_launcher(&canvas(), &stream, Arc::new(FakeLauncher(Arc::clone(recorder))))
}

fn frame() -> RgbImage {
    RgbImage::new(8, 4)
}

fn wait_for(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn full_queue_drops_newest_frames() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline(&recorder, false);

    let accepted = (0..40).filter(|_| pipeline.push_video_frame(frame())).count();

    let status = pipeline.status();
    assert_eq!(accepted, 30);
    assert_eq!(status.video_queue_depth, 30);
    assert_eq!(status.video_dropped, 10);
    assert_eq!(status.state, StreamState::Idle);
}

#[test]
fn wrong_sized_frames_are_rejected() {
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline(&recorder, false);
    assert!(!pipeline.push_video_frame(RgbImage::new(4, 4)));
    assert_eq!(pipeline.status().video_queue_depth, 0);
}

#[test]
fn frames_are_drained_into_the_encoder() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = pipeline(&recorder, true);

    pipeline
        .start(StreamTarget::publish("rtmp://live.example/app", "key"))
        .unwrap();
    wait_for("streaming", || pipeline.status().streaming);
    assert_eq!(
        pipeline.status().destination.as_deref(),
        Some("rtmp://live.example/app/****")
    );

    for _ in 0..5 {
        assert!(pipeline.push_video_frame(frame()));
    }
    assert!(pipeline.push_audio_chunk(vec![0.25; 64]));
    wait_for("frames written", || pipeline.status().frames_written == 5);
    // Silence keeps flowing when no audio is queued.
    wait_for("audio", || recorder.audio_bytes.load(Ordering::SeqCst) > 64 * 4);

    pipeline.stop();
    assert_eq!(pipeline.state(), StreamState::Idle);
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.aborted.load(Ordering::SeqCst), 0);
    assert_eq!(
        recorder.targets.lock().unwrap().as_slice(),
        ["rtmp://live.example/app/key".to_string()]
    );
}

#[test]
fn second_start_while_streaming_is_ignored() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = pipeline(&recorder, false);

    pipeline.start(StreamTarget::publish("rtmp://a", "1")).unwrap();
    wait_for("streaming", || pipeline.status().streaming);
    pipeline.start(StreamTarget::publish("rtmp://b", "2")).unwrap();

    assert_eq!(recorder.launches.load(Ordering::SeqCst), 1);
    pipeline.stop();
}

#[test]
fn encoder_death_returns_pipeline_to_idle() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = pipeline(&recorder, false);

    pipeline.start(StreamTarget::publish("rtmp://a", "k")).unwrap();
    wait_for("streaming", || pipeline.status().streaming);
    for _ in 0..3 {
        pipeline.push_video_frame(frame());
    }

    recorder.exited.store(true, Ordering::SeqCst);
    wait_for("idle", || pipeline.state() == StreamState::Idle);

    let status = pipeline.status();
    assert!(!status.streaming);
    assert!(status.last_error.unwrap().contains("exited"));
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);

    pipeline.stop();
    pipeline.stop();
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);

    // Retry without rebuilding the pipeline.
    recorder.exited.store(false, Ordering::SeqCst);
    pipeline.start(StreamTarget::publish("rtmp://a", "k")).unwrap();
    wait_for("streaming again", || pipeline.status().streaming);
    assert!(pipeline.status().last_error.is_none());
    pipeline.stop();
    assert_eq!(recorder.launches.load(Ordering::SeqCst), 2);
}

#[test]
fn failed_launch_leaves_pipeline_idle() {
    let recorder = Arc::new(Recorder::default());
    recorder.fail_launch.store(true, Ordering::SeqCst);
    let mut pipeline = pipeline(&recorder, false);

    pipeline
        .start(StreamTarget::File("/tmp/scenecast_take.mkv".into()))
        .unwrap();
    wait_for("launch failure", || pipeline.status().last_error.is_some());
    wait_for("idle", || pipeline.state() == StreamState::Idle);
    pipeline.stop();
}

#[test]
fn hung_encoder_is_aborted_after_grace() {
    let recorder = Arc::new(Recorder::default());
    recorder.hang_on_finish.store(true, Ordering::SeqCst);
    let mut pipeline = pipeline(&recorder, false);

    pipeline.start(StreamTarget::publish("rtmp://a", "k")).unwrap();
    wait_for("streaming", || pipeline.status().streaming);

    let started = Instant::now();
    pipeline.stop();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(recorder.aborted.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.state(), StreamState::Idle);
    assert!(pipeline.status().last_error.is_none());
}

#[test]
fn killing_a_blocked_encoder_on_stop_is_not_an_error() {
    let recorder = Arc::new(Recorder::default());
    recorder.hang_on_write.store(true, Ordering::SeqCst);
    let mut pipeline = pipeline(&recorder, false);

    pipeline.start(StreamTarget::publish("rtmp://a", "k")).unwrap();
    wait_for("streaming", || pipeline.status().streaming);
    assert!(pipeline.push_video_frame(frame()));
    wait_for("blocked write", || pipeline.status().video_queue_depth == 0);

    pipeline.stop();
    assert!(recorder.aborted.load(Ordering::SeqCst) >= 1);
    let status = pipeline.status();
    assert_eq!(status.state, StreamState::Idle);
    assert_eq!(status.last_error, None);
}

#[test]
fn stop_discards_unsent_frames() {
    let recorder = Arc::new(Recorder::default());
    let mut pipeline = pipeline(&recorder, false);
    for _ in 0..10 {
        pipeline.push_video_frame(frame());
    }
    pipeline.stop();
    assert_eq!(pipeline.status().video_queue_depth, 0);
}
