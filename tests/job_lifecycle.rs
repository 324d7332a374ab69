use seqgif::progress::ProgressSender;
use seqgif::{
    analyze_sequence, CancelToken, ConversionError, ConversionJob, ConversionParams,
    ConversionRequest, EncoderAdapter, EncoderInfo, ErrorKind, JobState, ProgressUpdate,
    SequenceMatcher, Session,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

const FRAMES: [&str; 3] = ["shots/img_001.png", "shots/img_002.png", "shots/img_003.png"];

enum Finish {
    Succeed,
    Fail(&'static str),
}

/// Stands in for ffmpeg: reports a fixed progress script, then finishes the
/// way it was told to.
struct ScriptedEncoder {
    installed: bool,
    progress: Vec<ProgressUpdate>,
    finish: Finish,
    gate: Option<Arc<Notify>>,
    finish_after_cancel: bool,
    calls: Arc<AtomicUsize>,
}

impl ScriptedEncoder {
    fn new(finish: Finish) -> Self {
        Self {
            installed: true,
            progress: Vec::new(),
            finish,
            gate: None,
            finish_after_cancel: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn with_progress(mut self, updates: &[(u64, f32)]) -> Self {
        self.progress = updates
            .iter()
            .map(|&(frame, percent)| ProgressUpdate::new(frame, percent))
            .collect();
        self
    }

    fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl EncoderAdapter for ScriptedEncoder {
    fn probe(&self) -> EncoderInfo {
        EncoderInfo {
            installed: self.installed,
            version: Some("scripted".to_string()),
            path: None,
        }
    }

    async fn encode(
        &self,
        request: ConversionRequest,
        progress: ProgressSender,
        cancel: CancelToken,
    ) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for update in &self.progress {
            progress.report(*update);
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.finish_after_cancel {
            cancel.cancelled().await;
        }
        match self.finish {
            Finish::Succeed => Ok(request.output_path().to_path_buf()),
            Finish::Fail(message) => Err(ConversionError::EncodingFailed(message.to_string())),
        }
    }
}

fn params(framerate: u32, width: u32) -> ConversionParams {
    ConversionParams {
        framerate,
        width,
        loop_forever: true,
        output_path: PathBuf::from("shots/img_animated.gif"),
    }
}

fn job(framerate: u32, width: u32) -> ConversionJob {
    let descriptor = analyze_sequence(&SequenceMatcher::default(), FRAMES).unwrap();
    ConversionJob::new(ConversionRequest::new(Arc::new(descriptor), params(framerate, width)))
}

#[tokio::test]
async fn test_successful_conversion_reports_full_progress() {
    let encoder = ScriptedEncoder::new(Finish::Succeed).with_progress(&[(3, 100.0)]);
    let calls = encoder.calls();

    let snapshot = job(10, 480).run(&encoder).await;

    assert_eq!(snapshot.state, JobState::Succeeded);
    assert_eq!(snapshot.percent(), 100.0);
    assert_eq!(
        snapshot.output_path(),
        Some(PathBuf::from("shots/img_animated.gif").as_path())
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_late_progress_never_lowers_the_result() {
    let encoder =
        ScriptedEncoder::new(Finish::Succeed).with_progress(&[(1, 10.0), (2, 40.0), (1, 5.0)]);

    let snapshot = job(10, 480).run(&encoder).await;

    assert_eq!(snapshot.state, JobState::Succeeded);
    assert_eq!(snapshot.progress, Some(ProgressUpdate::new(2, 40.0)));
}

#[tokio::test]
async fn test_cancel_wins_over_racing_success() {
    let mut encoder = ScriptedEncoder::new(Finish::Succeed);
    encoder.finish_after_cancel = true;

    let job = job(10, 480);
    let mut handle = job.handle();
    let task = tokio::spawn(async move { job.run(&encoder).await });

    while handle.snapshot().state != JobState::Running {
        if handle.changed().await.is_none() {
            break;
        }
    }
    handle.cancel();

    let snapshot = task.await.unwrap();
    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(snapshot.error().map(ConversionError::kind), Some(ErrorKind::Cancelled));
    assert_eq!(handle.finished().await, snapshot);
}

#[tokio::test]
async fn test_cancel_before_dispatch_skips_encoder() {
    let encoder = ScriptedEncoder::new(Finish::Succeed);
    let calls = encoder.calls();

    let job = job(10, 480);
    job.handle().cancel();
    let snapshot = job.run(&encoder).await;

    assert_eq!(snapshot.error(), Some(&ConversionError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_out_of_bounds_parameters_never_reach_encoder() {
    for (framerate, width) in [(0, 480), (121, 480), (10, 0), (10, 10_001)] {
        let encoder = ScriptedEncoder::new(Finish::Succeed);
        let calls = encoder.calls();

        let snapshot = job(framerate, width).run(&encoder).await;

        assert_eq!(snapshot.state, JobState::Failed);
        assert_eq!(
            snapshot.error().map(ConversionError::kind),
            Some(ErrorKind::InvalidParameters)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0, "{framerate} {width}");
    }

    for (framerate, width) in [(1, 480), (120, 480), (10, 1), (10, 10_000)] {
        let encoder = ScriptedEncoder::new(Finish::Succeed);
        let snapshot = job(framerate, width).run(&encoder).await;
        assert_eq!(snapshot.state, JobState::Succeeded, "{framerate} {width}");
    }
}

#[tokio::test]
async fn test_missing_encoder_is_reported() {
    let mut encoder = ScriptedEncoder::new(Finish::Succeed);
    encoder.installed = false;
    let calls = encoder.calls();

    let snapshot = job(10, 480).run(&encoder).await;

    assert_eq!(
        snapshot.error().map(ConversionError::kind),
        Some(ErrorKind::EncoderUnavailable)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_encoder_failure_is_passed_through() {
    let cause = "shots/img_002.png: Invalid data found when processing input";
    let encoder = ScriptedEncoder::new(Finish::Fail(cause)).with_progress(&[(1, 33.0)]);

    let snapshot = job(10, 480).run(&encoder).await;

    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(
        snapshot.error(),
        Some(&ConversionError::EncodingFailed(cause.to_string()))
    );
    assert!(snapshot.error().unwrap().to_string().contains(cause));
}

#[tokio::test]
async fn test_session_runs_one_job_at_a_time() {
    let gate = Arc::new(Notify::new());
    let mut encoder = ScriptedEncoder::new(Finish::Succeed);
    encoder.gate = Some(gate.clone());
    let mut session = Session::new(encoder, SequenceMatcher::default());

    assert!(matches!(
        session.start_conversion(params(10, 480)),
        Err(ConversionError::InvalidParameters(_))
    ));

    assert!(session.analyze(FRAMES).is_valid());
    let first = session.start_conversion(params(10, 480)).unwrap();
    assert!(session.is_busy());
    assert!(matches!(
        session.start_conversion(params(12, 480)),
        Err(ConversionError::InvalidParameters(_))
    ));

    gate.notify_one();
    let snapshot = first.wait().await;
    assert_eq!(snapshot.state, JobState::Succeeded);
    assert!(!session.is_busy());

    gate.notify_one();
    let second = session.start_conversion(params(12, 480)).unwrap();
    assert_eq!(second.wait().await.state, JobState::Succeeded);
}

#[tokio::test]
async fn test_failed_analysis_unloads_sequence() {
    let mut session = Session::new(ScriptedEncoder::new(Finish::Succeed), SequenceMatcher::default());
    assert!(session.analyze(FRAMES).is_valid());
    assert!(session.descriptor().is_some());

    let analysis = session.analyze(["a/x.png", "b/y.png"]);
    assert!(!analysis.is_valid());
    assert!(session.descriptor().is_none());
    assert!(session.start_conversion(params(10, 480)).is_err());
}
