//! Conversion job lifecycle
//!
//! `Idle -> Validating -> Running -> {Succeeded, Failed}`. A job runs once;
//! retrying means building a new job. The job is the only writer of its
//! state; everyone else watches [`JobSnapshot`]s through a [`JobHandle`].

use std::fmt;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::encoder::EncoderAdapter;
use crate::error::ConversionError;
use crate::progress::{progress_channel, ProgressTracker, ProgressUpdate, DEFAULT_PROGRESS_CAPACITY};
use crate::validate::SequenceDescriptor;

pub const FRAMERATE_RANGE: RangeInclusive<u32> = 1..=120;
pub const WIDTH_RANGE: RangeInclusive<u32> = 1..=10_000;

/// What the user asked for, before it is bound to a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionParams {
    pub framerate: u32,
    /// Output width in pixels; the encoder derives the height.
    pub width: u32,
    pub loop_forever: bool,
    pub output_path: PathBuf,
}

/// Conversion parameters bound to a validated sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    descriptor: Arc<SequenceDescriptor>,
    params: ConversionParams,
}

impl ConversionRequest {
    pub fn new(descriptor: Arc<SequenceDescriptor>, params: ConversionParams) -> Self {
        Self { descriptor, params }
    }

    pub fn descriptor(&self) -> &SequenceDescriptor {
        &self.descriptor
    }

    pub fn params(&self) -> &ConversionParams {
        &self.params
    }

    pub fn output_path(&self) -> &Path {
        &self.params.output_path
    }

    /// Bounds check done before the encoder is ever contacted.
    pub fn check(&self) -> Result<(), ConversionError> {
        if !FRAMERATE_RANGE.contains(&self.params.framerate) {
            return Err(ConversionError::InvalidParameters(format!(
                "Framerate must be between {} and {}",
                FRAMERATE_RANGE.start(),
                FRAMERATE_RANGE.end()
            )));
        }
        if !WIDTH_RANGE.contains(&self.params.width) {
            return Err(ConversionError::InvalidParameters(format!(
                "Width must be between {} and {}",
                WIDTH_RANGE.start(),
                WIDTH_RANGE.end()
            )));
        }
        if self.params.output_path.to_string_lossy().trim().is_empty() {
            return Err(ConversionError::InvalidParameters(
                "Please specify an output path".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Idle,
    Validating,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Idle => "idle",
            JobState::Validating => "validating",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Read-only copy of a job's state at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub state: JobState,
    pub progress: Option<ProgressUpdate>,
    pub outcome: Option<Result<PathBuf, ConversionError>>,
}

impl JobSnapshot {
    fn idle() -> Self {
        Self {
            state: JobState::Idle,
            progress: None,
            outcome: None,
        }
    }

    pub fn percent(&self) -> f32 {
        self.progress.map_or(0.0, |update| update.percent)
    }

    pub fn output_path(&self) -> Option<&Path> {
        match &self.outcome {
            Some(Ok(path)) => Some(path),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ConversionError> {
        match &self.outcome {
            Some(Err(error)) => Some(error),
            _ => None,
        }
    }
}

/// Sticky cancellation flag shared between a job, its handles and the encoder.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { flag: Arc::new(tx) }
    }

    /// Once set the flag stays set.
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Observer side of a job: watch snapshots, ask for cancellation.
#[derive(Debug, Clone)]
pub struct JobHandle {
    cancel: CancelToken,
    snapshots: watch::Receiver<JobSnapshot>,
}

impl JobHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the job is gone.
    pub async fn changed(&mut self) -> Option<JobSnapshot> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    /// Wait until the job reaches a terminal state.
    pub async fn finished(&mut self) -> JobSnapshot {
        loop {
            {
                let snapshot = self.snapshots.borrow_and_update();
                if snapshot.state.is_terminal() {
                    return snapshot.clone();
                }
            }
            if self.snapshots.changed().await.is_err() {
                return self.snapshots.borrow().clone();
            }
        }
    }
}

pub struct ConversionJob {
    request: ConversionRequest,
    state: JobState,
    progress: ProgressTracker,
    outcome: Option<Result<PathBuf, ConversionError>>,
    cancel: CancelToken,
    snapshots: watch::Sender<JobSnapshot>,
    progress_capacity: usize,
}

impl ConversionJob {
    pub fn new(request: ConversionRequest) -> Self {
        let (snapshots, _) = watch::channel(JobSnapshot::idle());
        Self {
            request,
            state: JobState::Idle,
            progress: ProgressTracker::default(),
            outcome: None,
            cancel: CancelToken::new(),
            snapshots,
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }

    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity.max(1);
        self
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            cancel: self.cancel.clone(),
            snapshots: self.snapshots.subscribe(),
        }
    }

    pub fn request(&self) -> &ConversionRequest {
        &self.request
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn last_progress(&self) -> Option<ProgressUpdate> {
        self.progress.last()
    }

    pub fn outcome(&self) -> Option<&Result<PathBuf, ConversionError>> {
        self.outcome.as_ref()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            state: self.state,
            progress: self.progress.last(),
            outcome: self.outcome.clone(),
        }
    }

    /// `Idle -> Validating`, or straight to `Failed` when the parameters are
    /// out of bounds.
    pub fn start(&mut self) -> Result<(), ConversionError> {
        if self.state != JobState::Idle {
            return Err(ConversionError::InvalidParameters(format!(
                "a job can only be started once (it is {})",
                self.state
            )));
        }
        if let Err(error) = self.request.check() {
            self.finish(Err(error.clone()));
            return Err(error);
        }
        self.transition(JobState::Validating);
        Ok(())
    }

    /// `Validating -> Running`. Returns what the encoder has to work on.
    pub fn dispatch(&mut self) -> Result<ConversionRequest, ConversionError> {
        if self.state != JobState::Validating {
            return Err(ConversionError::InvalidParameters(format!(
                "cannot dispatch a job that is {}",
                self.state
            )));
        }
        self.transition(JobState::Running);
        Ok(self.request.clone())
    }

    /// Apply a progress update while running. Stale updates are ignored.
    pub fn record_progress(&mut self, update: ProgressUpdate) -> bool {
        if self.state != JobState::Running {
            return false;
        }
        if self.progress.apply(update).is_none() {
            return false;
        }
        self.publish();
        true
    }

    /// The encoder finished. Still a failure if cancellation was requested.
    pub fn complete(&mut self, output_path: PathBuf) {
        if self.state != JobState::Running {
            warn!("Ignoring completion of a job that is {}", self.state);
            return;
        }
        if self.cancel.is_cancelled() {
            self.finish(Err(ConversionError::Cancelled));
        } else {
            self.finish(Ok(output_path));
        }
    }

    pub fn fail(&mut self, error: ConversionError) {
        if self.state.is_terminal() {
            return;
        }
        let error = if self.cancel.is_cancelled() {
            ConversionError::Cancelled
        } else {
            error
        };
        self.finish(Err(error));
    }

    /// Drive the job from `Idle` to a terminal state.
    pub async fn run<E: EncoderAdapter>(mut self, encoder: &E) -> JobSnapshot {
        if self.start().is_err() {
            return self.snapshot();
        }
        if self.cancel.is_cancelled() {
            self.fail(ConversionError::Cancelled);
            return self.snapshot();
        }
        if !encoder.is_available() {
            self.fail(ConversionError::EncoderUnavailable(
                "the encoder is not installed or not found in PATH".to_string(),
            ));
            return self.snapshot();
        }

        let request = match self.dispatch() {
            Ok(request) => request,
            Err(error) => {
                self.fail(error);
                return self.snapshot();
            }
        };

        let (progress_tx, mut progress_rx) = progress_channel(self.progress_capacity);
        let encode = encoder.encode(request, progress_tx, self.cancel.clone());
        tokio::pin!(encode);

        let result = loop {
            tokio::select! {
                biased;
                Some(update) = progress_rx.recv() => {
                    self.record_progress(update);
                }
                result = &mut encode => break result,
            }
        };
        while let Some(update) = progress_rx.try_recv() {
            self.record_progress(update);
        }

        match result {
            Ok(output_path) => self.complete(output_path),
            Err(error) => self.fail(error),
        }
        self.snapshot()
    }

    fn transition(&mut self, state: JobState) {
        debug!("Job {} -> {}", self.state, state);
        self.state = state;
        self.publish();
    }

    fn finish(&mut self, outcome: Result<PathBuf, ConversionError>) {
        let state = match &outcome {
            Ok(path) => {
                info!("Conversion finished: {}", path.display());
                JobState::Succeeded
            }
            Err(error) => {
                warn!("Conversion failed: {}", error);
                JobState::Failed
            }
        };
        self.outcome = Some(outcome);
        self.transition(state);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze_sequence;
    use crate::sequence::SequenceMatcher;

    fn request(framerate: u32, width: u32, output: &str) -> ConversionRequest {
        let descriptor = analyze_sequence(
            &SequenceMatcher::default(),
            ["a/img_001.png", "a/img_002.png", "a/img_003.png"],
        )
        .unwrap();
        ConversionRequest::new(
            Arc::new(descriptor),
            ConversionParams {
                framerate,
                width,
                loop_forever: true,
                output_path: PathBuf::from(output),
            },
        )
    }

    #[test]
    fn test_parameter_bounds() {
        for (framerate, width) in [(0, 480), (121, 480), (10, 0), (10, 10_001)] {
            let err = request(framerate, width, "out.gif").check().unwrap_err();
            assert!(matches!(err, ConversionError::InvalidParameters(_)), "{framerate} {width}");
        }
        for (framerate, width) in [(1, 480), (120, 480), (10, 1), (10, 10_000)] {
            assert!(request(framerate, width, "out.gif").check().is_ok(), "{framerate} {width}");
        }
        assert!(request(10, 480, "").check().is_err());
        assert!(request(10, 480, "   ").check().is_err());
    }

    #[test]
    fn test_invalid_start_fails_immediately() {
        let mut job = ConversionJob::new(request(0, 480, "out.gif"));
        assert!(job.start().is_err());
        assert_eq!(job.state(), JobState::Failed);
        assert!(matches!(
            job.outcome(),
            Some(Err(ConversionError::InvalidParameters(_)))
        ));
        assert!(job.dispatch().is_err());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = ConversionJob::new(request(10, 480, "out.gif"));
        let handle = job.handle();
        assert_eq!(job.state(), JobState::Idle);

        job.start().unwrap();
        assert_eq!(job.state(), JobState::Validating);
        assert!(job.start().is_err());
        assert!(!job.record_progress(ProgressUpdate::new(1, 10.0)));

        job.dispatch().unwrap();
        assert_eq!(handle.snapshot().state, JobState::Running);

        assert!(job.record_progress(ProgressUpdate::new(1, 10.0)));
        assert!(job.record_progress(ProgressUpdate::new(2, 40.0)));
        assert!(!job.record_progress(ProgressUpdate::new(1, 5.0)));
        assert_eq!(handle.snapshot().percent(), 40.0);

        job.complete(PathBuf::from("out.gif"));
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.state, JobState::Succeeded);
        assert_eq!(snapshot.output_path(), Some(Path::new("out.gif")));

        // Terminal: nothing moves it any more.
        assert!(!job.record_progress(ProgressUpdate::new(3, 100.0)));
        job.fail(ConversionError::EncodingFailed("late".to_string()));
        assert_eq!(job.state(), JobState::Succeeded);
    }

    #[test]
    fn test_cancel_is_sticky_over_completion() {
        let mut job = ConversionJob::new(request(10, 480, "out.gif"));
        let handle = job.handle();
        job.start().unwrap();
        job.dispatch().unwrap();

        handle.cancel();
        job.complete(PathBuf::from("out.gif"));

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(handle.snapshot().error(), Some(&ConversionError::Cancelled));
    }

    #[test]
    fn test_error_after_cancel_reports_cancelled() {
        let mut job = ConversionJob::new(request(10, 480, "out.gif"));
        job.start().unwrap();
        job.dispatch().unwrap();
        job.handle().cancel();
        job.fail(ConversionError::EncodingFailed("killed".to_string()));
        assert_eq!(job.outcome(), Some(&Err(ConversionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_token_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());

        // Already cancelled: resolves at once.
        token.cancelled().await;
    }
}
