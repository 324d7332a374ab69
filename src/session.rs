//! One user's working state: the loaded sequence and at most one running job.
//!
//! Front ends own a [`Session`] instead of keeping sequence and job state in
//! globals. Analysis replaces the loaded sequence; a conversion takes a shared
//! reference to it, so re-analysing while a job runs does not disturb the job.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::analysis::{analyze_sequence, SequenceAnalysis};
use crate::config::Settings;
use crate::encoder::{EncoderAdapter, EncoderInfo, FfmpegEncoder};
use crate::error::ConversionError;
use crate::job::{ConversionJob, ConversionParams, ConversionRequest, JobHandle, JobSnapshot, JobState};
use crate::progress::DEFAULT_PROGRESS_CAPACITY;
use crate::sequence::SequenceMatcher;
use crate::validate::SequenceDescriptor;

/// Clears the session's busy flag when the job task ends, panics included.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Session<E> {
    encoder: Arc<E>,
    matcher: SequenceMatcher,
    descriptor: Option<Arc<SequenceDescriptor>>,
    active: Arc<AtomicBool>,
    progress_capacity: usize,
}

impl Session<FfmpegEncoder> {
    pub fn from_settings(settings: &Settings) -> Self {
        Session::new(settings.encoder.encoder(), settings.matcher())
            .with_progress_capacity(settings.progress_capacity)
    }
}

impl<E: EncoderAdapter + 'static> Session<E> {
    pub fn new(encoder: E, matcher: SequenceMatcher) -> Self {
        Self {
            encoder: Arc::new(encoder),
            matcher,
            descriptor: None,
            active: Arc::new(AtomicBool::new(false)),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
        }
    }

    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        self.progress_capacity = capacity.max(1);
        self
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn encoder_info(&self) -> EncoderInfo {
        self.encoder.probe()
    }

    pub fn matcher(&self) -> &SequenceMatcher {
        &self.matcher
    }

    /// Analyse `paths` and make the result the loaded sequence. An invalid
    /// set unloads whatever was loaded before.
    pub fn analyze<I, P>(&mut self, paths: I) -> SequenceAnalysis
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let result = analyze_sequence(&self.matcher, paths);
        let analysis = SequenceAnalysis::from(result.as_ref());
        match result {
            Ok(descriptor) => {
                info!(
                    "Loaded {} ({} frames)",
                    descriptor.pattern(),
                    descriptor.frame_count()
                );
                self.descriptor = Some(Arc::new(descriptor));
            }
            Err(e) => {
                debug!("Rejected input: {}", e);
                self.descriptor = None;
            }
        }
        analysis
    }

    pub fn descriptor(&self) -> Option<&SequenceDescriptor> {
        self.descriptor.as_deref()
    }

    pub fn reset(&mut self) {
        self.descriptor = None;
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Start converting the loaded sequence on the current tokio runtime.
    ///
    /// Refused with [`ConversionError::InvalidParameters`] when nothing is
    /// loaded or another conversion from this session is still running.
    pub fn start_conversion(
        &self,
        params: ConversionParams,
    ) -> Result<RunningConversion, ConversionError> {
        let descriptor = self.descriptor.clone().ok_or_else(|| {
            ConversionError::InvalidParameters("No valid sequence loaded".to_string())
        })?;

        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConversionError::InvalidParameters(
                "A conversion is already running".to_string(),
            ));
        }
        let guard = ActiveGuard(self.active.clone());

        let job = ConversionJob::new(ConversionRequest::new(descriptor, params))
            .with_progress_capacity(self.progress_capacity);
        let handle = job.handle();
        let encoder = self.encoder.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            job.run(encoder.as_ref()).await
        });

        Ok(RunningConversion { handle, task })
    }
}

/// A conversion started by a [`Session`].
pub struct RunningConversion {
    handle: JobHandle,
    task: JoinHandle<JobSnapshot>,
}

impl RunningConversion {
    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the job task and return its terminal snapshot.
    pub async fn wait(self) -> JobSnapshot {
        match self.task.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let mut snapshot = self.handle.snapshot();
                snapshot.state = JobState::Failed;
                snapshot.outcome = Some(Err(ConversionError::EncodingFailed(format!(
                    "conversion task ended unexpectedly: {}",
                    e
                ))));
                snapshot
            }
        }
    }
}
