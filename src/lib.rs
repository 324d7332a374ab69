// Sequence detection and GIF conversion shared by the CLI and the GUI
pub mod analysis;
pub mod config;
pub mod encoder;
pub mod error;
pub mod job;
pub mod preflight;
pub mod progress;
pub mod sequence;
pub mod session;
pub mod validate;

pub use analysis::{analyze_sequence, SequenceAnalysis};
pub use config::{ConfigError, Settings};
pub use encoder::{install_hint, EncoderAdapter, EncoderInfo, FfmpegEncoder};
pub use error::{ConversionError, ErrorKind, SequenceError};
pub use job::{CancelToken, ConversionJob, ConversionParams, ConversionRequest, JobHandle, JobSnapshot, JobState};
pub use progress::{ProgressTracker, ProgressUpdate};
pub use sequence::{FramePath, SequenceMatcher};
pub use session::{RunningConversion, Session};
pub use validate::SequenceDescriptor;
