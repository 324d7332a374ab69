use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Every way an analysis or a conversion can be refused.
///
/// Callers branch on the kind; the message of the error value is what gets
/// shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    NotASequence,
    AmbiguousGrouping,
    DuplicateFrameIndex,
    SequenceTooShort,
    InvalidParameters,
    EncoderUnavailable,
    EncodingFailed,
    Cancelled,
    UnreadableFrame,
    InconsistentFrameSize,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotASequence => "not a sequence",
            ErrorKind::AmbiguousGrouping => "ambiguous grouping",
            ErrorKind::DuplicateFrameIndex => "duplicate frame index",
            ErrorKind::SequenceTooShort => "sequence too short",
            ErrorKind::InvalidParameters => "invalid parameters",
            ErrorKind::EncoderUnavailable => "encoder unavailable",
            ErrorKind::EncodingFailed => "encoding failed",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::UnreadableFrame => "unreadable frame",
            ErrorKind::InconsistentFrameSize => "inconsistent frame size",
        };
        f.write_str(name)
    }
}

/// Rejection produced while matching and validating a set of frame paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("Not an image sequence: {0}")]
    NotASequence(String),

    #[error("Files do not share one naming pattern: expected '{expected}' but found '{found}'")]
    AmbiguousGrouping { expected: String, found: String },

    #[error("Frame number {index} is used twice: '{first}' and '{second}'")]
    DuplicateFrameIndex {
        index: u64,
        first: String,
        second: String,
    },

    #[error("Need at least 2 frames to make an animation, found {0}")]
    SequenceTooShort(usize),
}

impl SequenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SequenceError::NotASequence(_) => ErrorKind::NotASequence,
            SequenceError::AmbiguousGrouping { .. } => ErrorKind::AmbiguousGrouping,
            SequenceError::DuplicateFrameIndex { .. } => ErrorKind::DuplicateFrameIndex,
            SequenceError::SequenceTooShort(_) => ErrorKind::SequenceTooShort,
        }
    }
}

/// Failure of a conversion job. Terminal: a failed job is never resumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// The encoder's own diagnostic, passed through untouched.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Conversion cancelled")]
    Cancelled,

    #[error("Cannot read frame '{path}': {reason}")]
    UnreadableFrame { path: String, reason: String },

    #[error("Frame '{path}' is {}x{} but the sequence is {}x{}", found.0, found.1, expected.0, expected.1)]
    InconsistentFrameSize {
        path: String,
        expected: (u32, u32),
        found: (u32, u32),
    },
}

impl ConversionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConversionError::InvalidParameters(_) => ErrorKind::InvalidParameters,
            ConversionError::EncoderUnavailable(_) => ErrorKind::EncoderUnavailable,
            ConversionError::EncodingFailed(_) => ErrorKind::EncodingFailed,
            ConversionError::Cancelled => ErrorKind::Cancelled,
            ConversionError::UnreadableFrame { .. } => ErrorKind::UnreadableFrame,
            ConversionError::InconsistentFrameSize { .. } => ErrorKind::InconsistentFrameSize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let err = SequenceError::DuplicateFrameIndex {
            index: 1,
            first: "img_1.png".to_string(),
            second: "img_01.png".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Frame number 1 is used twice: 'img_1.png' and 'img_01.png'"
        );
        assert_eq!(err.kind(), ErrorKind::DuplicateFrameIndex);

        let err = ConversionError::InconsistentFrameSize {
            path: "b.png".to_string(),
            expected: (640, 480),
            found: (320, 240),
        };
        assert_eq!(
            err.to_string(),
            "Frame 'b.png' is 320x240 but the sequence is 640x480"
        );
    }

    #[test]
    fn kinds_serialize_by_name() {
        let json = serde_json::to_string(&ErrorKind::AmbiguousGrouping).unwrap();
        assert_eq!(json, "\"AmbiguousGrouping\"");
    }
}
