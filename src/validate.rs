//! Sequence validation
//!
//! Freezes a matched sequence into a [`SequenceDescriptor`]. Gaps in the
//! numbering are allowed: playback order is the sort order of the frame
//! numbers, not an assumption that they increase by one.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::error::SequenceError;
use crate::sequence::{FramePath, MatchedSequence};

/// Fewest frames that still make an animation.
pub const MIN_FRAMES: usize = 2;

/// One frame of a validated sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceFrame {
    pub index: u64,
    pub path: FramePath,
}

/// A validated, immutable frame sequence. Only [`validate`] builds one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceDescriptor {
    directory: PathBuf,
    prefix: String,
    suffix: String,
    extension: String,
    number_width: usize,
    start_number: u64,
    frames: Vec<SequenceFrame>,
}

pub fn validate(matched: MatchedSequence) -> Result<SequenceDescriptor, SequenceError> {
    let MatchedSequence {
        directory,
        prefix,
        suffix,
        extension,
        number_width,
        frames,
    } = matched;

    if frames.len() < MIN_FRAMES {
        return Err(SequenceError::SequenceTooShort(frames.len()));
    }

    let mut frames: Vec<SequenceFrame> = frames
        .into_iter()
        .map(|(index, path)| SequenceFrame { index, path })
        .collect();
    frames.sort_by_key(|frame| frame.index);

    let start_number = frames[0].index;
    let descriptor = SequenceDescriptor {
        directory,
        prefix,
        suffix,
        extension,
        number_width: number_width.max(1),
        start_number,
        frames,
    };

    let skipped = descriptor.skipped_count();
    if skipped > 0 {
        info!(
            "Sequence {} skips {} frame number(s); frames play in numeric order",
            descriptor.pattern(),
            skipped
        );
    }
    debug!(
        "Validated {} ({} frames from {})",
        descriptor.pattern(),
        descriptor.frame_count(),
        descriptor.start_number()
    );

    Ok(descriptor)
}

impl SequenceDescriptor {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn number_width(&self) -> usize {
        self.number_width
    }

    pub fn start_number(&self) -> u64 {
        self.start_number
    }

    pub fn end_number(&self) -> u64 {
        self.frames.last().map_or(self.start_number, |frame| frame.index)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Frames in playback order.
    pub fn frames(&self) -> &[SequenceFrame] {
        &self.frames
    }

    pub fn ordered_paths(&self) -> impl Iterator<Item = &Path> + '_ {
        self.frames.iter().map(|frame| frame.path.path())
    }

    /// printf-style name of the sequence, e.g. `img_%03d.png`.
    pub fn pattern(&self) -> String {
        let number = if self.number_width > 1 {
            format!("%0{}d", self.number_width)
        } else {
            "%d".to_string()
        };
        format!("{}{}{}.{}", self.prefix, number, self.suffix, self.extension)
    }

    /// Runs of frame numbers between the first and last frame that have no file.
    pub fn gaps(&self) -> Vec<RangeInclusive<u64>> {
        self.frames
            .windows(2)
            .filter(|pair| pair[1].index - pair[0].index > 1)
            .map(|pair| (pair[0].index + 1)..=(pair[1].index - 1))
            .collect()
    }

    pub fn skipped_count(&self) -> u64 {
        (self.end_number() - self.start_number) - (self.frames.len() as u64 - 1)
    }

    /// `<directory>/<prefix>_animated.<extension>`, the name offered when the
    /// user has not picked an output file.
    pub fn default_output_path(&self, extension: &str) -> PathBuf {
        let stem = self
            .prefix
            .trim_end_matches(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace());
        let stem = if stem.is_empty() { "sequence" } else { stem };
        let extension = extension.trim_start_matches('.');
        self.directory.join(format!("{}_animated.{}", stem, extension))
    }
}
