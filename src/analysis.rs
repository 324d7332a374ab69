//! Sequence analysis as seen from the outside
//!
//! [`SequenceAnalysis`] is what front ends receive after handing over a set of
//! dropped or picked paths. Its JSON form is
//! `{"valid": true, "pattern", "frameCount", "startNumber", "directory", "prefix"}`
//! or `{"valid": false, "error", "kind"}`.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Serialize, Serializer};

use crate::error::{ErrorKind, SequenceError};
use crate::sequence::SequenceMatcher;
use crate::validate::{validate, SequenceDescriptor};

/// Match and validate `paths` as one numbered sequence.
pub fn analyze_sequence<I, P>(
    matcher: &SequenceMatcher,
    paths: I,
) -> Result<SequenceDescriptor, SequenceError>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let matched = matcher.match_paths(paths)?;
    validate(matched)
}

/// Expand dropped or picked paths. Files are kept as given; a directory
/// contributes its files carrying the matcher's extension, in name order.
pub fn collect_frame_paths<I, P>(matcher: &SequenceMatcher, inputs: I) -> io::Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut paths = Vec::new();
    for input in inputs {
        let input = input.into();
        if !input.is_dir() {
            paths.push(input);
            continue;
        }
        let mut frames = Vec::new();
        for entry in fs::read_dir(&input)? {
            let path = entry?.path();
            let matches_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(matcher.extension()));
            if matches_extension && path.is_file() {
                frames.push(path);
            }
        }
        frames.sort();
        paths.extend(frames);
    }
    Ok(paths)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceAnalysis {
    Valid {
        pattern: String,
        frame_count: usize,
        start_number: u64,
        directory: String,
        prefix: String,
    },
    Invalid {
        kind: ErrorKind,
        error: String,
    },
}

impl SequenceAnalysis {
    pub fn is_valid(&self) -> bool {
        matches!(self, SequenceAnalysis::Valid { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SequenceAnalysis::Valid { .. } => None,
            SequenceAnalysis::Invalid { error, .. } => Some(error),
        }
    }
}

impl From<&SequenceDescriptor> for SequenceAnalysis {
    fn from(descriptor: &SequenceDescriptor) -> Self {
        SequenceAnalysis::Valid {
            pattern: descriptor.pattern(),
            frame_count: descriptor.frame_count(),
            start_number: descriptor.start_number(),
            directory: descriptor.directory().to_string_lossy().into_owned(),
            prefix: descriptor.prefix().to_string(),
        }
    }
}

impl From<&SequenceError> for SequenceAnalysis {
    fn from(error: &SequenceError) -> Self {
        SequenceAnalysis::Invalid {
            kind: error.kind(),
            error: error.to_string(),
        }
    }
}

impl<'a> From<Result<&'a SequenceDescriptor, &'a SequenceError>> for SequenceAnalysis {
    fn from(result: Result<&'a SequenceDescriptor, &'a SequenceError>) -> Self {
        match result {
            Ok(descriptor) => descriptor.into(),
            Err(error) => error.into(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidWire<'a> {
    valid: bool,
    pattern: &'a str,
    frame_count: usize,
    start_number: u64,
    directory: &'a str,
    prefix: &'a str,
}

#[derive(Serialize)]
struct InvalidWire<'a> {
    valid: bool,
    error: &'a str,
    kind: ErrorKind,
}

impl Serialize for SequenceAnalysis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SequenceAnalysis::Valid {
                pattern,
                frame_count,
                start_number,
                directory,
                prefix,
            } => ValidWire {
                valid: true,
                pattern,
                frame_count: *frame_count,
                start_number: *start_number,
                directory,
                prefix,
            }
            .serialize(serializer),
            SequenceAnalysis::Invalid { kind, error } => InvalidWire {
                valid: false,
                error,
                kind: *kind,
            }
            .serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn analyze(paths: &[&str]) -> SequenceAnalysis {
        let result = analyze_sequence(&SequenceMatcher::default(), paths.iter().copied());
        result.as_ref().into()
    }

    #[test]
    fn test_valid_wire_shape() {
        let analysis = analyze(&["a/img_001.png", "a/img_002.png", "a/img_003.png"]);
        assert!(analysis.is_valid());
        assert_eq!(
            serde_json::to_value(&analysis).unwrap(),
            json!({
                "valid": true,
                "pattern": "img_%03d.png",
                "frameCount": 3,
                "startNumber": 1,
                "directory": "a",
                "prefix": "img_",
            })
        );
    }

    #[test]
    fn test_invalid_wire_shape() {
        let analysis = analyze(&["a/x.png", "b/y.png"]);
        assert!(!analysis.is_valid());
        let value = serde_json::to_value(&analysis).unwrap();
        assert_eq!(value["valid"], json!(false));
        assert_eq!(value["kind"], json!("NotASequence"));
        assert_eq!(value["error"], json!(analysis.error().unwrap()));
    }

    #[test]
    fn test_directory_expands_to_frames() {
        let dir = TempDir::new().unwrap();
        for name in ["f_2.png", "f_1.PNG", "notes.txt", "f_animated.gif"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let extra = PathBuf::from("elsewhere/f_3.png");
        let paths = collect_frame_paths(
            &SequenceMatcher::default(),
            [dir.path().to_path_buf(), extra.clone()],
        )
        .unwrap();
        assert_eq!(
            paths,
            vec![dir.path().join("f_1.PNG"), dir.path().join("f_2.png"), extra]
        );
    }
}
