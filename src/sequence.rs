//! Numbered image sequence matching
//!
//! Turns an unordered set of file paths into the shared naming pattern of one
//! sequence: `<prefix><digits><suffix>.<ext>`, all in one directory.
//! Matching is all-or-nothing: a set that does not fit one pattern is
//! rejected instead of being narrowed down to a compatible subset.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;

use crate::error::SequenceError;

/// Extension accepted for input frames unless configured otherwise.
pub const DEFAULT_FRAME_EXTENSION: &str = "png";

/// A single input file, split into the directory it lives in and its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FramePath {
    path: PathBuf,
    directory: PathBuf,
    base_name: String,
}

impl FramePath {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SequenceError> {
        let path = path.into();
        let base_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                SequenceError::NotASequence(format!(
                    "'{}' has no usable file name",
                    path.display()
                ))
            })?
            .to_string();
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            path,
            directory,
            base_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.base_name)
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

/// A file stem cut around its frame number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedName<'a> {
    pub prefix: &'a str,
    pub digits: &'a str,
    pub suffix: &'a str,
}

/// Split a file stem around its last run of decimal digits.
///
/// Example: "shot_0042_beauty" -> ("shot_", "0042", "_beauty")
pub fn split_numbered(stem: &str) -> Option<NumberedName<'_>> {
    let bytes = stem.as_bytes();
    let end = bytes.iter().rposition(|b| b.is_ascii_digit())? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map_or(0, |i| i + 1);

    Some(NumberedName {
        prefix: &stem[..start],
        digits: &stem[start..end],
        suffix: &stem[end..],
    })
}

/// Output of a successful match: frames in input order plus the pattern
/// they all share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedSequence {
    pub directory: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub extension: String,
    /// Widest digit run seen; shorter runs are not rejected.
    pub number_width: usize,
    pub frames: Vec<(u64, FramePath)>,
}

/// Recognizes one numbered sequence among a set of paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMatcher {
    extension: String,
}

impl Default for SequenceMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_EXTENSION)
    }
}

impl SequenceMatcher {
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        Self { extension }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn accepts(&self, frame: &FramePath) -> bool {
        frame
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    pub fn match_paths<I, P>(&self, paths: I) -> Result<MatchedSequence, SequenceError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        if paths.len() < 2 {
            return Err(SequenceError::NotASequence(format!(
                "need at least 2 .{} files, got {}",
                self.extension,
                paths.len()
            )));
        }

        let frames = paths
            .into_iter()
            .map(FramePath::new)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(frame) = frames.iter().find(|frame| !self.accepts(frame)) {
            return Err(SequenceError::NotASequence(format!(
                "'{}' is not a .{} file",
                frame.base_name(),
                self.extension
            )));
        }

        let directory = frames[0].directory().to_path_buf();
        if let Some(frame) = frames.iter().find(|frame| frame.directory() != directory) {
            return Err(SequenceError::NotASequence(format!(
                "frames span more than one directory ('{}' and '{}')",
                directory.display(),
                frame.directory().display()
            )));
        }

        let numbered = frames
            .iter()
            .filter(|frame| split_numbered(frame.stem()).is_some())
            .count();
        if numbered < 2 {
            return Err(SequenceError::NotASequence(format!(
                "file names must end with a frame number (e.g. frame_001.{})",
                self.extension
            )));
        }

        // The first numbered frame fixes the pattern every other frame must follow.
        let (template, extension) = frames
            .iter()
            .find_map(|frame| {
                split_numbered(frame.stem()).map(|name| {
                    let extension = frame.extension().unwrap_or(&self.extension).to_string();
                    ((name.prefix.to_string(), name.suffix.to_string(), name.digits.len()), extension)
                })
            })
            .ok_or_else(|| SequenceError::NotASequence("no numbered frames".to_string()))?;
        let (prefix, suffix, template_width) = template;
        let expected = format!("{}{}{}.{}", prefix, "#".repeat(template_width), suffix, extension);

        let mut seen: HashMap<u64, usize> = HashMap::with_capacity(frames.len());
        let mut matched: Vec<(u64, FramePath)> = Vec::with_capacity(frames.len());
        let mut number_width = 0;

        for frame in frames {
            let name = split_numbered(frame.stem())
                .filter(|name| name.prefix == prefix && name.suffix == suffix)
                .ok_or_else(|| SequenceError::AmbiguousGrouping {
                    expected: expected.clone(),
                    found: frame.base_name().to_string(),
                })?;

            let index = name.digits.parse::<u64>().map_err(|_| {
                SequenceError::NotASequence(format!(
                    "frame number in '{}' is too large",
                    frame.base_name()
                ))
            })?;
            number_width = number_width.max(name.digits.len());

            if let Some(&previous) = seen.get(&index) {
                let first: &FramePath = &matched[previous].1;
                return Err(SequenceError::DuplicateFrameIndex {
                    index,
                    first: first.base_name().to_string(),
                    second: frame.base_name().to_string(),
                });
            }
            seen.insert(index, matched.len());
            matched.push((index, frame));
        }

        debug!(
            "Matched {} frames as '{}' in {}",
            matched.len(),
            expected,
            directory.display()
        );

        Ok(MatchedSequence {
            directory,
            prefix,
            suffix,
            extension,
            number_width,
            frames: matched,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(matched: &MatchedSequence) -> Vec<u64> {
        matched.frames.iter().map(|(index, _)| *index).collect()
    }

    #[test]
    fn test_split_numbered() {
        assert_eq!(
            split_numbered("img_001"),
            Some(NumberedName { prefix: "img_", digits: "001", suffix: "" })
        );
        assert_eq!(
            split_numbered("shot_0042_beauty"),
            Some(NumberedName { prefix: "shot_", digits: "0042", suffix: "_beauty" })
        );
        assert_eq!(
            split_numbered("12"),
            Some(NumberedName { prefix: "", digits: "12", suffix: "" })
        );
        assert_eq!(split_numbered("cover"), None);
    }

    #[test]
    fn test_split_takes_whole_trailing_run() {
        let name = split_numbered("v2_frame10").unwrap();
        assert_eq!(name.prefix, "v2_frame");
        assert_eq!(name.digits, "10");
    }

    #[test]
    fn test_match_keeps_input_order() {
        let matched = SequenceMatcher::default()
            .match_paths(["a/img_003.png", "a/img_001.png", "a/img_002.png"])
            .unwrap();
        assert_eq!(indices(&matched), vec![3, 1, 2]);
        assert_eq!(matched.prefix, "img_");
        assert_eq!(matched.suffix, "");
        assert_eq!(matched.directory, PathBuf::from("a"));
        assert_eq!(matched.number_width, 3);
    }

    #[test]
    fn test_mixed_widths_record_maximum() {
        let matched = SequenceMatcher::default()
            .match_paths(["seq/f9.png", "seq/f10.png", "seq/f11.png"])
            .unwrap();
        assert_eq!(matched.number_width, 2);
        assert_eq!(indices(&matched), vec![9, 10, 11]);
    }

    #[test]
    fn test_suffix_must_match() {
        let matched = SequenceMatcher::default()
            .match_paths(["r/shot_01_beauty.png", "r/shot_02_beauty.png"])
            .unwrap();
        assert_eq!(matched.suffix, "_beauty");

        let err = SequenceMatcher::default()
            .match_paths(["r/shot_01_beauty.png", "r/shot_02_depth.png"])
            .unwrap_err();
        assert!(matches!(err, SequenceError::AmbiguousGrouping { .. }));
    }

    #[test]
    fn test_prefix_mismatch_fails_closed() {
        let err = SequenceMatcher::default()
            .match_paths(["a/img_001.png", "a/img_002.png", "a/imgs_003.png"])
            .unwrap_err();
        assert_eq!(
            err,
            SequenceError::AmbiguousGrouping {
                expected: "img_###.png".to_string(),
                found: "imgs_003.png".to_string(),
            }
        );
    }

    #[test]
    fn test_unnumbered_outlier_is_ambiguous() {
        let err = SequenceMatcher::default()
            .match_paths(["a/img_001.png", "a/img_002.png", "a/cover.png"])
            .unwrap_err();
        assert!(matches!(err, SequenceError::AmbiguousGrouping { .. }));
    }

    #[test]
    fn test_duplicate_index() {
        let err = SequenceMatcher::default()
            .match_paths(["a/img_1.png", "a/img_2.png", "a/img_01.png"])
            .unwrap_err();
        assert_eq!(
            err,
            SequenceError::DuplicateFrameIndex {
                index: 1,
                first: "img_1.png".to_string(),
                second: "img_01.png".to_string(),
            }
        );
    }

    #[test]
    fn test_not_a_sequence() {
        let matcher = SequenceMatcher::default();

        let err = matcher.match_paths(["a/img_001.png"]).unwrap_err();
        assert!(matches!(err, SequenceError::NotASequence(_)));

        let err = matcher.match_paths(Vec::<PathBuf>::new()).unwrap_err();
        assert!(matches!(err, SequenceError::NotASequence(_)));

        let err = matcher.match_paths(["a/img_001.png", "b/img_002.png"]).unwrap_err();
        assert!(matches!(err, SequenceError::NotASequence(_)));

        let err = matcher.match_paths(["a/img_001.png", "a/img_002.jpg"]).unwrap_err();
        assert!(matches!(err, SequenceError::NotASequence(_)));

        let err = matcher.match_paths(["a/one.png", "a/two.png"]).unwrap_err();
        assert!(matches!(err, SequenceError::NotASequence(_)));

        let err = matcher
            .match_paths(["a/f_1.png", "a/f_99999999999999999999999.png"])
            .unwrap_err();
        assert!(matches!(err, SequenceError::NotASequence(_)));
    }

    #[test]
    fn test_extension_is_case_insensitive_and_configurable() {
        let matched = SequenceMatcher::default()
            .match_paths(["a/F_1.PNG", "a/F_2.PNG"])
            .unwrap();
        assert_eq!(matched.extension, "PNG");

        let matcher = SequenceMatcher::new(".TGA");
        assert_eq!(matcher.extension(), "tga");
        assert!(matcher.match_paths(["a/f_1.tga", "a/f_2.tga"]).is_ok());
        assert!(matcher.match_paths(["a/f_1.png", "a/f_2.png"]).is_err());
    }
}
