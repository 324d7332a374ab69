//! GIF encoding through an external ffmpeg process
//!
//! The job only sees [`EncoderAdapter`]: something that can say whether it is
//! installed and can turn a [`ConversionRequest`] into an output file while
//! reporting progress and honouring cancellation.

use std::ffi::OsString;
use std::fs;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use serde::Serialize;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::ConversionError;
use crate::job::{CancelToken, ConversionRequest};
use crate::preflight::inspect_frames;
use crate::progress::{ProgressSender, ProgressUpdate};
use crate::validate::SequenceDescriptor;

pub const DEFAULT_ENCODER_BINARY: &str = "ffmpeg";

/// Installation state of the encoder, as reported at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncoderInfo {
    pub installed: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

impl EncoderInfo {
    pub fn missing() -> Self {
        Self {
            installed: false,
            version: None,
            path: None,
        }
    }
}

pub trait EncoderAdapter: Send + Sync {
    fn probe(&self) -> EncoderInfo;

    /// Cheap re-check done right before a job is dispatched.
    fn is_available(&self) -> bool {
        self.probe().installed
    }

    /// Encode the request's frames. Progress goes to `progress`; once `cancel`
    /// fires the encoder stops and returns [`ConversionError::Cancelled`].
    fn encode(
        &self,
        request: ConversionRequest,
        progress: ProgressSender,
        cancel: CancelToken,
    ) -> impl Future<Output = Result<PathBuf, ConversionError>> + Send;
}

/// Platform advice shown when no encoder can be found.
pub fn install_hint() -> &'static str {
    if cfg!(target_os = "macos") {
        "Install with: brew install ffmpeg"
    } else if cfg!(target_os = "windows") {
        "Download from https://ffmpeg.org/download.html and add its bin folder to PATH"
    } else {
        "Install ffmpeg with your package manager or download it from https://ffmpeg.org/download.html"
    }
}

/// Places ffmpeg usually lives when it is not on PATH.
pub fn common_install_dirs() -> Vec<PathBuf> {
    let dirs: &[&str] = if cfg!(target_os = "windows") {
        &[
            "C:\\ffmpeg\\bin",
            "C:\\Program Files\\ffmpeg\\bin",
            "C:\\Program Files (x86)\\ffmpeg\\bin",
        ]
    } else if cfg!(target_os = "macos") {
        &[
            "/opt/homebrew/bin", // Homebrew Apple Silicon
            "/usr/local/bin",    // Homebrew Intel
            "/usr/bin",
            "/opt/local/bin", // MacPorts
        ]
    } else {
        &["/usr/bin", "/usr/local/bin", "/snap/bin"]
    };
    dirs.iter().map(PathBuf::from).collect()
}

/// Scale, build a palette that keeps transparency, apply it.
pub fn gif_filter(width: u32) -> String {
    format!(
        "scale={}:-1:flags=lanczos,split[s0][s1];[s0]palettegen=reserve_transparent=1[p];[s1][p]paletteuse=alpha_threshold=128",
        width
    )
}

/// ffconcat list playing every frame for `1/framerate` seconds, in order.
///
/// Relative frame paths are resolved against `base`. The last frame is listed
/// twice so its duration is honoured.
pub fn concat_list(descriptor: &SequenceDescriptor, framerate: u32, base: &Path) -> String {
    let duration = 1.0 / f64::from(framerate.max(1));
    let mut list = String::from("ffconcat version 1.0\n");
    let mut last = None;
    for path in descriptor.ordered_paths() {
        let entry = quote_concat_path(&base.join(path));
        list.push_str(&format!("file {}\nduration {:.6}\n", entry, duration));
        last = Some(entry);
    }
    if let Some(entry) = last {
        list.push_str(&format!("file {}\n", entry));
    }
    list
}

fn quote_concat_path(path: &Path) -> String {
    format!("'{}'", path.to_string_lossy().replace('\'', "'\\''"))
}

/// Frame number from an ffmpeg progress line (`frame=42` or `frame=   42 fps=...`).
pub fn parse_progress_frame(line: &str) -> Option<u64> {
    let rest = line.split("frame=").nth(1)?;
    rest.split_whitespace().next()?.parse().ok()
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: String,
    search_dirs: Vec<PathBuf>,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODER_BINARY)
    }
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            search_dirs: common_install_dirs(),
        }
    }

    pub fn with_search_dirs(mut self, search_dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = search_dirs;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Resolve the binary: explicit path, then PATH, then the search dirs.
    pub fn locate(&self) -> Option<PathBuf> {
        let binary = Path::new(&self.binary);
        if binary.components().count() > 1 {
            return binary.is_file().then(|| binary.to_path_buf());
        }

        which::which(&self.binary).ok().or_else(|| {
            let file_name = self.file_name();
            self.search_dirs
                .iter()
                .map(|dir| dir.join(&file_name))
                .find(|candidate| candidate.is_file())
        })
    }

    fn file_name(&self) -> String {
        if cfg!(target_os = "windows") && Path::new(&self.binary).extension().is_none() {
            format!("{}.exe", self.binary)
        } else {
            self.binary.clone()
        }
    }

    /// First line of `<binary> -version`.
    fn version(path: &Path) -> Option<String> {
        let output = std::process::Command::new(path).arg("-version").output().ok()?;
        String::from_utf8(output.stdout)
            .ok()?
            .lines()
            .next()
            .map(|line| line.trim().to_string())
    }

    pub fn build_args(request: &ConversionRequest, list_path: &Path) -> Vec<OsString> {
        let params = request.params();
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-nostats",
            "-loglevel",
            "error",
            "-progress",
            "pipe:1",
            "-f",
            "concat",
            "-safe",
            "0",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(list_path.into());
        args.push("-vf".into());
        args.push(gif_filter(params.width).into());
        // Offsetting breaks transparency between frames
        args.push("-gifflags".into());
        args.push("-offsetting".into());
        args.push("-loop".into());
        args.push(if params.loop_forever { "0" } else { "-1" }.into());
        args.push("-y".into());
        args.push(params.output_path.as_os_str().to_owned());
        args
    }

    fn write_concat_list(request: &ConversionRequest) -> Result<NamedTempFile, ConversionError> {
        let base = std::env::current_dir().unwrap_or_default();
        let list = concat_list(request.descriptor(), request.params().framerate, &base);
        let write = || -> std::io::Result<NamedTempFile> {
            let mut file = tempfile::Builder::new()
                .prefix("seqgif-")
                .suffix(".ffconcat")
                .tempfile()?;
            file.write_all(list.as_bytes())?;
            file.flush()?;
            Ok(file)
        };
        write().map_err(|e| {
            ConversionError::EncodingFailed(format!("Failed to write frame list: {}", e))
        })
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) => warn!("Could not remove partial output {}: {}", path.display(), e),
        }
    }
}

impl EncoderAdapter for FfmpegEncoder {
    fn probe(&self) -> EncoderInfo {
        match self.locate() {
            Some(path) => EncoderInfo {
                installed: true,
                version: Self::version(&path),
                path: Some(path),
            },
            None => EncoderInfo::missing(),
        }
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    async fn encode(
        &self,
        request: ConversionRequest,
        progress: ProgressSender,
        cancel: CancelToken,
    ) -> Result<PathBuf, ConversionError> {
        let exe = self.locate().ok_or_else(|| {
            ConversionError::EncoderUnavailable(format!(
                "'{}' was not found. {}",
                self.binary,
                install_hint()
            ))
        })?;

        let preflight = request.clone();
        let geometry = tokio::task::spawn_blocking(move || inspect_frames(preflight.descriptor()))
            .await
            .map_err(|e| {
                ConversionError::EncodingFailed(format!("Frame check did not finish: {}", e))
            })??;
        debug!("Frames are {}x{}", geometry.width, geometry.height);

        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        let list = Self::write_concat_list(&request)?;
        let output_path = request.output_path().to_path_buf();
        let total_frames = request.descriptor().frame_count();

        let mut cmd = Command::new(&exe);
        cmd.args(Self::build_args(&request, list.path()))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        info!("Running {:?}", cmd.as_std());

        let mut child = cmd.spawn().map_err(|e| {
            ConversionError::EncodingFailed(format!("Failed to start {}: {}", exe.display(), e))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ConversionError::EncodingFailed("Failed to capture encoder output".to_string())
        })?;
        // Drain stderr on its own task so a chatty encoder never stalls on a full pipe.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut cancelled = false;
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) => {
                    if let Some(frame) = parse_progress_frame(&line) {
                        progress.report(ProgressUpdate::from_frame(frame, total_frames));
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("Stopped reading encoder progress: {}", e);
                    break;
                }
            }
        }

        let status = if cancelled {
            None
        } else {
            tokio::select! {
                _ = cancel.cancelled() => None,
                status = child.wait() => Some(status),
            }
        };

        let status = match status {
            Some(status) => status.map_err(|e| {
                ConversionError::EncodingFailed(format!("Encoder execution error: {}", e))
            })?,
            None => {
                info!("Cancelling encoder");
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop encoder: {}", e);
                }
                remove_partial(&output_path);
                return Err(ConversionError::Cancelled);
            }
        };

        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        drop(list);

        if !status.success() {
            remove_partial(&output_path);
            let cause = stderr.trim();
            let cause = if cause.is_empty() {
                format!("{} exited with {}", self.binary, status)
            } else {
                cause.to_string()
            };
            return Err(ConversionError::EncodingFailed(cause));
        }

        Ok(output_path)
    }
}
