//! Raw frame reader over an FFmpeg child process.
//!
//! FFmpeg decodes the input (a video file or a capture device) and writes
//! fixed-size `rgb24` frames to stdout, which are read one at a time.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Rgb};
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{DetectError, DetectResult};
use crate::probe::{probe_video, VideoInfo};

/// Sequential source of decoded frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` at end of stream.
    async fn next_frame(&mut self) -> DetectResult<Option<DynamicImage>>;
}

/// Live capture device description.
#[derive(Debug, Clone)]
pub struct CameraSource {
    /// Device path or name (`/dev/video0`, `0`, ...)
    pub device: String,
    /// FFmpeg input format (`v4l2`, `avfoundation`, `dshow`)
    pub input_format: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second delivered to the caller
    pub fps: f64,
}

/// Reads decoded frames from FFmpeg.
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl FrameReader {
    /// Open a video file, scaling frames down to at most `max_width` pixels wide.
    pub async fn open_file(path: impl AsRef<Path>, max_width: u32) -> DetectResult<Self> {
        let path = path.as_ref();
        let info = probe_video(path).await?;
        let (width, height) = file_output_size(&info, max_width);

        debug!(
            path = %path.display(),
            source_width = info.width,
            source_height = info.height,
            rotation = info.rotation,
            width,
            height,
            "Opening video file"
        );

        let input = vec!["-i".to_string(), path.to_string_lossy().to_string()];
        Self::spawn(input, width, height, None)
    }

    /// Open a live capture device.
    pub fn open_device(source: &CameraSource) -> DetectResult<Self> {
        let input = vec![
            "-f".to_string(),
            source.input_format.clone(),
            "-video_size".to_string(),
            format!("{}x{}", source.width, source.height),
            "-i".to_string(),
            source.device.clone(),
        ];
        info!(
            device = %source.device,
            format = %source.input_format,
            fps = source.fps,
            "Opening camera"
        );
        Self::spawn(input, source.width, source.height, Some(source.fps))
    }

    fn spawn(input: Vec<String>, width: u32, height: u32, fps: Option<f64>) -> DetectResult<Self> {
        which::which("ffmpeg").map_err(|_| DetectError::FfmpegNotFound)?;

        let filter = match fps {
            Some(fps) if fps > 0.0 => format!("fps={},scale={}:{}", fps, width, height),
            _ => format!("scale={}:{}", width, height),
        };

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(&input)
            .args(["-vf", &filter, "-pix_fmt", "rgb24", "-f", "rawvideo", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| DetectError::ffmpeg_failed(format!("Failed to spawn FFmpeg: {}", e), None, None))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DetectError::ffmpeg_failed("Failed to capture FFmpeg stdout", None, None))?;

        // Drain stderr so FFmpeg never blocks on a full pipe
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(drain(stderr)));

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr_task,
            width,
            height,
            frames_read: 0,
        })
    }

    fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    /// Read the next frame. Returns `None` at end of stream.
    pub async fn next_frame(&mut self) -> DetectResult<Option<DynamicImage>> {
        let frame_size = self.frame_size();
        let mut buffer = vec![0u8; frame_size];

        let mut filled = 0;
        while filled < frame_size {
            let n = self.stdout.read(&mut buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < frame_size {
            if filled > 0 {
                warn!(bytes = filled, expected = frame_size, "Discarding truncated trailing frame");
            }
            return self.finish().await.map(|_| None);
        }

        let frame: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| DetectError::internal("Failed to create image buffer"))?;

        self.frames_read += 1;
        Ok(Some(DynamicImage::ImageRgb8(frame)))
    }

    /// Reap the child at end of stream. A stream that failed before
    /// producing any frame is an error.
    async fn finish(&mut self) -> DetectResult<()> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            if self.frames_read == 0 {
                return Err(DetectError::ffmpeg_failed(
                    "FFmpeg produced no frames",
                    Some(stderr),
                    status.code(),
                ));
            }
            warn!(code = ?status.code(), "FFmpeg exited with non-zero status after {} frames", self.frames_read);
        }
        Ok(())
    }

    /// Stop FFmpeg early.
    pub async fn close(mut self) -> DetectResult<()> {
        if let Err(e) = self.child.kill().await {
            debug!("FFmpeg already exited: {}", e);
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSource for FrameReader {
    async fn next_frame(&mut self) -> DetectResult<Option<DynamicImage>> {
        FrameReader::next_frame(self).await
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut out = String::new();
    if let Err(e) = reader.read_to_string(&mut out).await {
        debug!("Failed to read FFmpeg stderr: {}", e);
    }
    out
}

/// Output size for a probed file. FFmpeg rotates frames before the scale
/// filter runs, so the displayed orientation is what gets scaled.
fn file_output_size(info: &VideoInfo, max_width: u32) -> (u32, u32) {
    let (width, height) = info.display_size();
    output_size(width, height, max_width)
}

/// Output size for a source, capped at `max_width` with the aspect ratio
/// kept and both sides rounded down to even numbers.
pub fn output_size(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    let (w, h) = if max_width > 0 && width > max_width {
        let scaled = (height as u64 * max_width as u64 / width as u64) as u32;
        (max_width, scaled)
    } else {
        (width, height)
    };
    ((w & !1).max(2), (h & !1).max(2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_size_caps_width() {
        assert_eq!(output_size(1920, 1080, 1280), (1280, 720));
        assert_eq!(output_size(640, 480, 1280), (640, 480));
        assert_eq!(output_size(641, 361, 0), (640, 360));
        assert_eq!(output_size(1, 1, 1280), (2, 2));
    }

    #[test]
    fn test_rotated_file_keeps_portrait_aspect() {
        let portrait = VideoInfo { width: 3840, height: 2160, rotation: 90 };
        assert_eq!(file_output_size(&portrait, 1280), (1280, 2274));

        let landscape = VideoInfo { width: 3840, height: 2160, rotation: 180 };
        assert_eq!(file_output_size(&landscape, 1280), (1280, 720));
    }
}
