//! Live capture through an ffmpeg subprocess emitting raw RGB frames

use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use super::{CameraSource, Capture, Frame};
use crate::{Error, Result};

/// Opens a capture device through `ffmpeg`
pub struct FfmpegSource {
    /// Program and leading arguments; `ffmpeg` outside tests
    launcher: Vec<String>,
    format: String,
    device: String,
}

impl FfmpegSource {
    pub fn new(format: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            launcher: vec!["ffmpeg".to_string()],
            format: format.into(),
            device: device.into(),
        }
    }

    #[cfg(test)]
    fn with_launcher(mut self, launcher: &[&str]) -> Self {
        self.launcher = launcher.iter().map(|s| s.to_string()).collect();
        self
    }

    fn args(&self, width: u32, height: u32) -> Vec<String> {
        let size = format!("{}x{}", width, height);
        vec![
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            self.format.clone(),
            "-video_size".to_string(),
            size,
            "-i".to_string(),
            self.device.clone(),
            // Scale anyway: devices may ignore the requested size
            "-vf".to_string(),
            format!("scale={}:{}", width, height),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }
}

impl CameraSource for FfmpegSource {
    fn open(&mut self, width: u32, height: u32) -> Result<Box<dyn Capture>> {
        let args = self.args(width, height);
        debug!(?args, "spawning ffmpeg capture");

        let (program, leading) = self
            .launcher
            .split_first()
            .ok_or_else(|| Error::Camera("empty ffmpeg launcher".to_string()))?;
        let mut child = Command::new(program)
            .args(leading)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Camera(format!("failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Camera("ffmpeg stdout not captured".to_string()))?;

        let last_error = Arc::new(Mutex::new(None));
        let stderr_drain = match child.stderr.take() {
            Some(stderr) => Some(spawn_stderr_drain(stderr, Arc::clone(&last_error))?),
            None => None,
        };

        info!(device = %self.device, width, height, "camera opened");

        Ok(Box::new(FfmpegCapture {
            child,
            stdout,
            last_error,
            stderr_drain,
            width,
            height,
            buf: vec![0; frame_len(width, height)],
        }))
    }
}

/// Trace ffmpeg's diagnostics and keep the most recent line
fn spawn_stderr_drain(
    stderr: ChildStderr,
    last_error: Arc<Mutex<Option<String>>>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("ffmpeg-stderr".to_string())
        .spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|line| line.ok()) {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                warn!(stderr = %line, "ffmpeg");
                *last_error.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(line);
            }
        })?;
    Ok(handle)
}

struct FfmpegCapture {
    child: Child,
    stdout: ChildStdout,
    /// Last line ffmpeg wrote to stderr
    last_error: Arc<Mutex<Option<String>>>,
    stderr_drain: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
    buf: Vec<u8>,
}

fn frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Read one raw frame; `Ok(None)` when the stream ends cleanly
fn read_raw_frame(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<Option<()>> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(Some(())),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

impl FfmpegCapture {
    /// stdout closed: a clean ffmpeg exit ends the stream, anything else is a failure
    fn end_of_stream(&mut self) -> Result<Option<Frame>> {
        let status = self.child.wait()?;
        if status.success() {
            return Ok(None);
        }
        // ffmpeg has exited, so the drain sees EOF and finishes
        if let Some(drain) = self.stderr_drain.take() {
            let _ = drain.join();
        }
        let reason = self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .unwrap_or_else(|| "no diagnostics".to_string());
        Err(Error::Camera(format!("ffmpeg exited with {status}: {reason}")))
    }
}

impl Capture for FfmpegCapture {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        match read_raw_frame(&mut self.stdout, &mut self.buf) {
            Ok(Some(())) => {
                let frame = Frame::from_raw(self.width, self.height, self.buf.clone())
                    .ok_or_else(|| Error::Camera("frame buffer size mismatch".to_string()))?;
                Ok(Some(frame))
            }
            Ok(None) => self.end_of_stream(),
            Err(e) => Err(Error::Camera(format!("frame read failed: {e}"))),
        }
    }

    fn is_open(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn release(&mut self) -> Result<()> {
        if self.is_open() {
            self.child.kill()?;
        }
        self.child.wait()?;
        info!("camera released");
        Ok(())
    }
}

impl Drop for FfmpegCapture {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
