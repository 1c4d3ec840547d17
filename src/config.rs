//! Configuration loading and management

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Name of the persisted activity log inside the user's documents folder
const LOG_FILE_NAME: &str = "Invision_AI_Detection_Log.txt";

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Append-only activity log
    pub log_file: PathBuf,

    /// Where the presentation sink writes the latest rendered frame, if anywhere
    pub preview_path: Option<PathBuf>,

    /// How long exit waits for queued speech to flush
    pub exit_grace_ms: u64,

    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub ocr: OcrConfig,
    pub speech: SpeechConfig,
    pub timing: TimingConfig,
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CameraBackend {
    /// Raw RGB frames piped out of an ffmpeg capture process
    Ffmpeg {
        /// ffmpeg input format (`v4l2`, `avfoundation`, ...)
        format: String,
        /// Device passed to `-i`
        device: String,
    },
    /// Image files read in name order; end-of-stream after the last one
    Directory { path: PathBuf },
}

/// Camera capture and frame geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Frames are resized to this before object detection
    pub working_width: u32,
    pub working_height: u32,
    /// Size of frames handed to the presentation layer
    pub render_width: u32,
    pub render_height: u32,
}

/// Object detection backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detector argv; `{model}` and `{confidence}` are substituted
    pub command: Vec<String>,
    pub model: String,
    pub confidence: f32,
}

/// Text extraction backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// OCR argv; the grayscale frame is written to stdin as PNG
    pub command: Vec<String>,
    /// Shorter cleaned text is never announced
    pub min_text_len: usize,
}

/// Speech synthesis backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Synthesizer argv; `{rate}`, `{volume}` and `{text}` are substituted
    pub command: Vec<String>,
    /// Words per minute
    pub rate: u32,
    /// 0.0 to 1.0
    pub volume: f32,
}

/// Debounce gaps and loop cadence per mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub object_gap_secs: f64,
    pub text_gap_secs: f64,
    pub object_interval_ms: u64,
    pub text_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = home.join(".local").join("share").join("invision");
        let documents = dirs::document_dir().unwrap_or_else(|| home.join("Documents"));

        Self {
            socket_path: data_dir.join("daemon.sock"),
            data_dir,
            log_file: documents.join(LOG_FILE_NAME),
            preview_path: None,
            exit_grace_ms: 1000,
            camera: CameraConfig::default(),
            detection: DetectionConfig::default(),
            ocr: OcrConfig::default(),
            speech: SpeechConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for CameraBackend {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Ffmpeg {
                format: "avfoundation".to_string(),
                device: "0".to_string(),
            }
        } else {
            Self::Ffmpeg {
                format: "v4l2".to_string(),
                device: "/dev/video0".to_string(),
            }
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::default(),
            capture_width: 1280,
            capture_height: 720,
            working_width: 640,
            working_height: 480,
            render_width: 900,
            render_height: 600,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "invision-detect".to_string(),
                "--model".to_string(),
                "{model}".to_string(),
                "--confidence".to_string(),
                "{confidence}".to_string(),
            ],
            model: "yolov3-tiny".to_string(),
            confidence: 0.35,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "tesseract".to_string(),
                "stdin".to_string(),
                "stdout".to_string(),
            ],
            min_text_len: 5,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "espeak".to_string(),
                "-s".to_string(),
                "{rate}".to_string(),
                "-a".to_string(),
                "{volume}".to_string(),
                "{text}".to_string(),
            ],
            rate: 170,
            volume: 1.0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            object_gap_secs: 1.0,
            text_gap_secs: 1.5,
            object_interval_ms: 50,
            text_interval_ms: 100,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("invision").join("config.toml"))
    }

    /// Load configuration from defaults, overlaid by a TOML file when present
    ///
    /// An explicitly given path must exist; the default path is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        debug!(?path, "reading config file");
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    fn validate(&self) -> Result<()> {
        if self.speech.command.is_empty() {
            return Err(Error::Config("speech.command must not be empty".to_string()));
        }
        if self.detection.command.is_empty() {
            return Err(Error::Config("detection.command must not be empty".to_string()));
        }
        if self.ocr.command.is_empty() {
            return Err(Error::Config("ocr.command must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return Err(Error::Config(format!(
                "detection.confidence must be within 0..=1, got {}",
                self.detection.confidence
            )));
        }
        if self.camera.working_width == 0 || self.camera.working_height == 0 {
            return Err(Error::Config("camera working size must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Ensure data directory and log directory exist
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        if let Some(parent) = self.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.socket_path.to_string_lossy().contains("invision"));
        assert!(config.log_file.ends_with(LOG_FILE_NAME));
        assert_eq!(config.camera.capture_width, 1280);
        assert_eq!(config.camera.capture_height, 720);
        assert_eq!(config.ocr.min_text_len, 5);
        assert_eq!(config.timing.object_interval_ms, 50);
        assert_eq!(config.timing.text_interval_ms, 100);
    }

    #[test]
    fn test_partial_file_overlays_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
exit_grace_ms = 250

[timing]
text_gap_secs = 3.0

[camera.backend]
backend = "directory"
path = "/tmp/frames"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.exit_grace_ms, 250);
        assert_eq!(config.timing.text_gap_secs, 3.0);
        assert_eq!(config.timing.object_gap_secs, 1.0);
        assert_eq!(
            config.camera.backend,
            CameraBackend::Directory {
                path: PathBuf::from("/tmp/frames")
            }
        );
        assert_eq!(config.camera.render_width, 900);
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nconfidence = 1.5\n").unwrap();

        assert!(matches!(Config::load(Some(&path)), Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
