//! Text extraction backends

use image::GrayImage;
use tracing::debug;

use super::encode_png;
use crate::camera::Frame;
use crate::config::OcrConfig;
use crate::process::{expand_argv, run_with_stdin};
use crate::{Error, Result};

/// Sigma matching a 3x3 gaussian kernel
const BLUR_SIGMA: f32 = 0.8;

/// Extracts best-effort text from a grayscale image
pub trait TextExtractor: Send + 'static {
    fn extract(&mut self, image: &GrayImage) -> Result<String>;
}

/// Grayscale and lightly blur a frame before OCR
pub fn preprocess(frame: &Frame) -> GrayImage {
    let gray = image::imageops::grayscale(frame);
    image::imageops::blur(&gray, BLUR_SIGMA)
}

/// Runs an OCR program such as `tesseract stdin stdout`
pub struct CommandTextExtractor {
    command: Vec<String>,
}

impl CommandTextExtractor {
    /// # Errors
    ///
    /// Returns error if the command template is empty
    pub fn new(config: &OcrConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::Config("ocr command is empty".to_string()));
        }
        Ok(Self {
            command: config.command.clone(),
        })
    }
}

impl TextExtractor for CommandTextExtractor {
    fn extract(&mut self, image: &GrayImage) -> Result<String> {
        let (program, args) = expand_argv(&self.command, &[])
            .ok_or_else(|| Error::Config("ocr command is empty".to_string()))?;

        let png = encode_png(image.as_raw(), image.width(), image.height(), image::ExtendedColorType::L8)?;
        let stdout = run_with_stdin(&program, &args, &png).map_err(Error::Ocr)?;
        let text = String::from_utf8_lossy(&stdout).into_owned();
        debug!(chars = text.len(), "text extracted");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_keeps_size() {
        let frame = Frame::from_pixel(32, 16, image::Rgb([200, 100, 50]));
        let gray = preprocess(&frame);
        assert_eq!(gray.dimensions(), (32, 16));
        // luma of (200, 100, 50) is ~118; a uniform interior survives the blur
        let center = gray.get_pixel(16, 8)[0];
        assert!((116..=119).contains(&center), "center luma {}", center);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_extractor_returns_stdout() {
        let config = OcrConfig {
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat > /dev/null; printf 'EXIT\\n  this way\\n'".to_string(),
            ],
            ..OcrConfig::default()
        };
        let mut extractor = CommandTextExtractor::new(&config).unwrap();
        let text = extractor.extract(&GrayImage::new(4, 4)).unwrap();
        assert_eq!(text, "EXIT\n  this way\n");
    }
}
