//! Speech synthesis backends

use tracing::debug;

use crate::config::SpeechConfig;
use crate::process::{expand_argv, run_with_stdin};
use crate::{Error, Result};

/// Synchronous speech synthesis
///
/// `speak` returns once the utterance has finished playing.
pub trait SpeechEngine: Send + 'static {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Speaks by running an external synthesizer such as `espeak` or `say`
pub struct CommandSpeech {
    command: Vec<String>,
    rate: u32,
    volume: f32,
}

impl CommandSpeech {
    /// Create a speech engine from config
    ///
    /// # Errors
    ///
    /// Returns error if the command template is empty
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::Config("speech command is empty".to_string()));
        }

        Ok(Self {
            command: config.command.clone(),
            rate: config.rate,
            volume: config.volume.clamp(0.0, 1.0),
        })
    }

    fn argv(&self, text: &str) -> Result<(String, Vec<String>)> {
        let rate = self.rate.to_string();
        // Percent, which is also espeak's default amplitude scale
        let volume = ((self.volume * 100.0).round() as u32).to_string();
        expand_argv(
            &self.command,
            &[("rate", rate.as_str()), ("volume", volume.as_str()), ("text", text)],
        )
        .ok_or_else(|| Error::Config("speech command is empty".to_string()))
    }
}

impl SpeechEngine for CommandSpeech {
    fn speak(&mut self, text: &str) -> Result<()> {
        let (program, args) = self.argv(text)?;
        debug!(program = %program, chars = text.len(), "speaking");

        // Templates without {text} get the utterance on stdin
        let stdin = if self.command.iter().any(|arg| arg.contains("{text}")) {
            Vec::new()
        } else {
            text.as_bytes().to_vec()
        };

        run_with_stdin(&program, &args, &stdin)
            .map(|_| ())
            .map_err(Error::Speech)
    }
}
