//! Speech output (text-to-speech) and input (dictation) drivers.
//!
//! Both are external programs configured as argv templates. Spoken output is
//! cancelled by dropping the `speak` future: the child is spawned with
//! `kill_on_drop`, so aborting the task that awaits it silences the utterance.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::SpeechError;
use crate::types::Voice;

/// Words per minute at rate 1.0 (espeak's default).
const BASE_WPM: f32 = 175.0;

#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text`, returning when the utterance ends.
    async fn speak(&self, text: &str, voice: &Voice) -> Result<(), SpeechError>;
}

#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Listen once and return the final transcript.
    async fn listen(&self, locale: &str) -> Result<String, SpeechError>;
}

/// Substitute `{name}` placeholders in every argument of `template`.
fn expand(template: &[String], vars: &[(&str, &str)]) -> Result<(String, Vec<String>), SpeechError> {
    let mut argv = template.iter().map(|arg| {
        vars.iter().fold(arg.clone(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
    });
    let program = argv.next().ok_or(SpeechError::EmptyCommand)?;
    Ok((program, argv.collect()))
}

fn spawn_error(program: &str) -> impl FnOnce(std::io::Error) -> SpeechError + '_ {
    move |source| SpeechError::Spawn {
        program: program.to_string(),
        source,
    }
}

// ── Output ──

/// Speaks through an external TTS command.
pub struct CommandSpeech {
    template: Vec<String>,
}

impl CommandSpeech {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }
}

#[async_trait]
impl SpeechOutput for CommandSpeech {
    async fn speak(&self, text: &str, voice: &Voice) -> Result<(), SpeechError> {
        let wpm = ((BASE_WPM * voice.rate).round() as u32).max(1).to_string();
        let (program, args) = expand(
            &self.template,
            &[("locale", &voice.locale), ("wpm", &wpm), ("text", text)],
        )?;

        debug!("speaking {} chars via {}", text.chars().count(), program);
        let status = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error(&program))?
            .wait()
            .await?;

        if !status.success() {
            return Err(SpeechError::Exit {
                program,
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// Logs instead of speaking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

#[async_trait]
impl SpeechOutput for SilentSpeech {
    async fn speak(&self, text: &str, voice: &Voice) -> Result<(), SpeechError> {
        info!(
            "(silent) would speak {} chars [{} x{}]",
            text.chars().count(),
            voice.locale,
            voice.rate
        );
        Ok(())
    }
}

// ── Input ──

/// Runs a speech-to-text command that prints the transcript on stdout.
pub struct CommandRecognizer {
    template: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(template: Vec<String>) -> Self {
        Self { template }
    }
}

#[async_trait]
impl SpeechInput for CommandRecognizer {
    async fn listen(&self, locale: &str) -> Result<String, SpeechError> {
        let (program, args) = expand(&self.template, &[("locale", locale)])?;

        info!("voice input started ({})", program);
        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(spawn_error(&program))?;
        info!("voice input ended");

        if !output.status.success() {
            return Err(SpeechError::Exit {
                program,
                status: output.status.to_string(),
            });
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(String::from)
            .ok_or(SpeechError::NoMatch)
    }
}
