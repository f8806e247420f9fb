//! Speech: text-to-speech, speech-to-text and voice personas.

mod openai;
mod output;

pub use openai::{OpenAISpeech, OpenAITranscriber};
pub use output::VoiceOutput;

use std::path::Path;

use async_trait::async_trait;

use crate::error::OuroborosResult;

pub const MIN_SPEED: f32 = 0.25;
pub const MAX_SPEED: f32 = 4.0;

/// Turns text into encoded audio (mp3).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> OuroborosResult<Vec<u8>>;
}

/// Turns recorded audio into text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> OuroborosResult<String>;

    async fn transcribe_file(&self, path: &Path) -> OuroborosResult<String> {
        let audio = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();
        self.transcribe(audio, &file_name).await
    }
}

/// Arguments of a `speak` command: `text;voice=nova;speed=1.2`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakArgs {
    pub text: String,
    pub voice: Option<String>,
    pub speed: Option<f32>,
}

/// Split on `;`. The first segment is always the text, even when it looks
/// like `key=value`. Later segments are `voice=`/`speed=` (keys are
/// case-insensitive); unknown keys and bad or out-of-range speeds are ignored.
pub fn parse_speak_args(input: &str) -> SpeakArgs {
    let mut segments = input.split(';');
    let text = segments.next().unwrap_or_default().trim().to_string();

    let mut args = SpeakArgs {
        text,
        voice: None,
        speed: None,
    };

    for segment in segments {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "voice" if !value.is_empty() => args.voice = Some(value.to_string()),
            "speed" => {
                if let Ok(speed) = value.parse::<f32>() {
                    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
                        args.speed = Some(speed);
                    }
                }
            }
            _ => {}
        }
    }

    args
}

/// A named voice and speaking style.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub voice: String,
    pub style: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, voice: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            voice: voice.into(),
            style: style.into(),
        }
    }

    pub fn builtins() -> Vec<Persona> {
        vec![
            Persona::new(
                "Ouroboros",
                "onyx",
                "You are Ouroboros, a calm, self-improving personal assistant. Be concise and precise.",
            ),
            Persona::new(
                "Aria",
                "nova",
                "You are Aria, a warm and upbeat assistant. Be friendly and encouraging.",
            ),
            Persona::new(
                "Echo",
                "echo",
                "You are Echo, a terse assistant. Answer in as few words as possible.",
            ),
            Persona::new(
                "Sage",
                "fable",
                "You are Sage, a thoughtful mentor. Explain your reasoning step by step.",
            ),
        ]
    }

    /// Case-insensitive lookup among the built-in personas.
    pub fn find(name: &str) -> Option<Persona> {
        let name = name.trim();
        Self::builtins()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Built-in persona by name, or a generic persona with the default voice.
    pub fn resolve(name: &str) -> Persona {
        Self::find(name).unwrap_or_else(|| {
            Persona::new(
                name.trim(),
                "onyx",
                format!("You are {}, a helpful personal assistant.", name.trim()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speak_args_full() {
        let args = parse_speak_args("hello;voice=nova;speed=1.2");
        assert_eq!(args.text, "hello");
        assert_eq!(args.voice.as_deref(), Some("nova"));
        assert_eq!(args.speed, Some(1.2));
    }

    #[test]
    fn speak_args_plain_text() {
        let args = parse_speak_args("  good morning  ");
        assert_eq!(args.text, "good morning");
        assert!(args.voice.is_none());
        assert!(args.speed.is_none());
    }

    #[test]
    fn speak_args_keys_case_insensitive_and_unknown_ignored() {
        let args = parse_speak_args("hi; VOICE = echo ;pitch=3;Speed=0.5");
        assert_eq!(args.voice.as_deref(), Some("echo"));
        assert_eq!(args.speed, Some(0.5));
    }

    #[test]
    fn speak_args_bad_speed_ignored() {
        assert_eq!(parse_speak_args("x;speed=fast").speed, None);
        assert_eq!(parse_speak_args("x;speed=9").speed, None);
        assert_eq!(parse_speak_args("x;speed=0.1").speed, None);
        assert_eq!(parse_speak_args("x;speed=4").speed, Some(4.0));
    }

    #[test]
    fn speak_args_first_segment_is_always_text() {
        let args = parse_speak_args("voice=nova;speed=2");
        assert_eq!(args.text, "voice=nova");
        assert!(args.voice.is_none());
        assert_eq!(args.speed, Some(2.0));
    }

    #[test]
    fn persona_lookup() {
        assert_eq!(Persona::find("aria").unwrap().voice, "nova");
        assert_eq!(Persona::find(" SAGE ").unwrap().voice, "fable");
        assert!(Persona::find("nobody").is_none());

        let custom = Persona::resolve("Jarvis");
        assert_eq!(custom.name, "Jarvis");
        assert_eq!(custom.voice, "onyx");
        assert!(custom.style.contains("Jarvis"));
    }

    #[test]
    fn builtin_voices() {
        let voices: Vec<(String, String)> = Persona::builtins()
            .into_iter()
            .map(|p| (p.name, p.voice))
            .collect();
        assert_eq!(
            voices,
            vec![
                ("Ouroboros".to_string(), "onyx".to_string()),
                ("Aria".to_string(), "nova".to_string()),
                ("Echo".to_string(), "echo".to_string()),
                ("Sage".to_string(), "fable".to_string()),
            ]
        );
    }
}
