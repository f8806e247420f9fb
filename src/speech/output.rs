use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::error::OuroborosResult;

use super::{SpeechSynthesizer, SpeakArgs};

/// Synthesises speech and saves it under the speech directory as
/// `<unix-millis>.mp3`. Playback is left to the user's audio player.
pub struct VoiceOutput {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    dir: PathBuf,
    default_voice: String,
    default_speed: f32,
}

impl VoiceOutput {
    pub fn new(
        synthesizer: Arc<dyn SpeechSynthesizer>,
        dir: impl Into<PathBuf>,
        default_voice: impl Into<String>,
        default_speed: f32,
    ) -> Self {
        Self {
            synthesizer,
            dir: dir.into(),
            default_voice: default_voice.into(),
            default_speed,
        }
    }

    /// Speak with explicit overrides; missing ones fall back to the defaults.
    pub async fn speak(&self, args: &SpeakArgs) -> OuroborosResult<PathBuf> {
        let voice = args.voice.as_deref().unwrap_or(&self.default_voice);
        let speed = args.speed.unwrap_or(self.default_speed);
        let audio = self.synthesizer.synthesize(&args.text, voice, speed).await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.mp3", Utc::now().timestamp_millis()));
        tokio::fs::write(&path, &audio).await?;
        tracing::debug!(?path, voice, bytes = audio.len(), "speech saved");
        Ok(path)
    }

    pub async fn say(&self, text: &str) -> OuroborosResult<PathBuf> {
        self.speak(&SpeakArgs {
            text: text.to_string(),
            voice: None,
            speed: None,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingSynth {
        calls: Mutex<Vec<(String, String, f32)>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for RecordingSynth {
        async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> OuroborosResult<Vec<u8>> {
            self.calls
                .lock()
                .unwrap()
                .push((text.to_string(), voice.to_string(), speed));
            Ok(b"mp3".to_vec())
        }
    }

    #[tokio::test]
    async fn speak_writes_mp3_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(RecordingSynth {
            calls: Mutex::new(Vec::new()),
        });
        let output = VoiceOutput::new(synth.clone(), dir.path().join("speech"), "onyx", 1.0);

        let path = output.say("hello").await.unwrap();
        assert_eq!(path.extension().unwrap(), "mp3");
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"mp3");

        output
            .speak(&SpeakArgs {
                text: "hi".into(),
                voice: Some("nova".into()),
                speed: Some(1.5),
            })
            .await
            .unwrap();

        let calls = synth.calls.lock().unwrap();
        assert_eq!(calls[0], ("hello".to_string(), "onyx".to_string(), 1.0));
        assert_eq!(calls[1], ("hi".to_string(), "nova".to_string(), 1.5));
    }
}
