//! Native backend using the tts crate
//!
//! This backend uses the `tts` crate which provides a unified interface to:
//! - Speech Dispatcher on Linux (via native bindings)
//! - AVFoundation on macOS/iOS (via native bindings)
//! - Various other platforms
//!
//! Platform services render speech themselves instead of handing back
//! audio, so "synthesis" here only normalizes the text and defers rendering
//! to `play`, which speaks and waits until the service goes quiet.

use super::SynthesisBackend;
use crate::config::Config;
use crate::engine::{lock, EngineBackend};
use crate::speech::item::{Audio, AudioFormat, Speakable};
use crate::speech::markup;
use crate::{EngineError, Result};
use log::{debug, error, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tts::Tts as TtsCrate;

/// How often the platform service is asked whether it is still speaking
const SPEAKING_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Platform speech service backend
pub struct NativeBackend {
    /// The tts crate's TTS instance
    tts: Mutex<TtsCrate>,
}

impl NativeBackend {
    /// Initialize the platform-appropriate TTS service
    pub fn from_config(config: &Config) -> Result<Self> {
        debug!("Creating native TTS backend");

        let tts = TtsCrate::default()
            .map_err(|e| EngineError::Backend(format!("Failed to initialize TTS: {}", e)))?;

        let backend = Self {
            tts: Mutex::new(tts),
        };

        if let Some(rate) = config.rate() {
            backend.set_rate(rate)?;
        }
        if let Some(volume) = config.volume() {
            backend.set_volume(volume)?;
        }
        if let Some(idx) = config.voice_idx() {
            backend.set_voice_idx(idx)?;
        }

        debug!("Native TTS backend created successfully");
        Ok(backend)
    }

    /// Map a 0-100 setting onto `[min, max]`
    fn scale(value: u8, min: f32, max: f32) -> f32 {
        min + (max - min) * (value.min(100) as f32 / 100.0)
    }

    fn set_rate(&self, rate: u8) -> Result<()> {
        let mut tts = lock(&self.tts);
        if !tts.supported_features().rate {
            warn!("Rate control not supported on this platform");
            return Ok(());
        }

        let converted = Self::scale(rate, tts.min_rate(), tts.max_rate());
        debug!("Setting rate to {} ({})", rate, converted);
        tts.set_rate(converted)
            .map_err(|e| EngineError::Backend(format!("Failed to set rate: {}", e)))?;
        Ok(())
    }

    fn set_volume(&self, volume: u8) -> Result<()> {
        let mut tts = lock(&self.tts);
        if !tts.supported_features().volume {
            warn!("Volume control not supported on this platform");
            return Ok(());
        }

        let converted = Self::scale(volume, tts.min_volume(), tts.max_volume());
        debug!("Setting volume to {} ({})", volume, converted);
        tts.set_volume(converted)
            .map_err(|e| EngineError::Backend(format!("Failed to set volume: {}", e)))?;
        Ok(())
    }

    fn set_voice_idx(&self, idx: usize) -> Result<()> {
        let mut tts = lock(&self.tts);
        if !tts.supported_features().voice {
            warn!("Voice selection not supported on this platform");
            return Ok(());
        }

        let voices = tts
            .voices()
            .map_err(|e| EngineError::Backend(format!("Failed to get voices: {}", e)))?;

        match voices.get(idx) {
            Some(voice) => {
                debug!("Selecting voice: {:?}", voice);
                tts.set_voice(voice)
                    .map_err(|e| EngineError::Backend(format!("Failed to set voice: {}", e)))?;
            }
            None => warn!(
                "Voice index {} out of range (have {} voices)",
                idx,
                voices.len()
            ),
        }
        Ok(())
    }

    /// True while the platform service is rendering speech
    fn is_speaking(&self) -> Result<bool> {
        let tts = lock(&self.tts);
        if !tts.supported_features().is_speaking {
            return Ok(false);
        }
        tts.is_speaking()
            .map_err(|e| EngineError::Backend(format!("Failed to query speech state: {}", e)))
    }
}

impl EngineBackend for NativeBackend {
    fn deallocate(&self) -> Result<()> {
        self.stop()
    }
}

impl SynthesisBackend for NativeBackend {
    fn id(&self) -> &'static str {
        "native"
    }

    fn synthesize(&self, speakable: &Speakable) -> Result<Audio> {
        match speakable {
            Speakable::Text(text) => Ok(Audio::deferred_text(text)),
            Speakable::Markup(source) => Ok(Audio::deferred_text(&markup::to_plain_text(source))),
            Speakable::Audio(audio) => Ok(audio.clone()),
        }
    }

    fn play(&self, audio: &Audio, cancelled: &AtomicBool) -> Result<()> {
        if audio.format != AudioFormat::Utf8Text {
            return Err(EngineError::Backend(
                "Platform speech service cannot play WAV audio".to_string(),
            ));
        }

        let text = audio
            .as_text()
            .ok_or_else(|| EngineError::Backend("Deferred audio is not valid UTF-8".to_string()))?;
        if text.is_empty() || cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }

        debug!("Speaking: {}", text);
        lock(&self.tts).speak(text, false).map_err(|e| {
            error!("Failed to speak: {}", e);
            EngineError::Backend(format!("Speak failed: {}", e))
        })?;

        while self.is_speaking()? {
            if cancelled.load(Ordering::SeqCst) {
                return self.stop();
            }
            thread::sleep(SPEAKING_POLL_INTERVAL);
        }

        // A stop that raced with speak() above
        if cancelled.load(Ordering::SeqCst) {
            self.stop()?;
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        debug!("Canceling speech");
        lock(&self.tts).stop().map_err(|e| {
            error!("Failed to cancel speech: {}", e);
            EngineError::Backend(format!("Cancel failed: {}", e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_backend() {
        // May fail without speech-dispatcher (Linux) or audio in CI
        match NativeBackend::from_config(&Config::default()) {
            Ok(_) => println!("✓ Native TTS backend initialized successfully"),
            Err(e) => println!("⚠ TTS initialization failed (may be expected in CI): {}", e),
        }
    }

    #[test]
    fn test_scale() {
        assert_eq!(NativeBackend::scale(0, 0.5, 2.0), 0.5);
        assert_eq!(NativeBackend::scale(100, 0.5, 2.0), 2.0);
        assert_eq!(NativeBackend::scale(50, 0.0, 1.0), 0.5);
        assert_eq!(NativeBackend::scale(200, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_markup_is_flattened() {
        if let Ok(backend) = NativeBackend::from_config(&Config::default()) {
            let audio = backend
                .synthesize(&Speakable::Markup("<speak>Hello <break/>world</speak>".to_string()))
                .unwrap();
            assert_eq!(audio.as_text(), Some("Hello world"));
        }
    }
}
