//! Vendor speech backends
//!
//! A backend is the opaque native capability behind a synthesizer: it turns
//! speakables into audio and plays audio. Everything about ordering, pausing
//! and cancellation lives in the queue manager, not here.

// espeak-ng synthesis with a command-line player (paplay/aplay)
pub mod espeak;

// Platform speech service through the tts crate
pub mod native;

use crate::config::Config;
use crate::engine::EngineBackend;
use crate::speech::item::{Audio, Speakable};
use crate::{EngineError, Result};
use log::info;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Synthesis capabilities consumed by the output pipeline
///
/// `synthesize` and `play` are called from the synthesizer's worker threads
/// and may block for seconds.
///
/// Stopping has two halves. The pipeline raises the `cancelled` flag handed
/// to `play` first, then calls `stop`. `play` must check the flag once its
/// output has started and keep checking while it waits, so a stop that
/// arrives before playback is underway is not lost.
pub trait SynthesisBackend: EngineBackend {
    /// Unique backend name (e.g. "espeak-ng")
    fn id(&self) -> &'static str;

    /// Convert text or markup into audio
    fn synthesize(&self, speakable: &Speakable) -> Result<Audio>;

    /// Render audio, returning when playback finished or `cancelled` was raised
    fn play(&self, audio: &Audio, cancelled: &AtomicBool) -> Result<()>;

    /// Silence whatever `play` is currently rendering, right away
    fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Create the backend named by the configuration
///
/// `auto` tries espeak-ng first (real audio bytes, supports markup) and
/// falls back to the platform speech service.
pub fn create_backend(config: &Config) -> Result<Arc<dyn SynthesisBackend>> {
    let name = config.backend();
    info!("Creating speech backend '{}'", name);

    match name.as_str() {
        "espeak" | "espeak-ng" => Ok(Arc::new(espeak::EspeakBackend::from_config(config)?)),
        "native" => Ok(Arc::new(native::NativeBackend::from_config(config)?)),
        "auto" => {
            info!("Trying espeak-ng backend...");
            match espeak::EspeakBackend::from_config(config) {
                Ok(backend) => {
                    info!("✓ Using espeak-ng backend");
                    return Ok(Arc::new(backend));
                }
                Err(e) => info!("✗ espeak-ng backend unavailable: {}", e),
            }

            info!("Trying native backend...");
            match native::NativeBackend::from_config(config) {
                Ok(backend) => {
                    info!("✓ Using native backend");
                    Ok(Arc::new(backend))
                }
                Err(e) => Err(EngineError::Backend(format!(
                    "No speech backend available. Tried:\n\
                     1. espeak-ng (install: sudo apt install espeak-ng)\n\
                     2. Platform speech service (speech-dispatcher / AVFoundation)\n\
                     Error: {}",
                    e
                ))),
            }
        }
        other => Err(EngineError::Config(format!("Unknown backend '{}'", other))),
    }
}
