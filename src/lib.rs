//! speechrt - speech engine runtime
//!
//! Engine state machines, ordered event delivery and the two-stage
//! synthesis/playback pipeline shared by speech synthesizers and
//! recognizers on top of pluggable vendor backends.

pub mod config;
pub mod engine;
pub mod error;
pub mod recognition;
pub mod speech;

pub use error::{EngineError, Result};

pub use config::Config;
pub use engine::{EngineEvent, EngineListener, EngineState, EngineStateMachine, FocusArbiter, StateMask};
pub use recognition::{RecognitionResult, Recognizer, RecognizerBackend};
pub use speech::{Speakable, SpeakableListener, SynthesisBackend, Synthesizer};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "speechrt";
