//! Speech output pipeline

pub mod backends;
pub mod item;
pub mod manager;
pub mod markup;
pub mod play_queue;
pub mod synthesis_queue;
pub mod synthesizer;

pub use backends::{create_backend, SynthesisBackend};
pub use item::{Audio, AudioFormat, ItemState, QueueItem, Speakable, SpeakableListener};
pub use manager::QueueManager;
pub use play_queue::PlayQueue;
pub use synthesis_queue::SynthesisQueue;
pub use synthesizer::Synthesizer;
