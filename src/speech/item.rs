//! Queue items: one unit of speakable output

use std::fmt;
use std::sync::Arc;

/// Encoding of synthesized audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// RIFF/WAVE bytes ready for a player
    Wav,
    /// UTF-8 text rendered by the platform speech service at play time
    Utf8Text,
}

/// Synthesized audio handed from synthesis to playback
#[derive(Clone, PartialEq, Eq)]
pub struct Audio {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

impl Audio {
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self {
            format: AudioFormat::Wav,
            bytes,
        }
    }

    /// Audio whose rendering is deferred to playback
    pub fn deferred_text(text: &str) -> Self {
        Self {
            format: AudioFormat::Utf8Text,
            bytes: text.as_bytes().to_vec(),
        }
    }

    /// Text of deferred audio, if that is what this is
    pub fn as_text(&self) -> Option<&str> {
        match self.format {
            AudioFormat::Utf8Text => std::str::from_utf8(&self.bytes).ok(),
            AudioFormat::Wav => None,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Audio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Audio({:?}, {} bytes)", self.format, self.bytes.len())
    }
}

/// What a caller asked to be spoken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Speakable {
    /// Plain text
    Text(String),
    /// SSML/JSML-style marked up text
    Markup(String),
    /// Pre-recorded audio, played as is
    Audio(Audio),
}

impl Speakable {
    /// Short human-readable form used in events and logs
    pub fn describe(&self) -> String {
        match self {
            Speakable::Text(text) | Speakable::Markup(text) => text.clone(),
            Speakable::Audio(audio) => format!("<audio {} bytes>", audio.len()),
        }
    }
}

impl From<&str> for Speakable {
    fn from(text: &str) -> Self {
        Speakable::Text(text.to_string())
    }
}

impl From<String> for Speakable {
    fn from(text: String) -> Self {
        Speakable::Text(text)
    }
}

/// Per-item progress notifications
///
/// Called from the synthesizer's worker threads.
pub trait SpeakableListener: Send + Sync {
    fn speakable_started(&self, _id: u64, _speakable: &Speakable) {}

    fn speakable_ended(&self, _id: u64, _speakable: &Speakable) {}

    fn speakable_cancelled(&self, _id: u64, _speakable: &Speakable) {}
}

/// Item lifecycle; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemState {
    Pending,
    Synthesizing,
    Synthesized,
    Playing,
    Done,
    Cancelled,
}

impl ItemState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Done | ItemState::Cancelled)
    }
}

/// A speakable travelling through the output pipeline
pub struct QueueItem {
    id: u64,
    speakable: Speakable,
    listener: Option<Arc<dyn SpeakableListener>>,
    state: ItemState,
    audio: Option<Audio>,
}

impl QueueItem {
    pub fn new(id: u64, speakable: Speakable, listener: Option<Arc<dyn SpeakableListener>>) -> Self {
        Self {
            id,
            speakable,
            listener,
            state: ItemState::Pending,
            audio: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn speakable(&self) -> &Speakable {
        &self.speakable
    }

    pub fn listener(&self) -> Option<&Arc<dyn SpeakableListener>> {
        self.listener.as_ref()
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn audio(&self) -> Option<&Audio> {
        self.audio.as_ref()
    }

    /// Move to `next`; refused (returns false) if that would go backwards
    /// or leave a terminal state
    pub fn advance(&mut self, next: ItemState) -> bool {
        if self.state.is_terminal() || next <= self.state {
            return false;
        }
        self.state = next;
        true
    }

    /// Store synthesized audio and mark the item synthesized
    pub fn set_audio(&mut self, audio: Audio) -> bool {
        if !self.advance(ItemState::Synthesized) {
            return false;
        }
        self.audio = Some(audio);
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.advance(ItemState::Cancelled)
    }
}

impl fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueItem")
            .field("id", &self.id)
            .field("speakable", &self.speakable)
            .field("state", &self.state)
            .field("audio", &self.audio)
            .finish()
    }
}
