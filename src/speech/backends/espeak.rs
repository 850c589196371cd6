//! espeak-ng backend
//!
//! Synthesis runs `espeak-ng --stdout`, which produces a complete WAV file,
//! so audio is ready long before playback begins. Playback pipes the WAV
//! into a command-line player (`paplay` for PulseAudio/PipeWire, `aplay` for
//! plain ALSA). Stopping kills the player process.
//!
//! Dependencies:
//! - espeak-ng (install with: sudo apt install espeak-ng)
//! - pulseaudio-utils or alsa-utils for the player

use super::SynthesisBackend;
use crate::config::Config;
use crate::engine::{lock, EngineBackend};
use crate::speech::item::{Audio, AudioFormat, Speakable};
use crate::{EngineError, Result};
use log::{debug, error, warn};
use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// How often a playing process is checked for completion
const PLAYER_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// espeak-ng synthesis plus an external WAV player
pub struct EspeakBackend {
    /// Path to espeak-ng
    espeak_path: String,

    /// Player command ("paplay" or "aplay")
    player: String,

    /// Rate setting (0-100)
    rate: u8,

    /// Volume setting (0-100)
    volume: u8,

    /// Voice name for espeak-ng
    voice: String,

    /// Player process for the item currently being played
    current: Mutex<Option<Child>>,
}

impl EspeakBackend {
    /// Create a backend from configuration
    ///
    /// Verifies espeak-ng and a player are installed.
    pub fn from_config(config: &Config) -> Result<Self> {
        debug!("Creating espeak-ng backend");

        let espeak_path = match config.espeak_path() {
            Some(path) => {
                if !Self::is_runnable(&path, "--version") {
                    return Err(EngineError::Backend(format!(
                        "espeak-ng not runnable at {}",
                        path
                    )));
                }
                path
            }
            None => Self::find_espeak()?,
        };
        debug!("Found espeak-ng at: {}", espeak_path);

        let player = match config.espeak_player() {
            Some(player) => player,
            None => Self::find_player()?,
        };
        debug!("Using player: {}", player);

        Ok(Self {
            espeak_path,
            player,
            rate: config.rate().unwrap_or(50),
            volume: config.volume().unwrap_or(80),
            voice: Self::get_voice_by_idx(config.voice_idx().unwrap_or(0)).to_string(),
            current: Mutex::new(None),
        })
    }

    /// True if `program arg` runs successfully
    fn is_runnable(program: &str, arg: &str) -> bool {
        Command::new(program)
            .arg(arg)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    /// Find espeak-ng executable
    fn find_espeak() -> Result<String> {
        ["espeak-ng", "/usr/bin/espeak-ng"]
            .iter()
            .find(|path| Self::is_runnable(path, "--version"))
            .map(|path| path.to_string())
            .ok_or_else(|| {
                EngineError::Backend(
                    "espeak-ng not found. Install with: sudo apt install espeak-ng".to_string(),
                )
            })
    }

    /// Find a WAV player, preferring PulseAudio
    fn find_player() -> Result<String> {
        ["paplay", "aplay"]
            .iter()
            .find(|player| Self::is_runnable(player, "--version"))
            .map(|player| player.to_string())
            .ok_or_else(|| {
                EngineError::Backend(
                    "No audio player found. Install pulseaudio-utils or alsa-utils".to_string(),
                )
            })
    }

    /// Convert rate (0-100) to espeak speed (80-450 wpm)
    fn rate_to_espeak_speed(rate: u8) -> u16 {
        80 + ((rate as u16) * 370 / 100)
    }

    /// Convert volume (0-100) to espeak amplitude (0-200)
    fn volume_to_espeak_amplitude(volume: u8) -> u8 {
        ((volume as u16 * 200) / 100) as u8
    }

    /// Get voice name by index
    fn get_voice_by_idx(idx: usize) -> &'static str {
        const VOICES: &[&str] = &[
            "en",    // 0: Default English
            "en-us", // 1: US English
            "en-gb", // 2: British English
            "en-sc", // 3: Scottish English
            "es",    // 4: Spanish
            "fr",    // 5: French
            "de",    // 6: German
            "it",    // 7: Italian
            "pt",    // 8: Portuguese
            "ru",    // 9: Russian
        ];

        VOICES.get(idx).unwrap_or(&"en")
    }

    /// espeak-ng arguments for one synthesis call
    ///
    /// The text itself goes in on stdin, never on the command line, so text
    /// starting with `-` is not taken for an option.
    fn synthesis_args(&self, markup: bool) -> Vec<String> {
        let mut args = vec![
            "-v".to_string(),
            self.voice.clone(),
            "-s".to_string(),
            Self::rate_to_espeak_speed(self.rate).to_string(),
            "-a".to_string(),
            Self::volume_to_espeak_amplitude(self.volume).to_string(),
        ];
        if markup {
            args.push("-m".to_string());
        }
        args.push("--stdout".to_string());
        args.push("--stdin".to_string());
        args
    }

    /// Player arguments to read WAV from stdin
    fn player_args(&self) -> &'static [&'static str] {
        if self.player.ends_with("aplay") && !self.player.ends_with("paplay") {
            &["-q", "-"]
        } else {
            &[]
        }
    }

    fn run_espeak(&self, text: &str, markup: bool) -> Result<Audio> {
        let mut child = Command::new(&self.espeak_path)
            .args(self.synthesis_args(markup))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::Backend(format!("Failed to start espeak-ng: {}", e)))?;

        // Written from another thread: espeak-ng may fill the stdout pipe
        // before it has read all of its input
        let feeder = child.stdin.take().map(|mut stdin| {
            let text = text.to_string();
            thread::spawn(move || stdin.write_all(text.as_bytes()))
        });

        let output = child.wait_with_output()?;
        if let Some(Ok(Err(e))) = feeder.map(|f| f.join()) {
            warn!("Failed to send text to espeak-ng: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Backend(format!("espeak-ng failed: {}", stderr.trim())));
        }

        debug!("espeak-ng produced {} bytes", output.stdout.len());
        Ok(Audio::wav(output.stdout))
    }
}

impl EngineBackend for EspeakBackend {
    fn deallocate(&self) -> Result<()> {
        self.stop()
    }
}

impl SynthesisBackend for EspeakBackend {
    fn id(&self) -> &'static str {
        "espeak-ng"
    }

    fn synthesize(&self, speakable: &Speakable) -> Result<Audio> {
        match speakable {
            Speakable::Text(text) => self.run_espeak(text, false),
            Speakable::Markup(markup) => self.run_espeak(markup, true),
            Speakable::Audio(audio) => Ok(audio.clone()),
        }
    }

    fn play(&self, audio: &Audio, cancelled: &AtomicBool) -> Result<()> {
        if audio.format != AudioFormat::Wav {
            return Err(EngineError::Backend(format!(
                "{} cannot play {:?} audio",
                self.player, audio.format
            )));
        }
        if audio.is_empty() || cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }

        let mut child = Command::new(&self.player)
            .args(self.player_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("Failed to spawn {}: {}", self.player, e);
                EngineError::Backend(format!("Failed to start {}: {}", self.player, e))
            })?;

        let stdin = child.stdin.take();
        *lock(&self.current) = Some(child);
        debug!("{} process started", self.player);

        // The player feeds from a separate thread so a full pipe never keeps
        // this loop from noticing a stop
        let feeder = stdin.map(|mut stdin| {
            let bytes = audio.bytes.clone();
            thread::spawn(move || stdin.write_all(&bytes))
        });

        let result = loop {
            if cancelled.load(Ordering::SeqCst) {
                self.stop()?;
                break Ok(());
            }

            {
                let mut current = lock(&self.current);
                let Some(child) = current.as_mut() else {
                    // Taken by stop()
                    break Ok(());
                };

                if let Some(status) = child.try_wait()? {
                    current.take();
                    if status.success() || cancelled.load(Ordering::SeqCst) {
                        break Ok(());
                    }
                    break Err(EngineError::Backend(format!(
                        "{} exited with {}",
                        self.player, status
                    )));
                }
            }
            thread::sleep(PLAYER_POLL_INTERVAL);
        };

        if let Some(Ok(Err(e))) = feeder.map(|f| f.join()) {
            // A broken pipe here means the player was killed
            if !cancelled.load(Ordering::SeqCst) {
                warn!("Failed to feed {}: {}", self.player, e);
            }
        }
        result
    }

    fn stop(&self) -> Result<()> {
        if let Some(mut child) = lock(&self.current).take() {
            debug!("Killing {} process", self.player);
            match child.kill() {
                Ok(_) => {
                    let _ = child.wait(); // Clean up zombie
                }
                Err(e) => {
                    debug!("Failed to kill {} process: {}", self.player, e);
                }
            }
        }
        Ok(())
    }
}

impl Drop for EspeakBackend {
    fn drop(&mut self) {
        debug!("Shutting down espeak-ng backend");
        let _ = self.stop();
    }
}
