//! # Audio Format Tags
//!
//! The container/codec tag a client declares alongside its payload. The tag is only a hint:
//! decoding always inspects the bytes, but the tag steers the container probe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio formats accepted by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
    Flac,
    M4a,
    Aac,
    Ogg,
}

impl AudioFormat {
    /// Every supported format, in the order they are advertised.
    pub const ALL: [AudioFormat; 6] = [
        AudioFormat::Wav,
        AudioFormat::Mp3,
        AudioFormat::Flac,
        AudioFormat::M4a,
        AudioFormat::Aac,
        AudioFormat::Ogg,
    ];

    /// File extension used as a probe hint.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::M4a => "m4a",
            AudioFormat::Aac => "aac",
            AudioFormat::Ogg => "ogg",
        }
    }

    /// Guess the format from a file name such as `"meeting.mp3"`.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, extension) = file_name.rsplit_once('.')?;
        extension.parse().ok()
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "mp3" => Ok(AudioFormat::Mp3),
            "flac" => Ok(AudioFormat::Flac),
            "m4a" | "mp4" => Ok(AudioFormat::M4a),
            "aac" => Ok(AudioFormat::Aac),
            "ogg" | "oga" => Ok(AudioFormat::Ogg),
            other => Err(format!("Unsupported audio format: {}", other)),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
