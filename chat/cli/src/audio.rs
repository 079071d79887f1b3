//! Audio sinks for the terminal
//!
//! The terminal has no player, so audio is either written to files for an
//! external player or dropped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chat_core::{AudioSink, SideEffectError};
use tracing::{debug, info};

/// Writes each clip to `reply-<n>.mp3` in a directory
pub struct FileAudioSink {
    dir: PathBuf,
    next: AtomicU32,
}

impl FileAudioSink {
    /// Create the sink, creating the directory if needed
    pub fn new(dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next: AtomicU32::new(1),
        })
    }
}

#[async_trait]
impl AudioSink for FileAudioSink {
    async fn play(&self, audio: Vec<u8>) -> Result<(), SideEffectError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("reply-{n}.mp3"));
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| SideEffectError::Playback(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), bytes = audio.len(), "Audio saved");
        Ok(())
    }
}

/// Drops audio
pub struct DiscardAudioSink;

#[async_trait]
impl AudioSink for DiscardAudioSink {
    async fn play(&self, audio: Vec<u8>) -> Result<(), SideEffectError> {
        debug!(bytes = audio.len(), "Discarding audio (no --audio-dir)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_numbers_clips() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileAudioSink::new(dir.path().join("audio")).unwrap();

        sink.play(vec![1, 2]).await.unwrap();
        sink.play(vec![3]).await.unwrap();

        let first = std::fs::read(dir.path().join("audio/reply-1.mp3")).unwrap();
        let second = std::fs::read(dir.path().join("audio/reply-2.mp3")).unwrap();
        assert_eq!(first, vec![1, 2]);
        assert_eq!(second, vec![3]);
    }
}
