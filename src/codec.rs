//! Media codec: turns base64 audio payloads into playable, releasable artifacts.
//!
//! Decoded bytes are written under a resource directory and addressed by a
//! `file://` URL, the local counterpart of a browser object URL. Every artifact
//! is an acquire/release pair: `release()` frees the file the first time and is
//! a no-op afterwards, and dropping an unreleased artifact releases it.
//!
//! Resources live in: ~/.local/share/recycle-assistant/temp/audio/

use base64::{engine::general_purpose::STANDARD, Engine};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::ClientError;

/// Errors that can occur while decoding an audio payload.
#[derive(Debug, Clone)]
pub enum CodecError {
    InvalidBase64(String),
    EmptyPayload,
    ResourceFailed(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::InvalidBase64(e) => write!(f, "payload is not valid base64: {}", e),
            CodecError::EmptyPayload => write!(f, "audio payload is empty"),
            CodecError::ResourceFailed(e) => write!(f, "failed to create audio resource: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        ClientError::Decode(err.to_string())
    }
}

/// Default resource directory for decoded audio.
pub fn resource_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recycle-assistant")
        .join("temp")
        .join("audio")
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/ogg" => "ogg",
        _ => "bin",
    }
}

/// Decoder that owns the resource directory and counts live artifacts.
#[derive(Debug)]
pub struct MediaCodec {
    dir: PathBuf,
    bitrate_kbps: u32,
    live: Arc<AtomicUsize>,
}

impl MediaCodec {
    /// `bitrate_kbps` is used to estimate track duration for constant-bitrate
    /// streams (the synthesis service returns 128 kbps MP3).
    pub fn new(dir: impl Into<PathBuf>, bitrate_kbps: u32) -> Self {
        Self {
            dir: dir.into(),
            bitrate_kbps: bitrate_kbps.max(1),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of artifacts decoded by this codec and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Decode a base64 payload into a playable artifact.
    pub fn decode(&self, payload: &str, mime_type: &str) -> Result<AudioArtifact, CodecError> {
        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;

        if bytes.is_empty() {
            return Err(CodecError::EmptyPayload);
        }

        fs::create_dir_all(&self.dir).map_err(|e| CodecError::ResourceFailed(e.to_string()))?;

        let id = Uuid::new_v4();
        let filename = format!(
            "{}_{}.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            id,
            extension_for(mime_type)
        );
        let path = self.dir.join(filename);

        fs::write(&path, &bytes).map_err(|e| CodecError::ResourceFailed(e.to_string()))?;

        let duration =
            Duration::from_secs_f64((bytes.len() as f64 * 8.0) / (self.bitrate_kbps as f64 * 1000.0));

        self.live.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Decoded audio artifact {} ({} bytes, ~{:.1}s) -> {:?}",
            id,
            bytes.len(),
            duration.as_secs_f64(),
            path
        );

        Ok(AudioArtifact {
            id,
            url: format!("file://{}", path.display()),
            path,
            mime_type: mime_type.to_string(),
            size_bytes: bytes.len(),
            duration,
            released: AtomicBool::new(false),
            live: self.live.clone(),
        })
    }

    /// Remove resources left behind by a previous session.
    pub fn purge_stale(&self) -> std::io::Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => log::warn!("Failed to remove stale audio {:?}: {}", path, e),
                }
            }
        }
        Ok(removed)
    }
}

/// A decoded, playable audio resource with an explicit release operation.
pub struct AudioArtifact {
    id: Uuid,
    url: String,
    path: PathBuf,
    mime_type: String,
    size_bytes: usize,
    duration: Duration,
    released: AtomicBool,
    live: Arc<AtomicUsize>,
}

impl AudioArtifact {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Free the underlying resource. Idempotent.
    pub fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        self.live.fetch_sub(1, Ordering::SeqCst);

        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Released audio artifact {}", self.id),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove audio resource {:?}: {}", self.path, e),
        }
    }
}

impl Drop for AudioArtifact {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for AudioArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArtifact")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("size_bytes", &self.size_bytes)
            .field("duration", &self.duration)
            .field("released", &self.is_released())
            .finish()
    }
}
