//! Effect runner for Recycle Assistant
//!
//! This module handles executing effects produced by the state machine:
//! HTTP calls through the service client, artifact release, playback commands
//! and playback ticks. Audio decoding is exposed separately so the state loop
//! can run it for accepted payloads only.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::ServiceClient;
use crate::codec::{AudioArtifact, MediaCodec};
use crate::error::ClientError;
use crate::playback::PlaybackCommand;
use crate::state_machine::{Effect, Event};

/// Trait for running effects asynchronously.
/// Completion events are sent back via the provided channel.
pub trait EffectRunner: Send + Sync + 'static {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);

    /// Turn an accepted base64 payload into a live artifact.
    fn decode_audio(&self, payload: &str) -> Result<AudioArtifact, ClientError>;
}

/// Output device for playback commands.
pub trait PlaybackSink: Send + Sync + 'static {
    fn apply(&self, command: &PlaybackCommand);
}

/// Sink that only logs commands (terminal build has no audio output).
pub struct LogSink;

impl PlaybackSink for LogSink {
    fn apply(&self, command: &PlaybackCommand) {
        match command {
            PlaybackCommand::Load { url, mime_type, .. } => {
                log::info!("Playback: load {} ({})", url, mime_type)
            }
            other => log::info!("Playback: {:?}", other),
        }
    }
}

/// Effect runner backed by the analysis service.
pub struct ServiceEffectRunner {
    client: ServiceClient,
    codec: Arc<MediaCodec>,
    sink: Arc<dyn PlaybackSink>,
    audio_mime_type: String,
    tick_interval: Duration,
    ticking: Arc<Mutex<TickSlot>>,
}

/// Which artifact may tick, and which start of it. A restarted task bumps the
/// generation so the previous task exits on its next wakeup.
#[derive(Debug, Default)]
struct TickSlot {
    artifact_id: Option<Uuid>,
    generation: u64,
}

impl TickSlot {
    fn is_current(&self, artifact_id: Uuid, generation: u64) -> bool {
        self.artifact_id == Some(artifact_id) && self.generation == generation
    }
}

impl ServiceEffectRunner {
    pub fn new(
        client: ServiceClient,
        codec: Arc<MediaCodec>,
        sink: Arc<dyn PlaybackSink>,
        audio_mime_type: &str,
        tick_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            codec,
            sink,
            audio_mime_type: audio_mime_type.to_string(),
            tick_interval,
            ticking: Arc::new(Mutex::new(TickSlot::default())),
        })
    }

    fn start_ticking(&self, artifact_id: Uuid) -> u64 {
        let mut slot = self.ticking.lock().unwrap_or_else(|e| e.into_inner());
        slot.generation = slot.generation.wrapping_add(1);
        slot.artifact_id = Some(artifact_id);
        slot.generation
    }

    fn stop_ticking_for(&self, artifact_id: Uuid) {
        let mut slot = self.ticking.lock().unwrap_or_else(|e| e.into_inner());
        if slot.artifact_id == Some(artifact_id) {
            slot.artifact_id = None;
        }
    }
}

impl EffectRunner for ServiceEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::SubmitAnalysis { id, image } => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = client.analyze(&image).await;
                    log::info!(
                        "Analysis request {} finished in {}ms (ok: {})",
                        id,
                        started.elapsed().as_millis(),
                        outcome.is_ok()
                    );
                    // Ignore send failure: the loop is gone
                    let _ = tx.send(Event::AnalysisCompleted { id, outcome }).await;
                });
            }

            // Sends the raw payload back; nothing is written to disk here
            Effect::Synthesize { id, text } => {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let started = Instant::now();
                    let outcome = client.synthesize(&text).await;
                    log::info!(
                        "Synthesis request {} finished in {}ms (ok: {})",
                        id,
                        started.elapsed().as_millis(),
                        outcome.is_ok()
                    );
                    let _ = tx.send(Event::SynthesisCompleted { id, outcome }).await;
                });
            }

            // Synchronous so the release is ordered before later effects
            Effect::ReleaseArtifact(artifact) => {
                self.stop_ticking_for(artifact.id());
                artifact.release();
                log::debug!("Live audio artifacts: {}", self.codec.live_count());
            }

            Effect::Playback(command) => {
                self.sink.apply(&command);
            }

            Effect::StopPlaybackTicks { artifact_id } => {
                self.stop_ticking_for(artifact_id);
            }

            Effect::StartPlaybackTicks { artifact_id } => {
                let generation = self.start_ticking(artifact_id);
                let ticking = self.ticking.clone();
                let period = self.tick_interval;

                tokio::spawn(async move {
                    let mut interval = tokio::time::interval(period);
                    // First tick completes immediately
                    interval.tick().await;
                    let mut last = Instant::now();
                    loop {
                        interval.tick().await;

                        let is_active = {
                            let slot = ticking.lock().unwrap_or_else(|e| e.into_inner());
                            slot.is_current(artifact_id, generation)
                        };
                        if !is_active {
                            log::debug!(
                                "Playback tick stopping - artifact {} no longer playing",
                                artifact_id
                            );
                            break;
                        }

                        let now = Instant::now();
                        let elapsed = now.duration_since(last);
                        last = now;

                        if tx
                            .send(Event::PlaybackTick {
                                artifact_id,
                                elapsed,
                            })
                            .await
                            .is_err()
                        {
                            log::debug!("Playback tick stopping - channel closed");
                            break;
                        }
                    }
                });
            }

            Effect::DecodeAudio { .. } | Effect::Reject(_) | Effect::EmitUi => {
                // Handled in the main loop, not here
                log::error!("Loop-edge effect reached the effect runner: {:?}", effect);
            }
        }
    }

    fn decode_audio(&self, payload: &str) -> Result<AudioArtifact, ClientError> {
        let artifact = self.codec.decode(payload, &self.audio_mime_type)?;
        log::debug!("Live audio artifacts: {}", self.codec.live_count());
        Ok(artifact)
    }
}
