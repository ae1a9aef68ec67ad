//! Audio controller: on-demand synthesis, a one-entry artifact cache keyed by
//! the text that produced it, and the playback transport.
//!
//! States: `Idle → Synthesizing → Ready ⇄ Playing`, with `Idle` reachable from
//! every state through invalidation. The live artifact is owned by the state
//! itself; leaving `Ready`/`Playing` moves it into a `Release` effect, so every
//! artifact has exactly one release path and two can never be live at once.

use std::time::Duration;
use uuid::Uuid;

use crate::codec::AudioArtifact;
use crate::error::ClientError;

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;

/// Initial volume and rate for a freshly loaded artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportDefaults {
    pub volume: f32,
    pub rate: f32,
}

impl Default for TransportDefaults {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
        }
    }
}

fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        MAX_VOLUME
    } else {
        volume.clamp(MIN_VOLUME, MAX_VOLUME)
    }
}

fn clamp_rate(rate: f32) -> f32 {
    if rate.is_nan() {
        1.0
    } else {
        rate.clamp(MIN_RATE, MAX_RATE)
    }
}

/// Map a seek fraction onto a track, clamping to `[0, 1]`.
pub fn seek_position(fraction: f32, duration: Duration) -> Duration {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    duration.mul_f64(fraction as f64)
}

/// Transient playback view of the live artifact.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transport {
    pub position: Duration,
    pub duration: Duration,
    pub volume: f32,
    pub rate: f32,
}

impl Transport {
    fn new(duration: Duration, defaults: TransportDefaults) -> Self {
        Self {
            position: Duration::ZERO,
            duration,
            volume: clamp_volume(defaults.volume),
            rate: clamp_rate(defaults.rate),
        }
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.duration
    }

    /// Playback progress in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            0.0
        } else {
            (self.position.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
        }
    }
}

#[derive(Debug, Default)]
pub enum AudioPhase {
    #[default]
    Idle,
    Synthesizing {
        request_id: Uuid,
        text: String,
        /// Start playing once decoded (false for audio delivered inline)
        autoplay: bool,
    },
    Ready {
        artifact: AudioArtifact,
        text: String,
        transport: Transport,
    },
    Playing {
        artifact: AudioArtifact,
        text: String,
        transport: Transport,
    },
}

impl AudioPhase {
    pub fn name(&self) -> &'static str {
        match self {
            AudioPhase::Idle => "idle",
            AudioPhase::Synthesizing { .. } => "synthesizing",
            AudioPhase::Ready { .. } => "ready",
            AudioPhase::Playing { .. } => "playing",
        }
    }
}

/// Controller state record: phase, last audio-panel error, and defaults.
#[derive(Debug, Default)]
pub struct AudioState {
    phase: AudioPhase,
    error: Option<String>,
    defaults: TransportDefaults,
}

impl AudioState {
    pub fn new(defaults: TransportDefaults) -> Self {
        Self {
            phase: AudioPhase::Idle,
            error: None,
            defaults,
        }
    }

    pub fn phase(&self) -> &AudioPhase {
        &self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn artifact(&self) -> Option<&AudioArtifact> {
        match &self.phase {
            AudioPhase::Ready { artifact, .. } | AudioPhase::Playing { artifact, .. } => {
                Some(artifact)
            }
            _ => None,
        }
    }

    /// Text the cached artifact (or pending request) belongs to.
    pub fn text(&self) -> Option<&str> {
        match &self.phase {
            AudioPhase::Idle => None,
            AudioPhase::Synthesizing { text, .. }
            | AudioPhase::Ready { text, .. }
            | AudioPhase::Playing { text, .. } => Some(text),
        }
    }

    pub fn transport(&self) -> Option<&Transport> {
        match &self.phase {
            AudioPhase::Ready { transport, .. } | AudioPhase::Playing { transport, .. } => {
                Some(transport)
            }
            _ => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.phase, AudioPhase::Playing { .. })
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.phase, AudioPhase::Synthesizing { .. })
    }
}

/// Commands forwarded to the playback output.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Load {
        artifact_id: Uuid,
        url: String,
        mime_type: String,
    },
    Play,
    Pause,
    SeekTo(Duration),
    SetVolume(f32),
    SetRate(f32),
    Stop,
}

#[derive(Debug)]
pub enum AudioEvent {
    /// User asked to hear `text`
    Request { text: String },
    /// Audio delivered together with the analysis result for `text`
    AdoptInline { text: String, payload: String },
    /// Synthesis answered with a base64 payload, not yet decoded
    Fetched {
        request_id: Uuid,
        outcome: Result<String, ClientError>,
    },
    /// Accepted payload decoded into an artifact
    Decoded {
        request_id: Uuid,
        outcome: Result<AudioArtifact, ClientError>,
    },
    /// Source text superseded or cleared
    Invalidate,
    TogglePlayPause,
    Seek(f32),
    SetVolume(f32),
    SetRate(f32),
    Tick {
        artifact_id: Uuid,
        elapsed: Duration,
    },
}

#[derive(Debug)]
pub enum AudioEffect {
    Synthesize { request_id: Uuid, text: String },
    /// Issued only for the pending request, so stale payloads never become artifacts
    Decode { request_id: Uuid, payload: String },
    Release(AudioArtifact),
    Playback(PlaybackCommand),
    StartTicks { artifact_id: Uuid },
    StopTicks { artifact_id: Uuid },
}

fn load_commands(artifact: &AudioArtifact, transport: &Transport) -> Vec<AudioEffect> {
    vec![
        AudioEffect::Playback(PlaybackCommand::Load {
            artifact_id: artifact.id(),
            url: artifact.url().to_string(),
            mime_type: artifact.mime_type().to_string(),
        }),
        AudioEffect::Playback(PlaybackCommand::SetVolume(transport.volume)),
        AudioEffect::Playback(PlaybackCommand::SetRate(transport.rate)),
    ]
}

fn start_playing(artifact: &AudioArtifact) -> [AudioEffect; 2] {
    [
        AudioEffect::Playback(PlaybackCommand::Play),
        AudioEffect::StartTicks {
            artifact_id: artifact.id(),
        },
    ]
}

fn stop_playing(artifact: &AudioArtifact) -> [AudioEffect; 2] {
    [
        AudioEffect::Playback(PlaybackCommand::Pause),
        AudioEffect::StopTicks {
            artifact_id: artifact.id(),
        },
    ]
}

fn teardown(artifact: AudioArtifact) -> Vec<AudioEffect> {
    log::info!("Invalidating audio artifact {}", artifact.id());
    vec![
        AudioEffect::Playback(PlaybackCommand::Stop),
        AudioEffect::Release(artifact),
    ]
}

/// Reducer: (state, event) -> (next_state, effects)
///
/// Takes the state by value because it owns the live artifact.
pub fn reduce(state: AudioState, event: AudioEvent) -> (AudioState, Vec<AudioEffect>) {
    use AudioEffect::*;
    use AudioEvent::*;
    use AudioPhase::*;

    let AudioState {
        phase,
        error,
        defaults,
    } = state;

    let with = |phase: AudioPhase, error: Option<String>| AudioState {
        phase,
        error,
        defaults,
    };

    match (phase, event) {
        // -----------------
        // Requests
        // -----------------
        (Ready { artifact, text, mut transport } | Playing { artifact, text, mut transport }, Request { text: requested })
            if requested == text =>
        {
            log::info!("Audio cache hit for artifact {}", artifact.id());
            transport.position = Duration::ZERO;
            let mut effects = vec![Playback(PlaybackCommand::SeekTo(Duration::ZERO))];
            effects.extend(start_playing(&artifact));
            (with(Playing { artifact, text, transport }, None), effects)
        }
        (Ready { artifact, .. } | Playing { artifact, .. }, Request { text }) => {
            let mut effects = teardown(artifact);
            let request_id = Uuid::new_v4();
            effects.push(Synthesize {
                request_id,
                text: text.clone(),
            });
            (
                with(
                    Synthesizing {
                        request_id,
                        text,
                        autoplay: true,
                    },
                    None,
                ),
                effects,
            )
        }
        (phase @ Synthesizing { .. }, Request { .. }) => {
            log::debug!("Audio request ignored: synthesis already pending");
            (with(phase, error), vec![])
        }
        (Idle, Request { text }) if text.trim().is_empty() => (with(Idle, error), vec![]),
        (Idle, Request { text }) => {
            let request_id = Uuid::new_v4();
            log::info!("Starting synthesis {} ({} chars)", request_id, text.len());
            (
                with(
                    Synthesizing {
                        request_id,
                        text: text.clone(),
                        autoplay: true,
                    },
                    None,
                ),
                vec![Synthesize { request_id, text }],
            )
        }

        (phase, AdoptInline { text, payload }) => {
            let mut effects = match phase {
                Ready { artifact, .. } | Playing { artifact, .. } => teardown(artifact),
                _ => vec![],
            };
            let request_id = Uuid::new_v4();
            log::info!("Adopting inline audio as {}", request_id);
            effects.push(Decode {
                request_id,
                payload,
            });
            (
                with(
                    Synthesizing {
                        request_id,
                        text,
                        autoplay: false,
                    },
                    None,
                ),
                effects,
            )
        }

        // -----------------
        // Synthesis completion
        // -----------------
        (
            Synthesizing {
                request_id: pending,
                text,
                autoplay,
            },
            Fetched {
                request_id,
                outcome,
            },
        ) if pending == request_id => match outcome {
            Ok(payload) => (
                with(
                    Synthesizing {
                        request_id,
                        text,
                        autoplay,
                    },
                    None,
                ),
                vec![Decode {
                    request_id,
                    payload,
                }],
            ),
            Err(err) => {
                log::warn!("Synthesis {} failed: {}", request_id, err);
                (with(Idle, Some(err.to_string())), vec![])
            }
        },
        (phase, Fetched { request_id, .. }) => {
            log::debug!("Dropping stale synthesis payload {}", request_id);
            (with(phase, error), vec![])
        }

        (
            Synthesizing {
                request_id: pending,
                text,
                autoplay,
            },
            Decoded {
                request_id,
                outcome,
            },
        ) if pending == request_id => match outcome {
            Ok(artifact) => {
                let transport = Transport::new(artifact.duration(), defaults);
                let mut effects = load_commands(&artifact, &transport);
                log::info!(
                    "Audio ready: artifact {} ({:.1}s)",
                    artifact.id(),
                    transport.duration.as_secs_f64()
                );
                if autoplay {
                    effects.extend(start_playing(&artifact));
                    (
                        with(
                            Playing {
                                artifact,
                                text,
                                transport,
                            },
                            None,
                        ),
                        effects,
                    )
                } else {
                    (
                        with(
                            Ready {
                                artifact,
                                text,
                                transport,
                            },
                            None,
                        ),
                        effects,
                    )
                }
            }
            Err(err) => {
                log::warn!("Audio {} could not be decoded: {}", request_id, err);
                (with(Idle, Some(err.to_string())), vec![])
            }
        },
        (phase, Decoded { request_id, outcome }) => {
            log::debug!("Dropping stale decoded audio {}", request_id);
            let effects = match outcome {
                Ok(artifact) => vec![Release(artifact)],
                Err(_) => vec![],
            };
            (with(phase, error), effects)
        }

        // -----------------
        // Invalidation
        // -----------------
        (Ready { artifact, .. } | Playing { artifact, .. }, Invalidate) => {
            (with(Idle, None), teardown(artifact))
        }
        (_, Invalidate) => (with(Idle, None), vec![]),

        // -----------------
        // Transport
        // -----------------
        (Ready { artifact, text, mut transport }, TogglePlayPause) => {
            let mut effects = vec![];
            if transport.at_end() {
                transport.position = Duration::ZERO;
                effects.push(Playback(PlaybackCommand::SeekTo(Duration::ZERO)));
            }
            effects.extend(start_playing(&artifact));
            (with(Playing { artifact, text, transport }, error), effects)
        }
        (Playing { artifact, text, transport }, TogglePlayPause) => {
            let effects = Vec::from(stop_playing(&artifact));
            (with(Ready { artifact, text, transport }, error), effects)
        }

        (Ready { artifact, text, mut transport }, Seek(fraction)) => {
            transport.position = seek_position(fraction, transport.duration);
            let position = transport.position;
            (
                with(Ready { artifact, text, transport }, error),
                vec![Playback(PlaybackCommand::SeekTo(position))],
            )
        }
        (Playing { artifact, text, mut transport }, Seek(fraction)) => {
            transport.position = seek_position(fraction, transport.duration);
            let position = transport.position;
            (
                with(Playing { artifact, text, transport }, error),
                vec![Playback(PlaybackCommand::SeekTo(position))],
            )
        }

        (Ready { artifact, text, mut transport }, SetVolume(volume)) => {
            transport.volume = clamp_volume(volume);
            let volume = transport.volume;
            (
                with(Ready { artifact, text, transport }, error),
                vec![Playback(PlaybackCommand::SetVolume(volume))],
            )
        }
        (Playing { artifact, text, mut transport }, SetVolume(volume)) => {
            transport.volume = clamp_volume(volume);
            let volume = transport.volume;
            (
                with(Playing { artifact, text, transport }, error),
                vec![Playback(PlaybackCommand::SetVolume(volume))],
            )
        }

        (Ready { artifact, text, mut transport }, SetRate(rate)) => {
            transport.rate = clamp_rate(rate);
            let rate = transport.rate;
            (
                with(Ready { artifact, text, transport }, error),
                vec![Playback(PlaybackCommand::SetRate(rate))],
            )
        }
        (Playing { artifact, text, mut transport }, SetRate(rate)) => {
            transport.rate = clamp_rate(rate);
            let rate = transport.rate;
            (
                with(Playing { artifact, text, transport }, error),
                vec![Playback(PlaybackCommand::SetRate(rate))],
            )
        }

        // Ticks only advance the clock of the artifact they were started for
        (
            Playing {
                artifact,
                text,
                mut transport,
            },
            Tick {
                artifact_id,
                elapsed,
            },
        ) if artifact.id() == artifact_id => {
            transport.position += elapsed.mul_f64(transport.rate as f64);
            if transport.at_end() {
                transport.position = transport.duration;
                log::debug!("Playback of {} reached end of track", artifact_id);
                (
                    with(Ready { artifact, text, transport }, error),
                    vec![StopTicks { artifact_id }],
                )
            } else {
                (with(Playing { artifact, text, transport }, error), vec![])
            }
        }

        // -----------------
        // Transport without an artifact, stale ticks: no-op
        // -----------------
        (phase, _) => (with(phase, error), vec![]),
    }
}
