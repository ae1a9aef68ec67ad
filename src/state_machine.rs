//! Session state machine for Recycle Assistant
//!
//! This module composes the analysis and audio controllers using a
//! single-writer pattern. All state transitions go through the `reduce()`
//! function, which returns a new state and a list of effects to execute.

use std::time::Duration;
use uuid::Uuid;

use crate::analysis::{self, AnalysisEffect, AnalysisEvent, AnalysisState, ImageAsset, ImageCandidate};
use crate::api::AnalysisOutcome;
use crate::codec::AudioArtifact;
use crate::error::ClientError;
use crate::playback::{self, AudioEffect, AudioEvent, AudioState, PlaybackCommand, TransportDefaults};

/// Internal state of the session.
/// This is the authoritative state - all transitions go through the reducer.
#[derive(Debug, Default)]
pub struct State {
    pub analysis: AnalysisState,
    pub audio: AudioState,
}

impl State {
    pub fn new(defaults: TransportDefaults) -> Self {
        Self {
            analysis: AnalysisState::Empty,
            audio: AudioState::new(defaults),
        }
    }
}

/// Events that can trigger state transitions.
/// User intents come from the interaction surface; completions from the effect runner.
#[derive(Debug)]
pub enum Event {
    /// User picked an image without analyzing it yet
    SelectImage(ImageCandidate),
    /// User picked an image and wants it analyzed right away
    SubmitImage(ImageCandidate),
    /// User pressed the analyze trigger
    Analyze,
    Clear,
    /// User asked to hear the current result
    RequestAudio,
    TogglePlayPause,
    Seek(f32),
    SetVolume(f32),
    SetRate(f32),
    /// Session ending
    Exit,

    // Completion events (include ids to drop stale responses)
    AnalysisCompleted {
        id: Uuid,
        outcome: Result<AnalysisOutcome, ClientError>,
    },
    /// Raw base64 payload; decoded only once the id is known to be current
    SynthesisCompleted {
        id: Uuid,
        outcome: Result<String, ClientError>,
    },
    AudioDecoded {
        id: Uuid,
        outcome: Result<AudioArtifact, ClientError>,
    },
    PlaybackTick {
        artifact_id: Uuid,
        elapsed: Duration,
    },
}

/// Effects to be executed after a state transition.
/// The effect runner handles these asynchronously.
#[derive(Debug)]
pub enum Effect {
    SubmitAnalysis {
        id: Uuid,
        image: ImageAsset,
    },
    Synthesize {
        id: Uuid,
        text: String,
    },
    /// Decode an accepted payload; handled at the loop edge before the next event
    DecodeAudio {
        id: Uuid,
        payload: String,
    },
    ReleaseArtifact(AudioArtifact),
    Playback(PlaybackCommand),
    /// Start sending PlaybackTick events while this artifact plays
    StartPlaybackTicks {
        artifact_id: Uuid,
    },
    StopPlaybackTicks {
        artifact_id: Uuid,
    },
    /// Surface a rejected user action (state unchanged)
    Reject(ClientError),
    /// Signal to emit UI state to the surface
    EmitUi,
}

impl From<AnalysisEffect> for Effect {
    fn from(effect: AnalysisEffect) -> Self {
        match effect {
            AnalysisEffect::SubmitAnalysis { request_id, image } => Effect::SubmitAnalysis {
                id: request_id,
                image,
            },
        }
    }
}

impl From<AudioEffect> for Effect {
    fn from(effect: AudioEffect) -> Self {
        match effect {
            AudioEffect::Synthesize { request_id, text } => Effect::Synthesize {
                id: request_id,
                text,
            },
            AudioEffect::Decode {
                request_id,
                payload,
            } => Effect::DecodeAudio {
                id: request_id,
                payload,
            },
            AudioEffect::Release(artifact) => Effect::ReleaseArtifact(artifact),
            AudioEffect::Playback(command) => Effect::Playback(command),
            AudioEffect::StartTicks { artifact_id } => Effect::StartPlaybackTicks { artifact_id },
            AudioEffect::StopTicks { artifact_id } => Effect::StopPlaybackTicks { artifact_id },
        }
    }
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Audio derived from a result is invalidated before any effect of the
///   transition that supersedes it
/// - Ignore events with stale request ids
/// - Emit EmitUi after visible state changes
pub fn reduce(state: State, event: Event) -> (State, Vec<Effect>) {
    match event {
        Event::SelectImage(candidate) => apply_analysis(state, AnalysisEvent::Select(candidate)),
        Event::SubmitImage(candidate) => apply_analysis(state, AnalysisEvent::Submit(candidate)),
        Event::Analyze => apply_analysis(state, AnalysisEvent::Analyze),
        Event::Clear => apply_analysis(state, AnalysisEvent::Clear),
        Event::AnalysisCompleted { id, outcome } => apply_analysis(
            state,
            AnalysisEvent::Completed {
                request_id: id,
                outcome,
            },
        ),

        Event::RequestAudio => {
            let text = state.analysis.result().map(|r| r.text.clone());
            match text {
                Some(text) => apply_audio(state, AudioEvent::Request { text }),
                None => {
                    log::debug!("Audio requested without a result; ignoring");
                    (state, vec![])
                }
            }
        }
        Event::TogglePlayPause => apply_audio(state, AudioEvent::TogglePlayPause),
        Event::Seek(fraction) => apply_audio(state, AudioEvent::Seek(fraction)),
        Event::SetVolume(volume) => apply_audio(state, AudioEvent::SetVolume(volume)),
        Event::SetRate(rate) => apply_audio(state, AudioEvent::SetRate(rate)),
        Event::SynthesisCompleted { id, outcome } => apply_audio(
            state,
            AudioEvent::Fetched {
                request_id: id,
                outcome,
            },
        ),
        Event::AudioDecoded { id, outcome } => apply_audio(
            state,
            AudioEvent::Decoded {
                request_id: id,
                outcome,
            },
        ),
        Event::PlaybackTick {
            artifact_id,
            elapsed,
        } => apply_audio(
            state,
            AudioEvent::Tick {
                artifact_id,
                elapsed,
            },
        ),

        // Session end tears down any live artifact; nothing left to render
        Event::Exit => {
            let State { analysis, audio } = state;
            let (audio, effects) = playback::reduce(audio, AudioEvent::Invalidate);
            (
                State { analysis, audio },
                effects.into_iter().map(Effect::from).collect(),
            )
        }
    }
}

fn apply_analysis(state: State, event: AnalysisEvent) -> (State, Vec<Effect>) {
    let State { analysis, audio } = state;

    let step = match analysis::reduce(&analysis, event) {
        Ok(step) => step,
        Err(err) => {
            log::warn!("Rejected user action: {}", err);
            return (State { analysis, audio }, vec![Effect::Reject(err)]);
        }
    };

    if !step.changed {
        return (State { analysis, audio }, vec![]);
    }

    let mut effects = Vec::new();
    let mut audio = audio;

    // Teardown must precede any new request
    if step.supersedes_result {
        let (next, audio_effects) = playback::reduce(audio, AudioEvent::Invalidate);
        audio = next;
        effects.extend(audio_effects.into_iter().map(Effect::from));
    }

    effects.extend(step.effects.into_iter().map(Effect::from));

    if let (Some(payload), Some(result)) = (step.inline_audio, step.state.result()) {
        let (next, audio_effects) = playback::reduce(
            audio,
            AudioEvent::AdoptInline {
                text: result.text.clone(),
                payload,
            },
        );
        audio = next;
        effects.extend(audio_effects.into_iter().map(Effect::from));
    }

    effects.push(Effect::EmitUi);
    (
        State {
            analysis: step.state,
            audio,
        },
        effects,
    )
}

fn apply_audio(state: State, event: AudioEvent) -> (State, Vec<Effect>) {
    let State { analysis, audio } = state;

    let phase_before = audio.phase().name();
    let error_before = audio.error().map(str::to_string);
    let transport_before = audio.transport().copied();

    let (audio, audio_effects) = playback::reduce(audio, event);

    let changed = !audio_effects.is_empty()
        || audio.phase().name() != phase_before
        || audio.error() != error_before.as_deref()
        || audio.transport().copied() != transport_before;

    let mut effects: Vec<Effect> = audio_effects.into_iter().map(Effect::from).collect();
    if changed {
        effects.push(Effect::EmitUi);
    }

    (State { analysis, audio }, effects)
}
