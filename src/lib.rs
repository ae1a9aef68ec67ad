pub mod analysis;
pub mod api;
pub mod codec;
pub mod effects;
pub mod error;
pub mod formatter;
pub mod playback;
pub mod settings;
pub mod state_machine;
pub mod surface;

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use analysis::AnalysisState;
use api::ServiceClient;
use codec::MediaCodec;
use effects::{EffectRunner, LogSink, ServiceEffectRunner};
use playback::{AudioPhase, Transport, TransportDefaults};
use settings::AppSettings;
use state_machine::{reduce, Effect, Event, State};
use surface::{Renderer, TerminalRenderer};

/// Analysis panel projection.
/// Uses tagged union format: { "status": "empty" } or { "status": "displayed", "markup": "..." }
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AnalysisView {
    Empty,
    Ready {
        #[serde(rename = "fileName")]
        file_name: String,
    },
    Analyzing {
        #[serde(rename = "fileName")]
        file_name: String,
    },
    Displayed {
        #[serde(rename = "fileName")]
        file_name: String,
        text: String,
        markup: String,
    },
    Failed {
        #[serde(rename = "fileName")]
        file_name: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TransportView {
    #[serde(rename = "positionSecs")]
    pub position_secs: f64,
    #[serde(rename = "durationSecs")]
    pub duration_secs: f64,
    pub progress: f64,
    pub volume: f32,
    pub rate: f32,
}

impl From<&Transport> for TransportView {
    fn from(t: &Transport) -> Self {
        Self {
            position_secs: t.position.as_secs_f64(),
            duration_secs: t.duration.as_secs_f64(),
            progress: t.progress(),
            volume: t.volume,
            rate: t.rate,
        }
    }
}

/// Audio panel projection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AudioView {
    Idle { error: Option<String> },
    Synthesizing,
    Ready { transport: TransportView },
    Playing { transport: TransportView },
}

/// UI state sent to the surface.
/// Busy flags are derived from state only, so every loading state restores its trigger.
#[derive(Debug, Clone, Serialize)]
pub struct UiState {
    pub analysis: AnalysisView,
    #[serde(rename = "analyzeEnabled")]
    pub analyze_enabled: bool,
    #[serde(rename = "audioEnabled")]
    pub audio_enabled: bool,
    pub audio: AudioView,
}

/// Convert internal State to UiState for the surface
pub fn state_to_ui(state: &State) -> UiState {
    let analysis = match &state.analysis {
        AnalysisState::Empty => AnalysisView::Empty,
        AnalysisState::Ready { image } => AnalysisView::Ready {
            file_name: image.file_name().to_string(),
        },
        AnalysisState::Analyzing { image, .. } => AnalysisView::Analyzing {
            file_name: image.file_name().to_string(),
        },
        AnalysisState::Displayed { image, result } => AnalysisView::Displayed {
            file_name: image.file_name().to_string(),
            text: result.text.clone(),
            markup: result.markup.clone(),
        },
        AnalysisState::Failed { image, message } => AnalysisView::Failed {
            file_name: image.file_name().to_string(),
            message: message.clone(),
        },
    };

    let audio = match state.audio.phase() {
        AudioPhase::Idle => AudioView::Idle {
            error: state.audio.error().map(str::to_string),
        },
        AudioPhase::Synthesizing { .. } => AudioView::Synthesizing,
        AudioPhase::Ready { transport, .. } => AudioView::Ready {
            transport: transport.into(),
        },
        AudioPhase::Playing { transport, .. } => AudioView::Playing {
            transport: transport.into(),
        },
    };

    UiState {
        analysis,
        analyze_enabled: state.analysis.can_analyze(),
        audio_enabled: state.analysis.result().is_some() && !state.audio.is_busy(),
        audio,
    }
}

/// Emit a UI state update to the surface
fn emit_ui_state(renderer: &dyn Renderer, state: &State) {
    let ui_state = state_to_ui(state);
    log::debug!("Emitting UI state: {:?}", serde_json::to_string(&ui_state));
    renderer.render(&ui_state);
}

/// State loop manager - holds the event sender for dispatching events
#[derive(Clone)]
pub struct StateLoopHandle {
    tx: mpsc::Sender<Event>,
}

impl StateLoopHandle {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Send an event to the state machine
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(event).await
    }
}

/// Run the main state loop until `Exit` is processed or all senders are gone.
pub async fn run_state_loop(
    renderer: Arc<dyn Renderer>,
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    defaults: TransportDefaults,
) {
    let mut state = State::new(defaults);

    // Emit initial state
    emit_ui_state(renderer.as_ref(), &state);
    log::info!("State loop started");

    // Events produced at the loop edge run before the next received event
    let mut pending = VecDeque::new();

    while let Some(event) = rx.recv().await {
        let exiting = matches!(event, Event::Exit);
        pending.push_back(event);

        while let Some(event) = pending.pop_front() {
            if !matches!(event, Event::PlaybackTick { .. }) {
                log::debug!("Received event: {:?}", event);
            }

            let before = (state.analysis.name(), state.audio.phase().name());
            let (next, effects) = reduce(state, event);
            let after = (next.analysis.name(), next.audio.phase().name());

            // Log state transitions
            if before != after {
                log::info!(
                    "State transition: analysis {} -> {}, audio {} -> {}",
                    before.0,
                    after.0,
                    before.1,
                    after.1
                );
            }

            state = next;

            // Execute effects
            for eff in effects {
                match eff {
                    Effect::EmitUi => emit_ui_state(renderer.as_ref(), &state),
                    Effect::Reject(err) => renderer.notice(&err),
                    // The reducer owns the artifact as soon as it exists
                    Effect::DecodeAudio { id, payload } => {
                        let outcome = effect_runner.decode_audio(&payload);
                        pending.push_back(Event::AudioDecoded { id, outcome });
                    }
                    other => effect_runner.spawn(other, tx.clone()),
                }
            }
        }

        if exiting {
            log::info!("Exit requested, shutting down state loop");
            break;
        }
    }

    log::info!("State loop ended");
}

/// Install the tracing subscriber; `log` records are bridged into it.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}

async fn run_session(settings: AppSettings) -> Result<(), String> {
    let codec = Arc::new(MediaCodec::new(
        codec::resource_dir(),
        settings.audio_bitrate_kbps,
    ));
    match codec.purge_stale() {
        Ok(count) if count > 0 => log::info!("Purged {} stale audio resources", count),
        Ok(_) => {}
        Err(e) => log::warn!("Failed to purge stale audio resources: {}", e),
    }

    let client = ServiceClient::new(&settings.base_url, settings.request_timeout())
        .map_err(|e| e.to_string())?;
    log::info!("Using analysis service at {}", client.base_url());

    let effect_runner = ServiceEffectRunner::new(
        client,
        codec.clone(),
        Arc::new(LogSink),
        &settings.audio_mime_type,
        settings.tick_interval(),
    );

    // Create event channel for state machine
    let (tx, rx) = mpsc::channel::<Event>(32);
    let input = tokio::spawn(surface::run_input_loop(StateLoopHandle::new(tx.clone())));

    run_state_loop(
        Arc::new(TerminalRenderer),
        rx,
        tx,
        effect_runner,
        settings.transport_defaults(),
    )
    .await;

    input.abort();
    if codec.live_count() > 0 {
        log::warn!("{} audio artifacts still live at exit", codec.live_count());
    }
    Ok(())
}

// ============================================================================
// Application entry point
// ============================================================================

pub fn run() -> Result<(), String> {
    let settings = settings::load_or_init_settings();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    log::info!("Recycle Assistant started");
    let result = runtime.block_on(run_session(settings));

    // Stdin reads park a blocking thread; don't wait for it
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}
