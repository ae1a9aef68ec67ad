//! Integration tests for the session state machine
//!
//! These tests drive the reducer through whole user journeys against a mock
//! service. Effects are executed synchronously by a small harness: requests
//! are recorded and answered on demand, audio is decoded by a real
//! `MediaCodec` into a temporary directory so artifact lifetimes can be
//! counted.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test session_integration
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::VecDeque;
use tempfile::TempDir;
use uuid::Uuid;

use app_lib::analysis::{AnalysisState, ImageCandidate};
use app_lib::api::AnalysisOutcome;
use app_lib::codec::MediaCodec;
use app_lib::error::ClientError;
use app_lib::playback::{AudioPhase, PlaybackCommand};
use app_lib::state_machine::{reduce, Effect, Event, State};
use app_lib::{state_to_ui, AnalysisView};

const RESULT_TEXT: &str = "**Recyclable**\n";

fn candidate(file_name: &str, mime_type: &str) -> ImageCandidate {
    ImageCandidate {
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        bytes: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A],
    }
}

fn png() -> ImageCandidate {
    candidate("bottle.png", "image/png")
}

/// 32_000 bytes at 128 kbps: a two second track
fn audio_payload() -> String {
    STANDARD.encode(vec![0x55u8; 32_000])
}

/// Runs the reducer and executes its effects in-process.
struct Harness {
    _dir: TempDir,
    codec: MediaCodec,
    state: State,
    pending_analysis: VecDeque<Uuid>,
    pending_synthesis: VecDeque<Uuid>,
    analysis_requests: usize,
    synthesis_requests: usize,
    playback: Vec<PlaybackCommand>,
    notices: Vec<ClientError>,
    ui_frames: usize,
    max_live: usize,
    /// Artifact the tick source is running for
    ticking: Option<Uuid>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let codec = MediaCodec::new(dir.path(), 128);
        Self {
            _dir: dir,
            codec,
            state: State::default(),
            pending_analysis: VecDeque::new(),
            pending_synthesis: VecDeque::new(),
            analysis_requests: 0,
            synthesis_requests: 0,
            playback: Vec::new(),
            notices: Vec::new(),
            ui_frames: 0,
            max_live: 0,
            ticking: None,
        }
    }

    fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);

        while let Some(event) = queue.pop_front() {
            let (next, effects) = reduce(std::mem::take(&mut self.state), event);
            self.state = next;

            for effect in effects {
                match effect {
                    Effect::SubmitAnalysis { id, .. } => {
                        self.analysis_requests += 1;
                        self.pending_analysis.push_back(id);
                    }
                    Effect::Synthesize { id, .. } => {
                        self.synthesis_requests += 1;
                        self.pending_synthesis.push_back(id);
                    }
                    // Decoded at the edge, as the state loop does
                    Effect::DecodeAudio { id, payload } => {
                        let outcome = self
                            .codec
                            .decode(&payload, "audio/mpeg")
                            .map_err(ClientError::from);
                        queue.push_back(Event::AudioDecoded { id, outcome });
                    }
                    Effect::ReleaseArtifact(artifact) => {
                        if self.ticking == Some(artifact.id()) {
                            self.ticking = None;
                        }
                        artifact.release();
                    }
                    Effect::Playback(command) => self.playback.push(command),
                    Effect::StartPlaybackTicks { artifact_id } => self.ticking = Some(artifact_id),
                    Effect::StopPlaybackTicks { artifact_id } => {
                        if self.ticking == Some(artifact_id) {
                            self.ticking = None;
                        }
                    }
                    Effect::Reject(err) => self.notices.push(err),
                    Effect::EmitUi => self.ui_frames += 1,
                }
                self.max_live = self.max_live.max(self.codec.live_count());
            }
        }
    }

    fn answer_analysis(&mut self, outcome: Result<AnalysisOutcome, ClientError>) {
        let id = self.pending_analysis.pop_front().expect("no analysis pending");
        self.dispatch(Event::AnalysisCompleted { id, outcome });
    }

    fn answer_analysis_ok(&mut self, text: &str) {
        self.answer_analysis(Ok(AnalysisOutcome {
            result: text.to_string(),
            inline_audio: None,
        }));
    }

    fn answer_synthesis(&mut self, payload: &str) {
        let id = self
            .pending_synthesis
            .pop_front()
            .expect("no synthesis pending");
        self.dispatch(Event::SynthesisCompleted {
            id,
            outcome: Ok(payload.to_string()),
        });
    }

    /// Displayed result with a playing artifact
    fn playing(&mut self) {
        self.dispatch(Event::SubmitImage(png()));
        self.answer_analysis_ok(RESULT_TEXT);
        self.dispatch(Event::RequestAudio);
        self.answer_synthesis(&audio_payload());
        assert!(self.state.audio.is_playing());
    }

    fn live(&self) -> usize {
        self.codec.live_count()
    }
}

// ============================================================================
// Mock Tests - scenarios
// ============================================================================

mod mock_scenarios {
    use super::*;

    #[test]
    fn mock_png_is_analyzed_and_displayed() {
        let mut h = Harness::new();

        h.dispatch(Event::SubmitImage(png()));
        assert!(matches!(h.state.analysis, AnalysisState::Analyzing { .. }));
        assert!(!state_to_ui(&h.state).analyze_enabled);

        h.answer_analysis_ok(RESULT_TEXT);

        let result = h.state.analysis.result().expect("result displayed");
        assert!(result.markup.contains("<strong>Recyclable</strong><br>"));
        assert!(matches!(h.state.analysis, AnalysisState::Displayed { .. }));
        assert!(state_to_ui(&h.state).analyze_enabled);
    }

    #[test]
    fn mock_txt_is_rejected_without_request() {
        let mut h = Harness::new();

        h.dispatch(Event::SubmitImage(candidate("notes.txt", "text/plain")));

        assert_eq!(h.analysis_requests, 0);
        assert!(matches!(h.state.analysis, AnalysisState::Empty));
        assert!(matches!(
            h.notices.as_slice(),
            [ClientError::InvalidInput(_)]
        ));
    }

    #[test]
    fn mock_audio_plays_then_clear_releases_it() {
        let mut h = Harness::new();
        h.playing();

        assert_eq!(h.live(), 1);
        assert!(h.playback.contains(&PlaybackCommand::Play));

        h.dispatch(Event::Clear);

        assert_eq!(h.live(), 0);
        assert!(matches!(h.state.analysis, AnalysisState::Empty));
        assert!(matches!(h.state.audio.phase(), AudioPhase::Idle));
        assert_eq!(h.playback.last(), Some(&PlaybackCommand::Stop));
    }

    #[test]
    fn mock_remote_error_is_shown_and_trigger_restored() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));

        h.answer_analysis(Err(ClientError::Remote(
            "Gemini API key not configured".to_string(),
        )));

        let ui = state_to_ui(&h.state);
        match ui.analysis {
            AnalysisView::Failed { message, .. } => {
                assert_eq!(message, "Gemini API key not configured")
            }
            other => panic!("expected failure view, got {:?}", other),
        }
        assert!(ui.analyze_enabled);
    }

    #[test]
    fn mock_transport_error_restores_trigger() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));

        h.answer_analysis(Err(ClientError::Transport("HTTP 502".to_string())));

        assert!(state_to_ui(&h.state).analyze_enabled);
        assert_eq!(h.analysis_requests, 1);
    }

    #[test]
    fn mock_select_then_analyze_flow() {
        let mut h = Harness::new();

        h.dispatch(Event::SelectImage(png()));
        assert_eq!(h.analysis_requests, 0);
        assert!(state_to_ui(&h.state).analyze_enabled);

        h.dispatch(Event::Analyze);
        assert_eq!(h.analysis_requests, 1);
    }

    #[test]
    fn mock_inline_audio_is_cached_without_synthesis() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));

        h.answer_analysis(Ok(AnalysisOutcome {
            result: RESULT_TEXT.to_string(),
            inline_audio: Some(audio_payload()),
        }));

        assert_eq!(h.live(), 1);
        assert!(matches!(h.state.audio.phase(), AudioPhase::Ready { .. }));
        assert!(!h.playback.contains(&PlaybackCommand::Play));

        h.dispatch(Event::RequestAudio);

        assert_eq!(h.synthesis_requests, 0);
        assert!(h.state.audio.is_playing());
        assert_eq!(h.live(), 1);
    }

    #[test]
    fn mock_bad_synthesis_payload_lands_in_audio_panel() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));
        h.answer_analysis_ok(RESULT_TEXT);
        h.dispatch(Event::RequestAudio);

        h.answer_synthesis("this is not base64");

        assert_eq!(h.live(), 0);
        assert!(matches!(h.state.audio.phase(), AudioPhase::Idle));
        assert!(h.state.audio.error().unwrap().starts_with("Could not decode audio"));
        assert!(h.state.analysis.result().is_some());
        assert!(state_to_ui(&h.state).audio_enabled);
    }
}

// ============================================================================
// Mock Tests - properties
// ============================================================================

mod mock_properties {
    use super::*;

    #[test]
    fn mock_non_images_never_change_state() {
        for (name, mime) in [
            ("notes.txt", "text/plain"),
            ("scan.pdf", "application/pdf"),
            ("README", ""),
            ("voice.mp3", "audio/mpeg"),
        ] {
            let mut h = Harness::new();
            h.dispatch(Event::SubmitImage(png()));
            h.answer_analysis_ok(RESULT_TEXT);
            let frames = h.ui_frames;

            h.dispatch(Event::SubmitImage(candidate(name, mime)));
            h.dispatch(Event::SelectImage(candidate(name, mime)));

            assert_eq!(h.analysis_requests, 1, "{} issued a request", name);
            assert_eq!(h.state.analysis.result().unwrap().text, RESULT_TEXT);
            assert_eq!(h.ui_frames, frames);
            assert_eq!(h.notices.len(), 2);
        }
    }

    #[test]
    fn mock_one_request_while_outstanding() {
        let mut h = Harness::new();

        h.dispatch(Event::SubmitImage(png()));
        h.dispatch(Event::SubmitImage(png()));
        h.dispatch(Event::Analyze);
        assert_eq!(h.analysis_requests, 1);

        h.answer_analysis_ok(RESULT_TEXT);
        h.dispatch(Event::SubmitImage(png()));
        assert_eq!(h.analysis_requests, 2);
    }

    #[test]
    fn mock_clear_from_any_state_leaves_nothing_live() {
        type Setup = fn(&mut Harness);
        let setups: [Setup; 6] = [
            |_| {},
            |h| h.dispatch(Event::SelectImage(png())),
            |h| h.dispatch(Event::SubmitImage(png())),
            |h| {
                h.dispatch(Event::SubmitImage(png()));
                h.answer_analysis_ok(RESULT_TEXT);
            },
            |h| {
                h.dispatch(Event::SubmitImage(png()));
                h.answer_analysis_ok(RESULT_TEXT);
                h.dispatch(Event::RequestAudio);
            },
            |h| h.playing(),
        ];

        for setup in setups {
            let mut h = Harness::new();
            setup(&mut h);

            h.dispatch(Event::Clear);

            assert_eq!(h.live(), 0);
            assert!(matches!(h.state.analysis, AnalysisState::Empty));
            assert!(matches!(h.state.audio.phase(), AudioPhase::Idle));
        }
    }

    #[test]
    fn mock_repeat_audio_request_reuses_cache() {
        let mut h = Harness::new();
        h.playing();
        h.dispatch(Event::TogglePlayPause);

        h.dispatch(Event::RequestAudio);
        h.dispatch(Event::RequestAudio);

        assert_eq!(h.synthesis_requests, 1);
        assert_eq!(h.live(), 1);
        assert!(h.state.audio.is_playing());
    }

    #[test]
    fn mock_repeat_audio_request_while_pending_is_ignored() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));
        h.answer_analysis_ok(RESULT_TEXT);

        h.dispatch(Event::RequestAudio);
        h.dispatch(Event::RequestAudio);

        assert_eq!(h.synthesis_requests, 1);
    }

    #[test]
    fn mock_superseded_result_invalidates_audio_first() {
        let mut h = Harness::new();
        h.playing();

        // Re-analyze the same image: audio goes before the new request
        h.dispatch(Event::Analyze);
        assert_eq!(h.live(), 0);

        h.answer_analysis_ok("## Glass\nRinse it.\n");
        h.dispatch(Event::RequestAudio);
        h.answer_synthesis(&audio_payload());

        assert_eq!(h.synthesis_requests, 2);
        assert_eq!(h.live(), 1);
        assert_eq!(h.max_live, 1);
    }

    #[test]
    fn mock_stale_synthesis_is_never_decoded() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));
        h.answer_analysis_ok(RESULT_TEXT);
        h.dispatch(Event::RequestAudio);

        h.dispatch(Event::Clear);
        h.answer_synthesis(&audio_payload());

        assert_eq!(h.live(), 0);
        assert_eq!(h.max_live, 0);
        assert!(matches!(h.state.audio.phase(), AudioPhase::Idle));
    }

    #[test]
    fn mock_late_synthesis_next_to_inline_audio_keeps_one_live() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));
        h.answer_analysis_ok(RESULT_TEXT);
        h.dispatch(Event::RequestAudio);

        // Re-analysis brings its own audio while the old synthesis is in flight
        h.dispatch(Event::Analyze);
        h.answer_analysis(Ok(AnalysisOutcome {
            result: "## Metal\nCrush the can.\n".to_string(),
            inline_audio: Some(audio_payload()),
        }));
        assert_eq!(h.live(), 1);
        let inline_id = h.state.audio.artifact().unwrap().id();

        h.answer_synthesis(&audio_payload());

        assert_eq!(h.live(), 1);
        assert_eq!(h.max_live, 1);
        assert_eq!(h.state.audio.artifact().unwrap().id(), inline_id);
        assert!(matches!(h.state.audio.phase(), AudioPhase::Ready { .. }));
    }

    #[test]
    fn mock_ticks_run_only_while_playing() {
        let mut h = Harness::new();
        h.playing();
        let artifact_id = h.state.audio.artifact().unwrap().id();
        assert_eq!(h.ticking, Some(artifact_id));

        h.dispatch(Event::TogglePlayPause);
        assert_eq!(h.ticking, None);

        h.dispatch(Event::TogglePlayPause);
        assert_eq!(h.ticking, Some(artifact_id));

        // Two second track runs out
        h.dispatch(Event::PlaybackTick {
            artifact_id,
            elapsed: std::time::Duration::from_secs(3),
        });
        assert!(matches!(h.state.audio.phase(), AudioPhase::Ready { .. }));
        assert_eq!(h.ticking, None);
    }

    #[test]
    fn mock_stale_analysis_never_lands() {
        let mut h = Harness::new();
        h.dispatch(Event::SubmitImage(png()));
        h.dispatch(Event::SelectImage(candidate("jar.jpg", "image/jpeg")));

        h.answer_analysis_ok(RESULT_TEXT);

        match &h.state.analysis {
            AnalysisState::Ready { image } => assert_eq!(image.file_name(), "jar.jpg"),
            other => panic!("expected Ready, got {:?}", other),
        }
    }

    #[test]
    fn mock_seek_clamps_to_track_bounds() {
        let mut h = Harness::new();
        h.playing();
        let duration = h.state.audio.transport().unwrap().duration;

        h.dispatch(Event::Seek(1.5));
        assert_eq!(h.state.audio.transport().unwrap().position, duration);

        h.dispatch(Event::Seek(-0.2));
        assert!(h.state.audio.transport().unwrap().position.is_zero());
    }

    #[test]
    fn mock_exit_releases_live_artifact() {
        let mut h = Harness::new();
        h.playing();

        h.dispatch(Event::Exit);

        assert_eq!(h.live(), 0);
    }
}
