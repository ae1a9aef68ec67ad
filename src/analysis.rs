//! Analysis controller: image intake, the single in-flight analysis request,
//! and projection of its result or error.
//!
//! States: `Empty → Ready → Analyzing → {Displayed, Failed}`. Selecting a new
//! image or clearing is accepted from any state. Responses carry the request id
//! they were issued with; a response whose id no longer matches the pending
//! request is dropped.

use std::sync::Arc;
use uuid::Uuid;

use crate::api::AnalysisOutcome;
use crate::error::ClientError;
use crate::formatter;

/// An unvalidated file picked by the user.
#[derive(Clone)]
pub struct ImageCandidate {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ImageCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCandidate")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// A validated image. Replaced wholesale, never mutated.
#[derive(Clone)]
pub struct ImageAsset {
    id: Uuid,
    file_name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl ImageAsset {
    /// Validate a candidate. Only `image/*` MIME types are accepted.
    pub fn from_candidate(candidate: ImageCandidate) -> Result<Self, ClientError> {
        if !candidate.mime_type.starts_with("image/") {
            return Err(ClientError::InvalidInput(format!(
                "Please upload an image file ({} is {})",
                candidate.file_name,
                if candidate.mime_type.is_empty() {
                    "of unknown type"
                } else {
                    candidate.mime_type.as_str()
                }
            )));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            file_name: candidate.file_name,
            mime_type: candidate.mime_type,
            bytes: candidate.bytes.into(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAsset")
            .field("id", &self.id)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

/// Text produced by the service for exactly one image, plus its display markup.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub text: String,
    pub markup: String,
}

#[derive(Debug, Clone, Default)]
pub enum AnalysisState {
    #[default]
    Empty,
    Ready {
        image: ImageAsset,
    },
    Analyzing {
        image: ImageAsset,
        request_id: Uuid,
    },
    Displayed {
        image: ImageAsset,
        result: AnalysisResult,
    },
    Failed {
        image: ImageAsset,
        message: String,
    },
}

impl AnalysisState {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisState::Empty => "empty",
            AnalysisState::Ready { .. } => "ready",
            AnalysisState::Analyzing { .. } => "analyzing",
            AnalysisState::Displayed { .. } => "displayed",
            AnalysisState::Failed { .. } => "failed",
        }
    }

    pub fn image(&self) -> Option<&ImageAsset> {
        match self {
            AnalysisState::Empty => None,
            AnalysisState::Ready { image }
            | AnalysisState::Analyzing { image, .. }
            | AnalysisState::Displayed { image, .. }
            | AnalysisState::Failed { image, .. } => Some(image),
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisState::Displayed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn pending_request(&self) -> Option<Uuid> {
        match self {
            AnalysisState::Analyzing { request_id, .. } => Some(*request_id),
            _ => None,
        }
    }

    /// Whether the analyze trigger is enabled.
    pub fn can_analyze(&self) -> bool {
        matches!(
            self,
            AnalysisState::Ready { .. }
                | AnalysisState::Displayed { .. }
                | AnalysisState::Failed { .. }
        )
    }
}

#[derive(Debug)]
pub enum AnalysisEvent {
    /// Store a new image without analyzing it
    Select(ImageCandidate),
    /// Store a new image and analyze it right away
    Submit(ImageCandidate),
    /// Analyze the current image
    Analyze,
    Clear,
    Completed {
        request_id: Uuid,
        outcome: Result<AnalysisOutcome, ClientError>,
    },
}

#[derive(Debug, Clone)]
pub enum AnalysisEffect {
    SubmitAnalysis { request_id: Uuid, image: ImageAsset },
}

/// Result of a single transition.
#[derive(Debug)]
pub struct AnalysisStep {
    pub state: AnalysisState,
    pub effects: Vec<AnalysisEffect>,
    /// The transition discarded the current result (or its image); any audio
    /// derived from it must be invalidated before the effects run.
    pub supersedes_result: bool,
    /// Legacy audio payload that arrived together with a new result
    pub inline_audio: Option<String>,
    pub changed: bool,
}

impl AnalysisStep {
    fn unchanged(state: &AnalysisState) -> Self {
        Self {
            state: state.clone(),
            effects: vec![],
            supersedes_result: false,
            inline_audio: None,
            changed: false,
        }
    }

    fn to(state: AnalysisState, supersedes_result: bool) -> Self {
        Self {
            state,
            effects: vec![],
            supersedes_result,
            inline_audio: None,
            changed: true,
        }
    }

    fn analyzing(image: ImageAsset) -> Self {
        let request_id = Uuid::new_v4();
        log::info!(
            "Analysis {} requested for image {} ({})",
            request_id,
            image.id(),
            image.file_name()
        );
        Self {
            state: AnalysisState::Analyzing {
                image: image.clone(),
                request_id,
            },
            effects: vec![AnalysisEffect::SubmitAnalysis { request_id, image }],
            supersedes_result: true,
            inline_audio: None,
            changed: true,
        }
    }
}

/// Reducer: (state, event) -> step
///
/// The only error is `InvalidInput`, returned before anything changes; the
/// caller keeps its current state.
pub fn reduce(state: &AnalysisState, event: AnalysisEvent) -> Result<AnalysisStep, ClientError> {
    use AnalysisEvent::*;
    use AnalysisState::*;

    let step = match (state, event) {
        (_, Select(candidate)) => {
            let image = ImageAsset::from_candidate(candidate)?;
            log::info!("Image selected: {} ({})", image.file_name, image.mime_type);
            AnalysisStep::to(Ready { image }, true)
        }

        (Analyzing { request_id, .. }, Submit(candidate)) => {
            ImageAsset::from_candidate(candidate)?;
            log::debug!("Submit ignored: analysis {} still pending", request_id);
            AnalysisStep::unchanged(state)
        }
        (_, Submit(candidate)) => AnalysisStep::analyzing(ImageAsset::from_candidate(candidate)?),

        (Ready { image } | Displayed { image, .. } | Failed { image, .. }, Analyze) => {
            AnalysisStep::analyzing(image.clone())
        }
        (Empty | Analyzing { .. }, Analyze) => AnalysisStep::unchanged(state),

        (_, Clear) => AnalysisStep::to(Empty, true),

        (
            Analyzing {
                image,
                request_id: pending,
            },
            Completed {
                request_id,
                outcome,
            },
        ) if *pending == request_id => match outcome {
            Ok(outcome) => {
                log::info!(
                    "Analysis {} succeeded: {} chars (inline audio: {})",
                    request_id,
                    outcome.result.len(),
                    outcome.inline_audio.is_some()
                );
                let result = AnalysisResult {
                    markup: formatter::format(&outcome.result),
                    text: outcome.result,
                };
                let mut step = AnalysisStep::to(
                    Displayed {
                        image: image.clone(),
                        result,
                    },
                    true,
                );
                step.inline_audio = outcome.inline_audio;
                step
            }
            Err(err) => {
                log::warn!("Analysis {} failed: {}", request_id, err);
                AnalysisStep::to(
                    Failed {
                        image: image.clone(),
                        message: err.to_string(),
                    },
                    false,
                )
            }
        },
        (_, Completed { request_id, .. }) => {
            log::debug!("Dropping stale analysis response {}", request_id);
            AnalysisStep::unchanged(state)
        }
    };

    Ok(step)
}
