//! Service client for the recycling analysis and speech synthesis endpoints.
//!
//! - `POST /api/recycle`: multipart `image` → `{ result }` or `{ error }`,
//!   optionally with a legacy inline `audio` payload
//! - `POST /api/generate-audio`: JSON `{ text }` → `{ audio }` or `{ error }`

mod client;

pub use client::{AnalysisOutcome, ServiceClient, ANALYZE_PATH, SYNTHESIZE_PATH};
