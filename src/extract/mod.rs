//! Natural-language-to-structured-field extraction.
//!
//! A finished transcript goes out to an external structured-extraction
//! service ([`ExtractionService`]) and comes back as exactly three fields or
//! as an [`ExtractionFailure`]. Partially-populated results do not exist:
//! any missing or unparsable field fails the whole extraction and the caller
//! falls back to manual entry.

pub mod external;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::model::CategorySet;

pub use external::{ExternalExtractor, ExternalExtractorConfig};

/// Structured fields returned by a successful extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub room: String,
    pub description: String,
    pub category: String,
}

/// Why an extraction produced no usable fields.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionFailure {
    /// The transcript was empty after trimming; no remote call was made
    #[error("transcript is empty")]
    EmptyTranscript,

    /// The extraction service could not be reached or refused the request
    #[error("extraction service unreachable: {0}")]
    Transport(String),

    /// The service returned an empty response body
    #[error("extraction service returned an empty response")]
    EmptyResponse,

    /// The response was not a JSON object
    #[error("extraction response is not valid JSON: {0}")]
    Malformed(String),

    /// The response omitted (or blanked) a required field
    #[error("extraction response omits required field `{0}`")]
    MissingField(&'static str),
}

/// One request to the structured-extraction service.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionRequest {
    /// Prompt text embedding the transcript
    pub prompt: String,
    /// The closed category set the response should draw from
    pub categories: Vec<String>,
}

/// External structured-extraction service boundary.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Issue one extraction request and return the raw response text.
    async fn complete(&self, request: &ExtractionRequest) -> anyhow::Result<String>;
}

/// Turns transcripts into [`ExtractedFields`] via an [`ExtractionService`].
///
/// At most one extraction is logically in flight per draft; this component
/// does not deduplicate concurrent calls; the caller's state guard owns
/// that, and stale results are the caller's to ignore.
#[derive(Clone)]
pub struct FieldExtractor {
    service: Arc<dyn ExtractionService>,
}

impl FieldExtractor {
    pub fn new(service: Arc<dyn ExtractionService>) -> Self {
        Self { service }
    }

    /// Extract `room`, `description` and `category` from a transcript.
    pub async fn extract(
        &self,
        transcript: &str,
        categories: &CategorySet,
    ) -> Result<ExtractedFields, ExtractionFailure> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(ExtractionFailure::EmptyTranscript);
        }

        let request = ExtractionRequest {
            prompt: build_prompt(transcript),
            categories: categories.labels().to_vec(),
        };

        let raw = self
            .service
            .complete(&request)
            .await
            .map_err(|e| ExtractionFailure::Transport(e.to_string()))?;

        parse_response(&raw, categories)
    }
}

/// Build the extraction prompt around a transcript.
pub fn build_prompt(transcript: &str) -> String {
    format!(
        "Parse the following voice command from a construction site manager. \
         Extract the room number or location, a description of the issue, and \
         the responsible trade/category. The command is: \"{}\"",
        transcript
    )
}

/// Parse a raw service response into fully-populated fields.
fn parse_response(
    raw: &str,
    categories: &CategorySet,
) -> Result<ExtractedFields, ExtractionFailure> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExtractionFailure::EmptyResponse);
    }

    let value: Value =
        serde_json::from_str(raw).map_err(|e| ExtractionFailure::Malformed(e.to_string()))?;

    let room = required_field(&value, "room")?;
    let description = required_field(&value, "description")?;
    let category = required_field(&value, "category")?;

    // The service may deviate from the supplied set on purpose; keep the
    // value but leave a trace of it.
    if !categories.contains(&category) {
        warn!(
            "extracted category {:?} is outside the configured set",
            category
        );
    }

    Ok(ExtractedFields {
        room,
        description,
        category,
    })
}

fn required_field(value: &Value, name: &'static str) -> Result<String, ExtractionFailure> {
    match value.get(name).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(ExtractionFailure::MissingField(name)),
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::stub::StubService;
    use super::*;

    fn extractor(service: StubService) -> (FieldExtractor, Arc<StubService>) {
        let service = Arc::new(service);
        (FieldExtractor::new(service.clone()), service)
    }

    #[tokio::test]
    async fn test_extract_returns_all_three_fields() {
        let (extractor, _) = extractor(StubService::replying(
            r#"{"room":"101","description":"cracked tile floor","category":"Division 09 - Finishes"}"#,
        ));

        let fields = extractor
            .extract("room 101 cracked tile floor, division 9", &CategorySet::csi_divisions())
            .await
            .unwrap();

        assert_eq!(fields.room, "101");
        assert_eq!(fields.description, "cracked tile floor");
        assert_eq!(fields.category, "Division 09 - Finishes");
    }

    #[tokio::test]
    async fn test_empty_transcript_is_rejected_without_a_remote_call() {
        let (extractor, service) = extractor(StubService::replying("{}"));

        let result = extractor.extract("   ", &CategorySet::csi_divisions()).await;

        assert_eq!(result, Err(ExtractionFailure::EmptyTranscript));
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_response_is_a_failure() {
        let (extractor, _) = extractor(StubService::replying("room: 101, not json"));

        let result = extractor.extract("room 101 leak", &CategorySet::csi_divisions()).await;

        assert!(matches!(result, Err(ExtractionFailure::Malformed(_))));
    }

    #[tokio::test]
    async fn test_missing_field_is_a_failure_not_a_partial_result() {
        let (extractor, _) = extractor(StubService::replying(
            r#"{"room":"101","category":"Division 22 - Plumbing"}"#,
        ));

        let result = extractor.extract("room 101 leak", &CategorySet::csi_divisions()).await;

        assert_eq!(result, Err(ExtractionFailure::MissingField("description")));
    }

    #[tokio::test]
    async fn test_blank_field_counts_as_missing() {
        let (extractor, _) = extractor(StubService::replying(
            r#"{"room":"","description":"leak","category":"Division 22 - Plumbing"}"#,
        ));

        let result = extractor.extract("leak somewhere", &CategorySet::csi_divisions()).await;

        assert_eq!(result, Err(ExtractionFailure::MissingField("room")));
    }

    #[tokio::test]
    async fn test_empty_response_is_a_failure() {
        let (extractor, _) = extractor(StubService::replying("   "));

        let result = extractor.extract("room 101 leak", &CategorySet::csi_divisions()).await;

        assert_eq!(result, Err(ExtractionFailure::EmptyResponse));
    }

    #[tokio::test]
    async fn test_out_of_set_category_is_accepted() {
        let (extractor, _) = extractor(StubService::replying(
            r#"{"room":"Lobby","description":"scuffed wall","category":"Division 50 - Unknown"}"#,
        ));

        let fields = extractor
            .extract("lobby scuffed wall", &CategorySet::csi_divisions())
            .await
            .unwrap();

        assert_eq!(fields.category, "Division 50 - Unknown");
    }

    #[tokio::test]
    async fn test_transport_error_maps_to_failure() {
        let (extractor, _) = extractor(StubService::new(vec![Err(anyhow::anyhow!(
            "connection refused"
        ))]));

        let result = extractor.extract("room 101 leak", &CategorySet::csi_divisions()).await;

        assert!(matches!(result, Err(ExtractionFailure::Transport(_))));
    }

    #[tokio::test]
    async fn test_prompt_embeds_the_transcript() {
        let (extractor, service) = extractor(StubService::replying(
            r#"{"room":"101","description":"leak","category":"Division 22 - Plumbing"}"#,
        ));

        extractor
            .extract("  room 101 leak  ", &CategorySet::csi_divisions())
            .await
            .unwrap();

        let prompts = service.prompts();
        assert!(prompts[0].contains("\"room 101 leak\""));
    }
}
