//! The draft reconciler: one in-progress punchlist record and the state
//! machine that guards how capture, extraction and manual edits may mutate it.
//!
//! States move `Idle -> Listening -> Extracting -> Reviewing`; submission and
//! cancellation both exit back to `Idle` for the next draft. Transitions are
//! guarded methods rather than ad hoc flags so each guard can be tested on
//! its own.

use serde::Serialize;

use crate::capture::CaptureReason;
use crate::extract::{ExtractedFields, ExtractionFailure};
use crate::model::{ItemFields, PhotoBlob};
use crate::{Error, Result};

/// Message surfaced when extraction fails and the user must fill fields by hand.
pub const EXTRACTION_FALLBACK_MESSAGE: &str =
    "Could not understand the command. Please try again or fill manually.";

/// Lifecycle of one in-progress item capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftState {
    #[default]
    Idle,
    Listening,
    Extracting,
    Reviewing,
}

/// Point-in-time view of a draft, republished after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftSnapshot {
    pub state: DraftState,
    pub is_listening: bool,
    pub is_extracting: bool,
    pub room: String,
    pub description: String,
    pub category: String,
    pub has_photo: bool,
    pub live_transcript: String,
    pub last_error: Option<String>,
}

/// A validated persistence request produced from a submitted draft.
#[derive(Debug, Clone)]
pub struct Submission {
    pub fields: ItemFields,
    pub photo: PhotoBlob,
}

/// The transient record being composed by voice or manual entry.
///
/// Destroyed (reset to `Idle`) on submission or cancellation; never persisted
/// itself.
#[derive(Debug)]
pub struct Draft {
    state: DraftState,
    default_category: String,
    room: String,
    description: String,
    category: String,
    photo: Option<PhotoBlob>,
    live_transcript: String,
    last_error: Option<String>,
}

impl Draft {
    /// Create an empty draft. `default_category` seeds the category field
    /// whenever the draft is cleared.
    pub fn new(default_category: impl Into<String>) -> Self {
        let default_category = default_category.into();
        Self {
            state: DraftState::Idle,
            category: default_category.clone(),
            default_category,
            room: String::new(),
            description: String::new(),
            photo: None,
            live_transcript: String::new(),
            last_error: None,
        }
    }

    pub fn state(&self) -> DraftState {
        self.state
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        DraftSnapshot {
            state: self.state,
            is_listening: self.state == DraftState::Listening,
            is_extracting: self.state == DraftState::Extracting,
            room: self.room.clone(),
            description: self.description.clone(),
            category: self.category.clone(),
            has_photo: self.photo.is_some(),
            live_transcript: self.live_transcript.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn clear(&mut self) {
        self.room.clear();
        self.description.clear();
        self.category = self.default_category.clone();
        self.photo = None;
        self.live_transcript.clear();
        self.last_error = None;
    }

    /// Enter `Listening`, discarding all current draft fields.
    ///
    /// Re-activating capture from `Reviewing` (or any other state) restarts
    /// the draft from scratch.
    pub fn begin_listening(&mut self) {
        self.clear();
        self.state = DraftState::Listening;
    }

    /// Record the running transcript while the session is live.
    pub fn set_live_transcript(&mut self, transcript: impl Into<String>) {
        if self.state == DraftState::Listening {
            self.live_transcript = transcript.into();
        }
    }

    /// Try to enter `Extracting` on transcript finalization.
    ///
    /// Returns false when the transition is ignored: a finalize signal that
    /// overlaps an extraction already in flight (or arrives outside a live
    /// session) must not trigger a second extraction.
    pub fn begin_extracting(&mut self) -> bool {
        if self.state == DraftState::Listening {
            self.state = DraftState::Extracting;
            true
        } else {
            false
        }
    }

    /// Reconcile an extraction outcome into the draft and enter `Reviewing`.
    ///
    /// On failure, the raw transcript lands in `description` only when the
    /// user has not typed anything there, and a fallback message is surfaced.
    /// Outcomes arriving outside `Extracting` are ignored (stale results).
    pub fn apply_extraction(
        &mut self,
        outcome: std::result::Result<ExtractedFields, ExtractionFailure>,
        raw_transcript: &str,
    ) {
        if self.state != DraftState::Extracting {
            return;
        }

        match outcome {
            Ok(fields) => {
                self.room = fields.room;
                self.description = fields.description;
                self.category = fields.category;
                self.last_error = None;
            }
            Err(failure) => {
                tracing::warn!("extraction failed: {}", failure);
                if self.description.is_empty() {
                    self.description = raw_transcript.to_string();
                }
                self.last_error = Some(EXTRACTION_FALLBACK_MESSAGE.to_string());
            }
        }
        self.state = DraftState::Reviewing;
    }

    /// Recover a failed capture session: surface the reason's message and
    /// fall back to `Idle` with the live transcript discarded.
    pub fn capture_failed(&mut self, reason: CaptureReason) {
        self.live_transcript.clear();
        self.last_error = Some(reason.user_message().to_string());
        self.state = DraftState::Idle;
    }

    /// Surface an error message without changing state.
    pub fn note_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn set_room(&mut self, value: impl Into<String>) {
        self.room = value.into();
        self.mark_edited();
    }

    pub fn set_description(&mut self, value: impl Into<String>) {
        self.description = value.into();
        self.mark_edited();
    }

    pub fn set_category(&mut self, value: impl Into<String>) {
        self.category = value.into();
        self.mark_edited();
    }

    pub fn attach_photo(&mut self, photo: PhotoBlob) {
        self.photo = Some(photo);
        self.mark_edited();
    }

    // Manual entry on a fresh draft is a review in progress.
    fn mark_edited(&mut self) {
        if self.state == DraftState::Idle {
            self.state = DraftState::Reviewing;
        }
    }

    /// Check the submission precondition: photo, room and description must
    /// all be non-empty. Names every missing field on failure.
    pub fn validate_for_submit(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.photo.is_none() {
            missing.push("photo");
        }
        if self.room.trim().is_empty() {
            missing.push("room");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation { missing })
        }
    }

    /// Validate and assemble the persistence request. The draft itself is
    /// untouched until [`finish_submission`](Self::finish_submission)
    /// confirms the store accepted it.
    pub fn prepare_submission(&self) -> Result<Submission> {
        self.validate_for_submit()?;
        let photo = self
            .photo
            .clone()
            .ok_or(Error::Validation { missing: vec!["photo"] })?;
        Ok(Submission {
            fields: ItemFields {
                room: self.room.clone(),
                description: self.description.clone(),
                category: self.category.clone(),
            },
            photo,
        })
    }

    /// The draft was persisted; destroy it and return to `Idle`.
    pub fn finish_submission(&mut self) {
        self.clear();
        self.state = DraftState::Idle;
    }

    /// Discard the draft and return to `Idle`.
    pub fn cancel(&mut self) {
        self.clear();
        self.state = DraftState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted() -> ExtractedFields {
        ExtractedFields {
            room: "101".to_string(),
            description: "cracked tile floor".to_string(),
            category: "Division 09 - Finishes".to_string(),
        }
    }

    fn photo() -> PhotoBlob {
        PhotoBlob::new(vec![1, 2, 3], "snag.jpg", "image/jpeg")
    }

    #[test]
    fn test_new_draft_is_idle_with_default_category() {
        let draft = Draft::new("General");
        assert_eq!(draft.state(), DraftState::Idle);
        assert_eq!(draft.category(), "General");
        assert!(!draft.has_photo());
    }

    #[test]
    fn test_begin_listening_clears_all_fields() {
        let mut draft = Draft::new("General");
        draft.set_room("101");
        draft.set_description("old text");
        draft.set_category("Plumbing");
        draft.attach_photo(photo());

        draft.begin_listening();

        assert_eq!(draft.state(), DraftState::Listening);
        assert_eq!(draft.room(), "");
        assert_eq!(draft.description(), "");
        assert_eq!(draft.category(), "General");
        assert!(!draft.has_photo());
    }

    #[test]
    fn test_begin_extracting_only_from_listening() {
        let mut draft = Draft::new("General");
        assert!(!draft.begin_extracting());

        draft.begin_listening();
        assert!(draft.begin_extracting());
        assert_eq!(draft.state(), DraftState::Extracting);

        // Overlapping finalize signal is ignored.
        assert!(!draft.begin_extracting());
    }

    #[test]
    fn test_successful_extraction_overwrites_fields() {
        let mut draft = Draft::new("General");
        draft.begin_listening();
        draft.begin_extracting();

        draft.apply_extraction(Ok(extracted()), "room 101 cracked tile floor");

        assert_eq!(draft.state(), DraftState::Reviewing);
        assert_eq!(draft.room(), "101");
        assert_eq!(draft.description(), "cracked tile floor");
        assert_eq!(draft.category(), "Division 09 - Finishes");
        assert!(draft.last_error().is_none());
    }

    #[test]
    fn test_failed_extraction_falls_back_to_raw_transcript() {
        let mut draft = Draft::new("General");
        draft.begin_listening();
        draft.begin_extracting();

        draft.apply_extraction(
            Err(ExtractionFailure::Malformed("bad json".to_string())),
            "room 101 cracked tile floor",
        );

        assert_eq!(draft.state(), DraftState::Reviewing);
        assert_eq!(draft.description(), "room 101 cracked tile floor");
        assert_eq!(draft.last_error(), Some(EXTRACTION_FALLBACK_MESSAGE));
    }

    #[test]
    fn test_failed_extraction_never_overwrites_user_text() {
        let mut draft = Draft::new("General");
        draft.begin_listening();
        draft.begin_extracting();
        draft.set_description("typed by hand");

        draft.apply_extraction(
            Err(ExtractionFailure::EmptyResponse),
            "room 101 cracked tile floor",
        );

        assert_eq!(draft.description(), "typed by hand");
        assert_eq!(draft.last_error(), Some(EXTRACTION_FALLBACK_MESSAGE));
    }

    #[test]
    fn test_stale_extraction_outcome_is_ignored() {
        let mut draft = Draft::new("General");
        draft.begin_listening();

        // Result lands after the capture was restarted: state is Listening,
        // not Extracting, so nothing is applied.
        draft.apply_extraction(Ok(extracted()), "stale transcript");

        assert_eq!(draft.state(), DraftState::Listening);
        assert_eq!(draft.room(), "");
    }

    #[test]
    fn test_manual_edit_enters_reviewing() {
        let mut draft = Draft::new("General");
        draft.set_room("Lobby");
        assert_eq!(draft.state(), DraftState::Reviewing);
    }

    #[test]
    fn test_validation_names_every_missing_field() {
        let draft = Draft::new("General");
        let err = draft.validate_for_submit().unwrap_err();
        match err {
            Error::Validation { missing } => {
                assert_eq!(missing, vec!["photo", "room", "description"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_failure_keeps_reviewing_state() {
        let mut draft = Draft::new("General");
        draft.set_room("101");
        draft.set_description("cracked tile");

        assert!(draft.prepare_submission().is_err());
        assert_eq!(draft.state(), DraftState::Reviewing);
    }

    #[test]
    fn test_submission_round_trip() {
        let mut draft = Draft::new("General");
        draft.set_room("101");
        draft.set_description("cracked tile");
        draft.attach_photo(photo());

        let submission = draft.prepare_submission().unwrap();
        assert_eq!(submission.fields.room, "101");
        assert_eq!(submission.photo.file_name, "snag.jpg");

        draft.finish_submission();
        assert_eq!(draft.state(), DraftState::Idle);
        assert_eq!(draft.room(), "");
        assert!(!draft.has_photo());
    }

    #[test]
    fn test_capture_failure_recovers_to_idle() {
        let mut draft = Draft::new("General");
        draft.begin_listening();
        draft.set_live_transcript("half a sent");

        draft.capture_failed(CaptureReason::NoSpeech);

        assert_eq!(draft.state(), DraftState::Idle);
        assert_eq!(draft.snapshot().live_transcript, "");
        assert_eq!(
            draft.last_error(),
            Some(CaptureReason::NoSpeech.user_message())
        );
    }

    #[test]
    fn test_relisten_from_reviewing_discards_values() {
        let mut draft = Draft::new("General");
        draft.begin_listening();
        draft.begin_extracting();
        draft.apply_extraction(Ok(extracted()), "room 101 cracked tile floor");

        draft.begin_listening();

        assert_eq!(draft.state(), DraftState::Listening);
        assert_eq!(draft.room(), "");
        assert_eq!(draft.description(), "");
    }
}
