//! Continuous speech-recognition sessions and live transcript accumulation.
//!
//! The platform's recognition facility sits behind the [`SpeechCapture`]
//! trait: `start()`/`stop()` drive the session and `events()` hands out a
//! subscription to its event stream (dropping the receiver cancels the
//! subscription). The [`TranscriptAccumulator`] is the synchronous core that
//! folds those events into one running transcript and decides when a final
//! transcript is ready for extraction.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::Result;

/// Why a capture session ended abnormally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureReason {
    /// No audio was detected during the session
    NoSpeech,
    /// The capture device failed or is unavailable
    AudioCapture,
    /// Microphone permission was denied
    NotAllowed,
    /// The recognition service could not be reached
    Network,
    /// Any other session failure
    Other,
}

impl CaptureReason {
    /// Stable reason code as delivered by the capture backend.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureReason::NoSpeech => "no-speech",
            CaptureReason::AudioCapture => "audio-capture",
            CaptureReason::NotAllowed => "not-allowed",
            CaptureReason::Network => "network",
            CaptureReason::Other => "other",
        }
    }

    /// The user-facing message for this reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureReason::NoSpeech => {
                "No speech was detected. Please make sure your microphone is working and you are speaking clearly."
            }
            CaptureReason::AudioCapture => {
                "Audio capture failed. Please check your microphone connection and permissions."
            }
            CaptureReason::NotAllowed => {
                "Microphone access was denied. Please allow microphone access in your settings to use this feature."
            }
            CaptureReason::Network => {
                "A network error occurred with the speech service. Please check your internet connection."
            }
            CaptureReason::Other => "Speech recognition failed. Please try again.",
        }
    }
}

impl fmt::Display for CaptureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One event from the platform speech-recognition facility.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// The best current interpretation of everything spoken since `start()`,
    /// as an ordered list of segment transcripts.
    Result {
        segments: Vec<String>,
        is_final: bool,
    },
    /// The session ended, via `stop()` or a natural end
    Ended,
    /// The session failed with the given reason
    Error(CaptureReason),
}

/// Platform speech-recognition facility.
///
/// Implementations deliver [`SpeechEvent`]s to every subscriber in arrival
/// order. `start()` while a session is already active restarts the session;
/// the accumulator discards the prior transcript on its side.
#[async_trait]
pub trait SpeechCapture: Send + Sync {
    /// Begin a continuous recognition session.
    ///
    /// Fails with [`crate::Error::CapabilityUnavailable`] when the platform
    /// offers no recognition facility.
    async fn start(&self) -> Result<()>;

    /// End the session; the backend emits [`SpeechEvent::Ended`] in response.
    async fn stop(&self);

    /// Subscribe to session events. Dropping the receiver cancels the
    /// subscription.
    fn events(&self) -> broadcast::Receiver<SpeechEvent>;
}

/// What the accumulator's driver should do after an event was folded in.
#[derive(Debug, Clone, PartialEq)]
pub enum AccumulatorSignal {
    /// Republished running transcript, for on-screen feedback only
    Live(String),
    /// Trimmed final transcript, ready for extraction
    Finalized(String),
    /// The session failed; the partial transcript was discarded
    Failed(CaptureReason),
}

/// Folds partial recognition results into one running transcript.
///
/// Events arriving while no session is active are ignored, which makes
/// `stop()` on an already-stopped session a no-op: the trailing `Ended`
/// event cannot trigger a second finalization.
#[derive(Debug, Default)]
pub struct TranscriptAccumulator {
    running: String,
    active: bool,
}

impl TranscriptAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The running transcript as accumulated so far.
    pub fn live_transcript(&self) -> &str {
        &self.running
    }

    /// Begin a session, discarding anything a prior session accumulated.
    pub fn begin_session(&mut self) {
        self.running.clear();
        self.active = true;
    }

    /// Drop the session without finalizing.
    pub fn reset(&mut self) {
        self.running.clear();
        self.active = false;
    }

    /// Fold one speech event into the running transcript.
    ///
    /// Each result event carries the full interpretation of the session so
    /// far; its segments replace the running string rather than appending to
    /// it. A session ending with only whitespace accumulated finalizes to
    /// nothing (no signal is emitted).
    pub fn push(&mut self, event: SpeechEvent) -> Option<AccumulatorSignal> {
        if !self.active {
            return None;
        }

        match event {
            SpeechEvent::Result { segments, .. } => {
                self.running = segments.concat();
                Some(AccumulatorSignal::Live(self.running.clone()))
            }
            SpeechEvent::Ended => {
                self.active = false;
                let finalized = std::mem::take(&mut self.running).trim().to_string();
                if finalized.is_empty() {
                    None
                } else {
                    Some(AccumulatorSignal::Finalized(finalized))
                }
            }
            SpeechEvent::Error(reason) => {
                self.active = false;
                self.running.clear();
                Some(AccumulatorSignal::Failed(reason))
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn result(segments: &[&str]) -> SpeechEvent {
        SpeechEvent::Result {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            is_final: false,
        }
    }

    #[test]
    fn test_live_transcript_tracks_latest_interpretation() {
        let mut acc = TranscriptAccumulator::new();
        acc.begin_session();

        let first = acc.push(result(&["room one "]));
        assert_eq!(
            first,
            Some(AccumulatorSignal::Live("room one ".to_string()))
        );

        // Later events supersede earlier ones with a fuller interpretation.
        let second = acc.push(result(&["room one ", "hundred leak"]));
        assert_eq!(
            second,
            Some(AccumulatorSignal::Live("room one hundred leak".to_string()))
        );
    }

    #[test]
    fn test_finalize_trims_running_transcript() {
        let mut acc = TranscriptAccumulator::new();
        acc.begin_session();
        acc.push(result(&["  room 101 cracked tile floor  "]));

        assert_eq!(
            acc.push(SpeechEvent::Ended),
            Some(AccumulatorSignal::Finalized(
                "room 101 cracked tile floor".to_string()
            ))
        );
        assert!(!acc.is_active());
    }

    #[test]
    fn test_whitespace_only_session_finalizes_to_nothing() {
        let mut acc = TranscriptAccumulator::new();
        acc.begin_session();
        acc.push(result(&["   "]));
        assert_eq!(acc.push(SpeechEvent::Ended), None);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut acc = TranscriptAccumulator::new();
        acc.begin_session();
        acc.push(result(&["room two oven broken"]));

        assert!(matches!(
            acc.push(SpeechEvent::Ended),
            Some(AccumulatorSignal::Finalized(_))
        ));
        // A second Ended (stop on an already-stopped session) is ignored.
        assert_eq!(acc.push(SpeechEvent::Ended), None);
    }

    #[test]
    fn test_error_discards_partial_transcript() {
        let mut acc = TranscriptAccumulator::new();
        acc.begin_session();
        acc.push(result(&["half a sent"]));

        assert_eq!(
            acc.push(SpeechEvent::Error(CaptureReason::Network)),
            Some(AccumulatorSignal::Failed(CaptureReason::Network))
        );
        assert_eq!(acc.live_transcript(), "");
        assert!(!acc.is_active());
    }

    #[test]
    fn test_restart_discards_prior_session() {
        let mut acc = TranscriptAccumulator::new();
        acc.begin_session();
        acc.push(result(&["first session words"]));

        acc.begin_session();
        assert_eq!(acc.live_transcript(), "");

        acc.push(result(&["second session"]));
        assert_eq!(
            acc.push(SpeechEvent::Ended),
            Some(AccumulatorSignal::Finalized("second session".to_string()))
        );
    }

    #[test]
    fn test_reason_messages_are_distinct() {
        let reasons = [
            CaptureReason::NoSpeech,
            CaptureReason::AudioCapture,
            CaptureReason::NotAllowed,
            CaptureReason::Network,
            CaptureReason::Other,
        ];
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a.user_message(), b.user_message());
            }
        }
        assert_eq!(CaptureReason::NoSpeech.code(), "no-speech");
    }
}
