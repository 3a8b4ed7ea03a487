//! The capture workflow: one event-driven task owning one draft.
//!
//! All mutable state (draft, accumulator, session epoch) lives inside a
//! spawned task. Callers talk to it over an `mpsc` command channel with
//! `oneshot` responses; speech events and extraction results merge into the
//! same loop, so every mutation happens in arrival order on one task.
//!
//! In-flight extractions are never cancelled. Each listening session bumps an
//! epoch, extraction results come back tagged with the epoch they belong to,
//! and results from a superseded session are dropped on arrival.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::capture::{AccumulatorSignal, SpeechCapture, SpeechEvent, TranscriptAccumulator};
use crate::draft::{Draft, DraftSnapshot, DraftState};
use crate::extract::{ExtractedFields, ExtractionFailure, FieldExtractor};
use crate::model::{CategorySet, PhotoBlob, PunchlistItem};
use crate::store::JobStore;
use crate::{Error, Result};

#[derive(Debug)]
enum WorkflowCommand {
    StartCapture {
        response: oneshot::Sender<Result<()>>,
    },
    StopCapture {
        response: oneshot::Sender<()>,
    },
    SetRoom {
        value: String,
        response: oneshot::Sender<()>,
    },
    SetDescription {
        value: String,
        response: oneshot::Sender<()>,
    },
    SetCategory {
        value: String,
        response: oneshot::Sender<()>,
    },
    AttachPhoto {
        photo: PhotoBlob,
        response: oneshot::Sender<()>,
    },
    Submit {
        job_id: Uuid,
        response: oneshot::Sender<Result<PunchlistItem>>,
    },
    CancelDraft {
        response: oneshot::Sender<()>,
    },
}

struct ExtractionOutcome {
    epoch: u64,
    transcript: String,
    outcome: std::result::Result<ExtractedFields, ExtractionFailure>,
}

/// Handle to the capture workflow task.
pub struct CaptureWorkflow {
    command_tx: mpsc::Sender<WorkflowCommand>,
    snapshot_rx: watch::Receiver<DraftSnapshot>,
}

impl CaptureWorkflow {
    /// Spawn the workflow task around the given backends.
    pub fn new(
        speech: Arc<dyn SpeechCapture>,
        extractor: FieldExtractor,
        store: Arc<JobStore>,
        categories: CategorySet,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (extraction_tx, extraction_rx) = mpsc::channel(8);

        let draft = Draft::new(categories.default_label());
        let (snapshot_tx, snapshot_rx) = watch::channel(draft.snapshot());

        // Subscribe before spawning so no event can slip past startup.
        let speech_events = speech.events();

        let task = WorkflowTask {
            speech,
            extractor,
            store,
            categories,
            draft,
            accumulator: TranscriptAccumulator::new(),
            epoch: 0,
            snapshot_tx,
            extraction_tx,
        };
        tokio::spawn(task.run(command_rx, speech_events, extraction_rx));

        Self {
            command_tx,
            snapshot_rx,
        }
    }

    /// Begin a capture session, discarding any prior draft fields.
    pub async fn start_capture(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::StartCapture { response: tx }).await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// End the capture session. A no-op when no session is active.
    pub async fn stop_capture(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::StopCapture { response: tx }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn set_room(&self, value: impl Into<String>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::SetRoom {
            value: value.into(),
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn set_description(&self, value: impl Into<String>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::SetDescription {
            value: value.into(),
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn set_category(&self, value: impl Into<String>) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::SetCategory {
            value: value.into(),
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Closed)
    }

    pub async fn attach_photo(&self, photo: PhotoBlob) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::AttachPhoto {
            photo,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Validate and persist the draft as a new item of the given job.
    pub async fn submit(&self, job_id: Uuid) -> Result<PunchlistItem> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::Submit {
            job_id,
            response: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Discard the draft entirely.
    pub async fn cancel_draft(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WorkflowCommand::CancelDraft { response: tx }).await?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Subscribe to draft snapshots, republished after every mutation.
    pub fn snapshots(&self) -> watch::Receiver<DraftSnapshot> {
        self.snapshot_rx.clone()
    }

    /// The current draft view.
    pub fn snapshot(&self) -> DraftSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    async fn send(&self, command: WorkflowCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::Closed)
    }
}

struct WorkflowTask {
    speech: Arc<dyn SpeechCapture>,
    extractor: FieldExtractor,
    store: Arc<JobStore>,
    categories: CategorySet,
    draft: Draft,
    accumulator: TranscriptAccumulator,
    epoch: u64,
    snapshot_tx: watch::Sender<DraftSnapshot>,
    extraction_tx: mpsc::Sender<ExtractionOutcome>,
}

impl WorkflowTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<WorkflowCommand>,
        mut speech_events: broadcast::Receiver<SpeechEvent>,
        mut extractions: mpsc::Receiver<ExtractionOutcome>,
    ) {
        let mut speech_closed = false;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = speech_events.recv(), if !speech_closed => match event {
                    Ok(event) => self.handle_speech_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("speech event stream lagged, {} events dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => speech_closed = true,
                },
                Some(outcome) = extractions.recv() => self.handle_extraction(outcome),
            }
        }

        debug!("capture workflow loop ended");
    }

    async fn handle_command(&mut self, command: WorkflowCommand) {
        match command {
            WorkflowCommand::StartCapture { response } => {
                let result = self.speech.start().await;
                match &result {
                    Ok(()) => {
                        // A new session supersedes any in-flight extraction.
                        self.epoch += 1;
                        self.accumulator.begin_session();
                        self.draft.begin_listening();
                    }
                    Err(e) => self.draft.note_error(e.to_string()),
                }
                self.publish();
                let _ = response.send(result);
            }

            WorkflowCommand::StopCapture { response } => {
                self.speech.stop().await;
                let _ = response.send(());
            }

            WorkflowCommand::SetRoom { value, response } => {
                self.draft.set_room(value);
                self.publish();
                let _ = response.send(());
            }

            WorkflowCommand::SetDescription { value, response } => {
                self.draft.set_description(value);
                self.publish();
                let _ = response.send(());
            }

            WorkflowCommand::SetCategory { value, response } => {
                self.draft.set_category(value);
                self.publish();
                let _ = response.send(());
            }

            WorkflowCommand::AttachPhoto { photo, response } => {
                self.draft.attach_photo(photo);
                self.publish();
                let _ = response.send(());
            }

            WorkflowCommand::Submit { job_id, response } => {
                let _ = response.send(self.submit(job_id).await);
            }

            WorkflowCommand::CancelDraft { response } => {
                if self.draft.state() == DraftState::Listening {
                    self.speech.stop().await;
                }
                self.accumulator.reset();
                self.draft.cancel();
                self.publish();
                let _ = response.send(());
            }
        }
    }

    async fn submit(&mut self, job_id: Uuid) -> Result<PunchlistItem> {
        let submission = match self.draft.prepare_submission() {
            Ok(submission) => submission,
            Err(e) => {
                // Validation keeps the draft in Reviewing, untouched.
                self.draft.note_error(e.to_string());
                self.publish();
                return Err(e);
            }
        };

        match self
            .store
            .add_item(job_id, submission.fields, submission.photo)
            .await
        {
            Ok(item) => {
                self.draft.finish_submission();
                self.publish();
                Ok(item)
            }
            Err(e) => {
                // The draft survives a store failure; the change is not
                // assumed committed.
                self.draft.note_error(e.to_string());
                self.publish();
                Err(e)
            }
        }
    }

    fn handle_speech_event(&mut self, event: SpeechEvent) {
        match self.accumulator.push(event) {
            Some(AccumulatorSignal::Live(transcript)) => {
                self.draft.set_live_transcript(transcript);
                self.publish();
            }
            Some(AccumulatorSignal::Finalized(transcript)) => {
                self.spawn_extraction(transcript);
            }
            Some(AccumulatorSignal::Failed(reason)) => {
                self.draft.capture_failed(reason);
                self.publish();
            }
            None => {}
        }
    }

    fn spawn_extraction(&mut self, transcript: String) {
        if !self.draft.begin_extracting() {
            debug!("finalized transcript ignored, extraction already in flight");
            return;
        }
        self.publish();

        let extractor = self.extractor.clone();
        let categories = self.categories.clone();
        let tx = self.extraction_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let outcome = extractor.extract(&transcript, &categories).await;
            let _ = tx
                .send(ExtractionOutcome {
                    epoch,
                    transcript,
                    outcome,
                })
                .await;
        });
    }

    fn handle_extraction(&mut self, result: ExtractionOutcome) {
        if result.epoch != self.epoch {
            debug!("ignoring extraction result from a superseded session");
            return;
        }
        self.draft.apply_extraction(result.outcome, &result.transcript);
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.draft.snapshot());
    }
}
