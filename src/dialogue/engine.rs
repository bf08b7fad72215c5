use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::catalog::ModelCatalog;
use crate::dialogue::prompt::{build_turn_messages, DialogueNames};
use crate::errors::AppError;
use crate::models::{
    ChatRequest, DialogueConfig, DialogueSlot, DialogueStatus, DialogueTurnRecord, Speaker,
};
use crate::stream::streamer::{stream_response, StreamEvent, StreamOutcome};
use crate::stream::transport::ChatTransport;

/// Pause between turns so observers can follow the exchange.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Read-only view of the dialogue, republished after every change.
#[derive(Debug, Clone, Serialize)]
pub struct DialogueSnapshot {
    pub run_id: Option<Uuid>,
    pub status: DialogueStatus,
    /// 1-based index of the turn in progress (0 before the first turn).
    pub current_turn: u32,
    pub max_turns: u32,
    pub current_speaker: Option<DialogueSlot>,
    /// Text of the in-progress turn; cleared once the turn is recorded.
    pub streaming_text: String,
    pub transcript: Vec<DialogueTurnRecord>,
}

impl Default for DialogueSnapshot {
    fn default() -> Self {
        Self {
            run_id: None,
            status: DialogueStatus::Idle,
            current_turn: 0,
            max_turns: 0,
            current_speaker: None,
            streaming_text: String::new(),
            transcript: Vec::new(),
        }
    }
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<DialogueStatus>,
}

/// Runs an alternating conversation between two models.
///
/// One run at a time: the run loop owns the transcript and is the only
/// writer; everyone else reads snapshots from [`DialogueEngine::subscribe`].
pub struct DialogueEngine<T: ChatTransport> {
    transport: Arc<T>,
    catalog: Arc<ModelCatalog>,
    pacing: Duration,
    snapshots: Arc<watch::Sender<DialogueSnapshot>>,
    active: Option<ActiveRun>,
}

impl<T: ChatTransport> DialogueEngine<T> {
    pub fn new(transport: Arc<T>, catalog: Arc<ModelCatalog>) -> Self {
        let (snapshots, _) = watch::channel(DialogueSnapshot::default());
        Self {
            transport,
            catalog,
            pacing: DEFAULT_PACING,
            snapshots: Arc::new(snapshots),
            active: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<DialogueSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> DialogueSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn status(&self) -> DialogueStatus {
        self.snapshots.borrow().status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Validates `config` and launches a new run. Rejected while a previous
    /// run has not reached a terminal state.
    pub fn start(&mut self, config: DialogueConfig) -> Result<Uuid, AppError> {
        if self.is_running() {
            return Err(AppError::already_running("A dialogue"));
        }
        let config = config.validated()?;
        let names = DialogueNames::new(
            self.catalog.display_name(&config.model_a),
            self.catalog.display_name(&config.model_b),
        );

        let run_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.snapshots.send_replace(DialogueSnapshot {
            run_id: Some(run_id),
            status: DialogueStatus::Running,
            max_turns: config.max_turns,
            ..DialogueSnapshot::default()
        });
        info!(
            %run_id,
            model_a = %config.model_a,
            model_b = %config.model_b,
            max_turns = config.max_turns,
            "Starting dialogue"
        );

        let run = DialogueRun {
            transport: Arc::clone(&self.transport),
            config,
            names,
            pacing: self.pacing,
            cancel: cancel.clone(),
            snapshots: Arc::clone(&self.snapshots),
        };
        let task = tokio::spawn(run_dialogue(run));
        self.active = Some(ActiveRun { run_id, cancel, task });
        Ok(run_id)
    }

    /// Requests cancellation; the run ends as `stopped` at its next
    /// suspension point, keeping every turn already recorded.
    pub fn stop(&self) {
        if let Some(active) = &self.active {
            debug!(run_id = %active.run_id, "Stopping dialogue");
            active.cancel.cancel();
        }
    }

    /// Waits for the current run to finish and returns its final status.
    pub async fn wait(&mut self) -> Option<DialogueStatus> {
        let active = self.active.take()?;
        match active.task.await {
            Ok(status) => Some(status),
            Err(e) => {
                error!(run_id = %active.run_id, "Dialogue task failed: {e}");
                self.snapshots.send_modify(|s| {
                    s.status = DialogueStatus::Errored;
                    s.current_speaker = None;
                    s.streaming_text.clear();
                });
                Some(DialogueStatus::Errored)
            }
        }
    }

    /// Drops the finished transcript and returns to `idle`.
    pub fn clear(&mut self) -> Result<(), AppError> {
        if self.is_running() {
            return Err(AppError::already_running("A dialogue"));
        }
        self.active = None;
        self.snapshots.send_replace(DialogueSnapshot::default());
        Ok(())
    }

    pub fn export_transcript(&self) -> String {
        render_transcript(&self.snapshots.borrow().transcript, &self.catalog)
    }
}

/// Plain-text rendering of a transcript for copying.
pub fn render_transcript(transcript: &[DialogueTurnRecord], catalog: &ModelCatalog) -> String {
    transcript
        .iter()
        .map(|record| {
            let model = record.model_id.as_deref().unwrap_or_default();
            let header = match record.speaker {
                Speaker::User => "[Initial Prompt]".to_string(),
                Speaker::A => format!("[Model A: {}]", catalog.display_name(model)),
                Speaker::B => format!("[Model B: {}]", catalog.display_name(model)),
                Speaker::SystemError => "[Error]".to_string(),
            };
            format!("{header}\n{}", record.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

struct DialogueRun<T: ChatTransport> {
    transport: Arc<T>,
    config: DialogueConfig,
    names: DialogueNames,
    pacing: Duration,
    cancel: CancellationToken,
    snapshots: Arc<watch::Sender<DialogueSnapshot>>,
}

async fn run_dialogue<T: ChatTransport>(run: DialogueRun<T>) -> DialogueStatus {
    let mut transcript = vec![DialogueTurnRecord::seed(run.config.initial_prompt.clone())];
    let seeded = transcript.clone();
    run.snapshots.send_modify(|s| s.transcript = seeded);

    let status = run_turns(&run, &mut transcript).await;

    run.snapshots.send_modify(|s| {
        s.status = status;
        s.current_speaker = None;
        s.streaming_text.clear();
        s.transcript = transcript;
    });
    info!(?status, "Dialogue finished");
    status
}

async fn run_turns<T: ChatTransport>(
    run: &DialogueRun<T>,
    transcript: &mut Vec<DialogueTurnRecord>,
) -> DialogueStatus {
    let max_turns = run.config.max_turns;

    for turn in 0..max_turns {
        if run.cancel.is_cancelled() {
            return DialogueStatus::Stopped;
        }

        let speaker = DialogueSlot::for_turn(turn);
        let model = run.config.model_for(speaker);
        let messages = build_turn_messages(transcript, speaker, &run.names);

        run.snapshots.send_modify(|s| {
            s.current_turn = turn + 1;
            s.current_speaker = Some(speaker);
            s.streaming_text.clear();
        });
        debug!(turn = turn + 1, ?speaker, model, messages = messages.len(), "Dialogue turn");

        let request = ChatRequest::new(model, messages);
        let outcome = stream_response(run.transport.as_ref(), request, &run.cancel, |event| {
            if let StreamEvent::Delta(fragment) = event {
                run.snapshots.send_modify(|s| s.streaming_text.push_str(&fragment));
            }
        })
        .await;

        match outcome {
            StreamOutcome::Cancelled => return DialogueStatus::Stopped,
            StreamOutcome::Failed(message) => {
                warn!(turn = turn + 1, model, "Dialogue turn failed: {message}");
                transcript.push(DialogueTurnRecord::error(turn + 1, &message));
                return DialogueStatus::Errored;
            }
            StreamOutcome::Completed(text) => {
                if run.cancel.is_cancelled() {
                    return DialogueStatus::Stopped;
                }
                transcript.push(DialogueTurnRecord::turn(turn + 1, speaker, model, text));
                let recorded = transcript.clone();
                run.snapshots.send_modify(|s| {
                    s.transcript = recorded;
                    s.streaming_text.clear();
                });
            }
        }

        if turn + 1 < max_turns {
            tokio::select! {
                biased;
                _ = run.cancel.cancelled() => return DialogueStatus::Stopped,
                _ = tokio::time::sleep(run.pacing) => {}
            }
        }
    }

    DialogueStatus::Completed
}
