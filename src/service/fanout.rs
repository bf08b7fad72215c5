use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::ModelCatalog;
use crate::errors::AppError;
use crate::models::{ChatMessage, ChatRequest, PanelId, StreamState, StreamStatus};
use crate::service::synthesis::PanelResult;
use crate::stream::streamer::{stream_response, StreamEvent};
use crate::stream::transport::ChatTransport;

/// Snapshot emitted by a panel task after every change to its state.
#[derive(Debug, Clone)]
pub struct PanelUpdate {
    pub panel: PanelId,
    pub generation: u64,
    pub state: StreamState,
}

#[derive(Debug, Clone)]
struct PanelSlot {
    model_id: String,
    generation: u64,
    state: StreamState,
}

impl PanelSlot {
    fn new(panel: PanelId) -> Self {
        Self { model_id: String::new(), generation: 0, state: StreamState::new(panel) }
    }
}

/// Latest known state of every panel, keyed by panel id.
#[derive(Debug, Clone, Default)]
pub struct PanelBoard {
    panels: BTreeMap<PanelId, PanelSlot>,
}

impl PanelBoard {
    pub fn new(panels: impl IntoIterator<Item = PanelId>) -> Self {
        let panels = panels.into_iter().map(|p| (p, PanelSlot::new(p))).collect();
        Self { panels }
    }

    /// Board with panels numbered `1..=count`.
    pub fn numbered(count: u32) -> Self {
        Self::new((1..=count).map(PanelId))
    }

    pub fn panel_ids(&self) -> impl Iterator<Item = PanelId> + '_ {
        self.panels.keys().copied()
    }

    pub fn state(&self, panel: PanelId) -> Option<&StreamState> {
        self.panels.get(&panel).map(|slot| &slot.state)
    }

    pub fn model_id(&self, panel: PanelId) -> Option<&str> {
        self.panels
            .get(&panel)
            .map(|slot| slot.model_id.as_str())
            .filter(|id| !id.is_empty())
    }

    /// True while any panel is loading or streaming.
    pub fn is_busy(&self) -> bool {
        self.panels.values().any(|slot| slot.state.status.is_in_flight())
    }

    /// Applies a task snapshot. Snapshots from an older generation, or for a
    /// panel that is no longer in flight, are dropped.
    pub fn apply(&mut self, update: PanelUpdate) -> bool {
        match self.panels.get_mut(&update.panel) {
            Some(slot) if slot.generation == update.generation && slot.state.status.is_in_flight() => {
                slot.state = update.state;
                true
            }
            _ => {
                debug!(panel = %update.panel, generation = update.generation, "Dropping stale panel update");
                false
            }
        }
    }

    fn begin(&mut self, panel: PanelId, model_id: &str, generation: u64) {
        let slot = self.panels.entry(panel).or_insert_with(|| PanelSlot::new(panel));
        slot.model_id = model_id.to_string();
        slot.generation = generation;
        slot.state.begin();
    }

    fn reset(&mut self, panel: PanelId) {
        if let Some(slot) = self.panels.get_mut(&panel) {
            slot.state.reset();
        }
    }

    /// Completed, non-error panel texts paired with their model's display name.
    pub fn completed_results(&self, catalog: &ModelCatalog) -> Vec<PanelResult> {
        self.panels
            .values()
            .filter(|slot| slot.state.status == StreamStatus::Done)
            .filter(|slot| !slot.state.accumulated_text.trim().is_empty())
            .map(|slot| PanelResult {
                display_name: catalog.display_name(&slot.model_id).to_string(),
                text: slot.state.accumulated_text.clone(),
            })
            .collect()
    }
}

/// Sends one prompt to every selected panel's model concurrently.
///
/// Each panel runs as its own task that owns its [`StreamState`] and
/// reports snapshots over a channel; the orchestrator folds them into its
/// [`PanelBoard`]. A failing panel never touches its siblings.
pub struct FanOutOrchestrator<T: ChatTransport> {
    transport: Arc<T>,
    board: PanelBoard,
    generation: u64,
    cancels: HashMap<PanelId, CancellationToken>,
    updates_tx: mpsc::UnboundedSender<PanelUpdate>,
    updates_rx: mpsc::UnboundedReceiver<PanelUpdate>,
}

impl<T: ChatTransport> FanOutOrchestrator<T> {
    pub fn new(transport: Arc<T>, board: PanelBoard) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            board,
            generation: 0,
            cancels: HashMap::new(),
            updates_tx,
            updates_rx,
        }
    }

    pub fn board(&self) -> &PanelBoard {
        &self.board
    }

    pub fn is_busy(&self) -> bool {
        self.board.is_busy()
    }

    /// Starts one stream per panel whose selected model id is non-empty and
    /// returns how many were started. Unselected panels keep their state.
    pub fn send(
        &mut self,
        prompt: &str,
        selections: &[(PanelId, String)],
        web_search: bool,
    ) -> Result<usize, AppError> {
        if prompt.trim().is_empty() {
            return Err(AppError::empty_field("prompt"));
        }
        if self.is_busy() {
            return Err(AppError::already_running("A fan-out request"));
        }
        let selected: Vec<(PanelId, &str)> = selections
            .iter()
            .map(|(panel, model)| (*panel, model.trim()))
            .filter(|(_, model)| !model.is_empty())
            .collect();
        if selected.is_empty() {
            return Err(AppError::NoModelSelected);
        }

        self.generation += 1;
        let generation = self.generation;
        info!(panels = selected.len(), generation, web_search, "Fanning out prompt");

        for (panel, model) in &selected {
            if let Some(previous) = self.cancels.remove(panel) {
                previous.cancel();
            }
            let cancel = CancellationToken::new();
            self.cancels.insert(*panel, cancel.clone());
            self.board.begin(*panel, model, generation);

            let request = ChatRequest::new(*model, vec![ChatMessage::user(prompt)])
                .with_web_search(web_search);
            tokio::spawn(run_panel(
                Arc::clone(&self.transport),
                *panel,
                generation,
                request,
                cancel,
                self.updates_tx.clone(),
            ));
        }
        Ok(selected.len())
    }

    /// Aborts one panel's stream and discards its partial output.
    pub fn cancel(&mut self, panel: PanelId) {
        if let Some(cancel) = self.cancels.remove(&panel) {
            debug!(panel = %panel, "Cancelling panel stream");
            cancel.cancel();
        }
        self.board.reset(panel);
    }

    pub fn cancel_all(&mut self) {
        let panels: Vec<PanelId> = self.board.panel_ids().collect();
        for panel in panels {
            if self.board.state(panel).is_some_and(|s| s.status.is_in_flight()) {
                self.cancel(panel);
            }
        }
    }

    /// Waits for the next accepted update and applies it to the board.
    /// Returns `None` once no panel is in flight.
    pub async fn next_update(&mut self) -> Option<PanelUpdate> {
        while self.is_busy() {
            let update = self.updates_rx.recv().await?;
            if self.board.apply(update.clone()) {
                return Some(update);
            }
        }
        None
    }

    /// Applies every update already queued without waiting.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(update) = self.updates_rx.try_recv() {
            if self.board.apply(update) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits until every panel has reached a terminal or idle state.
    pub async fn settle(&mut self) -> &PanelBoard {
        while self.next_update().await.is_some() {}
        &self.board
    }
}

async fn run_panel<T: ChatTransport>(
    transport: Arc<T>,
    panel: PanelId,
    generation: u64,
    request: ChatRequest,
    cancel: CancellationToken,
    updates: mpsc::UnboundedSender<PanelUpdate>,
) {
    let mut state = StreamState::new(panel);
    state.begin();

    let outcome = stream_response(transport.as_ref(), request, &cancel, |event| {
        match event {
            StreamEvent::Started => state.mark_streaming(),
            StreamEvent::Delta(fragment) => state.push_delta(&fragment),
            StreamEvent::Completed(text) => state.complete(text),
            StreamEvent::Failed(message) => state.fail(message),
        }
        // The receiver only goes away with the orchestrator.
        let _ = updates.send(PanelUpdate { panel, generation, state: state.clone() });
    })
    .await;

    debug!(panel = %panel, generation, cancelled = outcome.is_cancelled(), "Panel task finished");
}
