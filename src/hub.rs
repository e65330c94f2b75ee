//! Registry handing out one shared [`BoardModel`] per board.
//!
//! The first caller for an unloaded board claims its slot and loads it
//! outside the registry lock; callers arriving meanwhile wait for that
//! load instead of starting their own. A failed or abandoned load frees
//! the slot so a later call can try again.

use crate::{
    config::HubConfig,
    context::RequestContext,
    domain::BoardId,
    error::{BoardError, Result},
    model::BoardModel,
    storage::Repository,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

#[derive(Clone)]
enum LoadState {
    Pending,
    Ready(Arc<BoardModel>),
    Failed(Arc<BoardError>),
}

enum Slot {
    Ready(Arc<BoardModel>),
    Loading(watch::Receiver<LoadState>),
}

enum Claim {
    Load(watch::Sender<LoadState>),
    Wait(watch::Receiver<LoadState>),
}

pub struct Hub {
    repo: Arc<dyn Repository>,
    config: Arc<HubConfig>,
    slots: Mutex<HashMap<BoardId, Slot>>,
}

impl Hub {
    pub fn new(repo: Arc<dyn Repository>, config: HubConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repo,
            config: Arc::new(config),
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_defaults(repo: Arc<dyn Repository>) -> Self {
        Self {
            repo,
            config: Arc::new(HubConfig::default()),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Returns the live model for a board, loading it on first access.
    ///
    /// Every caller for the same board id gets the same `Arc`.
    pub async fn get_board(&self, ctx: &RequestContext, board_id: &BoardId) -> Result<Arc<BoardModel>> {
        board_id.ensure_present()?;

        loop {
            let claim = {
                let mut slots = self.lock_slots();
                match slots.get(board_id) {
                    Some(Slot::Ready(model)) => return Ok(Arc::clone(model)),
                    Some(Slot::Loading(rx)) => Claim::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(LoadState::Pending);
                        slots.insert(board_id.clone(), Slot::Loading(rx));
                        Claim::Load(tx)
                    }
                }
            };

            let mut rx = match claim {
                Claim::Load(tx) => return self.load(ctx, board_id, tx).await,
                Claim::Wait(rx) => rx,
            };

            debug!(board = %board_id, "waiting for in-flight load");
            let deadline = ctx.effective_deadline(self.config.load_timeout());
            let settled = tokio::time::timeout_at(
                deadline,
                rx.wait_for(|state| !matches!(state, LoadState::Pending)),
            )
            .await
            .map_err(|_| BoardError::Timeout {
                operation: "get_board",
            })?
            .map(|state| state.clone());

            match settled {
                Ok(LoadState::Ready(model)) => return Ok(model),
                Ok(LoadState::Failed(source)) => {
                    return Err(BoardError::LoadFailed {
                        board_id: board_id.to_string(),
                        source,
                    })
                }
                // loader went away without publishing; claim the slot ourselves
                Ok(LoadState::Pending) | Err(_) => continue,
            }
        }
    }

    async fn load(
        &self,
        ctx: &RequestContext,
        board_id: &BoardId,
        tx: watch::Sender<LoadState>,
    ) -> Result<Arc<BoardModel>> {
        let mut claim = LoadingSlot {
            hub: self,
            board_id: board_id.clone(),
            tx: Some(tx),
        };

        debug!(board = %board_id, "loading board");
        let loaded =
            BoardModel::load(ctx, board_id, Arc::clone(&self.repo), Arc::clone(&self.config))
                .await;

        match loaded {
            Ok(model) => {
                let model = Arc::new(model);
                claim.publish(Arc::clone(&model));
                info!(board = %board_id, "board published");
                Ok(model)
            }
            Err(err) => {
                claim.fail(shareable(&err));
                Err(err)
            }
        }
    }

    /// Drops a loaded board from the registry.
    ///
    /// Sessions still holding the model keep working on it; the next
    /// `get_board` loads a fresh one. In-flight loads are not affected.
    pub fn evict(&self, board_id: &BoardId) -> bool {
        let mut slots = self.lock_slots();
        let evicted = matches!(slots.get(board_id), Some(Slot::Ready(_)));
        if evicted {
            slots.remove(board_id);
            info!(board = %board_id, "board evicted");
        }
        evicted
    }

    /// Evicts every loaded board that no session currently holds.
    pub fn evict_unused(&self) -> usize {
        let mut slots = self.lock_slots();
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::Ready(model) => Arc::strong_count(model) > 1,
            Slot::Loading(_) => true,
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            info!(evicted, "evicted unused boards");
        }
        evicted
    }

    /// Ids of fully loaded boards
    pub fn loaded_boards(&self) -> Vec<BoardId> {
        let slots = self.lock_slots();
        let mut ids: Vec<BoardId> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_loaded(&self, board_id: &BoardId) -> bool {
        matches!(self.lock_slots().get(board_id), Some(Slot::Ready(_)))
    }

    /// Number of registry entries, including loads in flight
    pub fn len(&self) -> usize {
        self.lock_slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_slots().is_empty()
    }

    // the map stays consistent even if a holder panicked, so poisoning is ignored
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<BoardId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A claimed registry slot. Dropping it unpublished frees the slot and
/// wakes waiters, so a cancelled load cannot wedge its board.
struct LoadingSlot<'a> {
    hub: &'a Hub,
    board_id: BoardId,
    tx: Option<watch::Sender<LoadState>>,
}

impl LoadingSlot<'_> {
    fn publish(&mut self, model: Arc<BoardModel>) {
        if let Some(tx) = self.tx.take() {
            self.hub
                .lock_slots()
                .insert(self.board_id.clone(), Slot::Ready(Arc::clone(&model)));
            tx.send_replace(LoadState::Ready(model));
        }
    }

    fn fail(&mut self, err: Arc<BoardError>) {
        if let Some(tx) = self.tx.take() {
            self.release();
            tx.send_replace(LoadState::Failed(err));
        }
    }

    fn release(&self) {
        let mut slots = self.hub.lock_slots();
        if matches!(slots.get(&self.board_id), Some(Slot::Loading(_))) {
            slots.remove(&self.board_id);
        }
    }
}

impl Drop for LoadingSlot<'_> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            debug!(board = %self.board_id, "load abandoned; releasing slot");
            self.release();
            drop(tx);
        }
    }
}

/// Copy of a load error that can be handed to every waiter.
fn shareable(err: &BoardError) -> Arc<BoardError> {
    let copy = match err {
        BoardError::BoardNotFound(id) => BoardError::BoardNotFound(id.clone()),
        BoardError::ColumnNotFound(id) => BoardError::ColumnNotFound(id.clone()),
        BoardError::CardNotFound(id) => BoardError::CardNotFound(id.clone()),
        BoardError::InvalidInput { field, message } => BoardError::InvalidInput {
            field: *field,
            message: message.clone(),
        },
        BoardError::Persistence { operation, message } => BoardError::Persistence {
            operation: *operation,
            message: message.clone(),
        },
        BoardError::Timeout { operation } => BoardError::Timeout {
            operation: *operation,
        },
        BoardError::LoadFailed { source, .. } => return Arc::clone(source),
        BoardError::Config(message) => BoardError::Config(message.clone()),
        other @ (BoardError::Io(_) | BoardError::Serialization(_)) => {
            BoardError::persistence("load_board", other)
        }
    };
    Arc::new(copy)
}
