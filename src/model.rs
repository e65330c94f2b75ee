//! Live, shared state of one board.
//!
//! A [`BoardModel`] owns two reactive containers, the ordered columns and
//! the per-column card lists, and is the only writer of either. Mutations
//! are serialised by a per-board gate and follow one policy: compute the
//! next state on a copy, persist it, and publish only once the repository
//! accepted it. When a write fails (or a previous mutation was interrupted
//! mid-write) the model resyncs from the repository before going on.

use crate::{
    config::HubConfig,
    context::RequestContext,
    domain::{
        clamp_index, reindex, sort_by_position, Board, BoardId, Card, CardId, CardPatch, Column,
        ColumnId,
    },
    error::{BoardError, Result},
    event::DragEvent,
    reactive::{Reactive, Subscription},
    storage::{CardPlacement, ColumnPlacement, Repository},
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Cards of a board keyed by the column that holds them, each list in display order
pub type CardMap = HashMap<ColumnId, Vec<Card>>;

/// Result of a mutation that tolerates stale or duplicate requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Nothing to do: the target was already gone, or already in place
    Unchanged,
}

/// A session's view onto a board
pub struct BoardSubscription {
    pub columns: Subscription<Vec<Column>>,
    pub cards: Subscription<CardMap>,
}

pub struct BoardModel {
    board: Board,
    repo: Arc<dyn Repository>,
    config: Arc<HubConfig>,
    columns: Reactive<Vec<Column>>,
    cards: Reactive<CardMap>,
    write_gate: Mutex<()>,
    // set while a repository write is outstanding; still set on entry means
    // the previous mutation was cancelled and the store may be ahead of us
    unsettled: AtomicBool,
}

/// Columns and cards as read from the repository, normalised to list order
struct Loaded {
    columns: Vec<Column>,
    cards: CardMap,
    column_fixes: Vec<ColumnPlacement>,
    card_fixes: Vec<CardPlacement>,
}

impl BoardModel {
    /// Loads a board from the repository and builds its live model.
    ///
    /// Stored positions are normalised to 0..n per list and corrected rows
    /// are written back; cards whose column no longer exists are dropped.
    pub async fn load(
        ctx: &RequestContext,
        board_id: &BoardId,
        repo: Arc<dyn Repository>,
        config: Arc<HubConfig>,
    ) -> Result<Self> {
        board_id.ensure_present()?;
        let limit = config.load_timeout();
        let ctx = ctx.clone().with_timeout(limit);

        let board = ctx.run("get_board", limit, repo.get_board(board_id)).await?;
        let loaded = fetch(&ctx, repo.as_ref(), board_id, limit).await?;
        write_back(&ctx, repo.as_ref(), board_id, &loaded, limit).await;

        debug!(
            board = %board_id,
            columns = loaded.columns.len(),
            cards = loaded.cards.values().map(Vec::len).sum::<usize>(),
            "board loaded"
        );

        Ok(Self {
            board,
            repo,
            config,
            columns: Reactive::new(loaded.columns),
            cards: Reactive::new(loaded.cards),
            write_gate: Mutex::new(()),
            unsettled: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &BoardId {
        &self.board.id
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Current columns in display order
    pub fn columns(&self) -> Arc<Vec<Column>> {
        self.columns.get()
    }

    /// Current card lists
    pub fn cards(&self) -> Arc<CardMap> {
        self.cards.get()
    }

    pub fn column(&self, id: &ColumnId) -> Option<Column> {
        self.columns.get().iter().find(|c| &c.id == id).cloned()
    }

    /// Cards of one column in display order; empty if the column is unknown
    pub fn cards_in(&self, column_id: &ColumnId) -> Vec<Card> {
        self.cards.get().get(column_id).cloned().unwrap_or_default()
    }

    pub fn card(&self, id: &CardId) -> Option<Card> {
        self.cards
            .get()
            .values()
            .flat_map(|list| list.iter())
            .find(|c| &c.id == id)
            .cloned()
    }

    pub fn subscribe(&self) -> BoardSubscription {
        BoardSubscription {
            columns: self.columns.subscribe(),
            cards: self.cards.subscribe(),
        }
    }

    /// Number of live subscriptions on this board
    pub fn viewer_count(&self) -> usize {
        self.cards.subscriber_count()
    }

    /// Appends a column at the end of the board.
    ///
    /// A blank title becomes the configured default column title. A title
    /// longer than `max_title_len` is rejected with `InvalidInput`.
    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn add_column(&self, ctx: &RequestContext, title: &str) -> Result<Column> {
        let title =
            self.config
                .resolve_title("title", title, &self.config.default_column_title)?;
        let _gate = self.begin().await;

        let current = self.columns.get();
        let column = Column::new(self.board.id.clone(), title, current.len());
        self.persist(ctx, "create_column", self.repo.create_column(&column))
            .await?;

        let mut columns = current.as_ref().clone();
        columns.push(column.clone());
        // columns first, so every card list key always has a column
        self.columns.set(columns);
        let id = column.id.clone();
        self.cards.update(move |cards| {
            let mut next = cards.clone();
            next.insert(id, Vec::new());
            next
        });
        self.settle();
        Ok(column)
    }

    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn rename_column(
        &self,
        ctx: &RequestContext,
        column_id: &ColumnId,
        title: &str,
    ) -> Result<Column> {
        column_id.ensure_present()?;
        if title.trim().is_empty() {
            return Err(BoardError::invalid("title", "must not be blank"));
        }
        let title = self.config.resolve_title("title", title, "")?;
        let _gate = self.begin().await;

        let current = self.columns.get();
        let index = current
            .iter()
            .position(|c| &c.id == column_id)
            .ok_or_else(|| BoardError::ColumnNotFound(column_id.to_string()))?;
        if current[index].title == title {
            return Ok(current[index].clone());
        }

        self.persist(
            ctx,
            "rename_column",
            self.repo.rename_column(&self.board.id, column_id, &title),
        )
        .await?;

        let mut columns = current.as_ref().clone();
        columns[index].title = title;
        let renamed = columns[index].clone();
        self.columns.set(columns);
        self.settle();
        Ok(renamed)
    }

    /// Removes a column and all of its cards; an unknown column is a no-op.
    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn delete_column(&self, ctx: &RequestContext, column_id: &ColumnId) -> Result<Outcome> {
        column_id.ensure_present()?;
        let _gate = self.begin().await;

        let current = self.columns.get();
        if !current.iter().any(|c| &c.id == column_id) {
            debug!(column = %column_id, "column already gone");
            return Ok(Outcome::Unchanged);
        }

        self.persist(
            ctx,
            "delete_column",
            self.repo.delete_column(&self.board.id, column_id),
        )
        .await?;

        let mut columns: Vec<Column> = current
            .iter()
            .filter(|c| &c.id != column_id)
            .cloned()
            .collect();
        let fixes = column_placements(&mut columns);
        if !fixes.is_empty() {
            self.persist(
                ctx,
                "update_column_positions",
                self.repo.update_column_positions(&self.board.id, &fixes),
            )
            .await?;
        }

        // cards first, so no list key outlives its column
        let removed = column_id.clone();
        self.cards.update(move |cards| {
            let mut next = cards.clone();
            next.remove(&removed);
            next
        });
        self.columns.set(columns);
        self.settle();
        Ok(Outcome::Applied)
    }

    /// Appends a card to the end of a column.
    ///
    /// A blank title becomes the configured default card title.
    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn add_card(
        &self,
        ctx: &RequestContext,
        column_id: &ColumnId,
        title: &str,
    ) -> Result<Card> {
        column_id.ensure_present()?;
        let title = self
            .config
            .resolve_title("title", title, &self.config.default_card_title)?;
        let _gate = self.begin().await;

        if !self.has_column(column_id) {
            return Err(BoardError::ColumnNotFound(column_id.to_string()));
        }

        let cards = self.cards.get();
        let position = cards.get(column_id).map_or(0, Vec::len);
        let card = Card::new(column_id.clone(), title, position);
        self.persist(
            ctx,
            "create_card",
            self.repo.create_card(&self.board.id, &card),
        )
        .await?;

        let mut next = cards.as_ref().clone();
        next.entry(column_id.clone()).or_default().push(card.clone());
        self.cards.set(next);
        self.settle();
        Ok(card)
    }

    /// Edits a card's title, content, labels, cover colour or due date.
    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn update_card(
        &self,
        ctx: &RequestContext,
        card_id: &CardId,
        patch: &CardPatch,
    ) -> Result<Card> {
        card_id.ensure_present()?;
        patch.validate()?;
        let mut patch = patch.clone();
        if let Some(title) = patch.title.take() {
            if title.trim().is_empty() {
                return Err(BoardError::invalid("title", "must not be blank"));
            }
            patch.title = Some(self.config.resolve_title("title", &title, "")?);
        }
        let _gate = self.begin().await;

        let cards = self.cards.get();
        let (column_id, index) = locate(&cards, card_id)
            .ok_or_else(|| BoardError::CardNotFound(card_id.to_string()))?;
        let mut card = cards[&column_id][index].clone();
        if !card.apply(&patch) {
            return Ok(card);
        }

        self.persist(
            ctx,
            "update_card",
            self.repo.update_card(&self.board.id, &card),
        )
        .await?;

        let mut next = cards.as_ref().clone();
        if let Some(list) = next.get_mut(&column_id) {
            list[index] = card.clone();
        }
        self.cards.set(next);
        self.settle();
        Ok(card)
    }

    /// Removes a card from a column; a card that is not there is a no-op.
    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn delete_card(
        &self,
        ctx: &RequestContext,
        card_id: &CardId,
        column_id: &ColumnId,
    ) -> Result<Outcome> {
        card_id.ensure_present()?;
        column_id.ensure_present()?;
        let _gate = self.begin().await;

        let cards = self.cards.get();
        let Some(list) = cards.get(column_id) else {
            debug!(column = %column_id, "column already gone");
            return Ok(Outcome::Unchanged);
        };
        let Some(index) = list.iter().position(|c| &c.id == card_id) else {
            debug!(card = %card_id, column = %column_id, "card already gone");
            return Ok(Outcome::Unchanged);
        };

        let mut remaining = list.clone();
        remaining.remove(index);
        reindex(&mut remaining);
        let fixes = placements_since(&[list.as_slice()], &[remaining.as_slice()]);

        self.persist(
            ctx,
            "delete_card",
            self.repo.delete_card(&self.board.id, card_id),
        )
        .await?;
        if !fixes.is_empty() {
            self.persist(
                ctx,
                "update_card_positions",
                self.repo.update_card_positions(&self.board.id, &fixes),
            )
            .await?;
        }

        let mut next = cards.as_ref().clone();
        next.insert(column_id.clone(), remaining);
        self.cards.set(next);
        self.settle();
        Ok(Outcome::Applied)
    }

    /// Moves a card to `to_index` in `to`, renumbering both lists.
    ///
    /// A card no longer in `from` (already moved or deleted by a racing
    /// event) makes this a no-op, which also makes a repeated move
    /// idempotent. `to_index` is clamped into the destination list.
    #[tracing::instrument(skip(self, ctx), fields(board = %self.board.id, actor = %ctx.actor()))]
    pub async fn move_card(
        &self,
        ctx: &RequestContext,
        card_id: &CardId,
        from: &ColumnId,
        to: &ColumnId,
        to_index: i64,
    ) -> Result<Outcome> {
        card_id.ensure_present()?;
        from.ensure_present()?;
        to.ensure_present()?;
        let _gate = self.begin().await;

        let cards = self.cards.get();
        let Some(source) = cards.get(from) else {
            debug!(column = %from, "source column gone");
            return Ok(Outcome::Unchanged);
        };
        let Some(from_index) = source.iter().position(|c| &c.id == card_id) else {
            debug!(card = %card_id, column = %from, "card not in source column");
            return Ok(Outcome::Unchanged);
        };
        let Some(destination) = cards.get(to) else {
            debug!(column = %to, "destination column gone");
            return Ok(Outcome::Unchanged);
        };

        let mut next = cards.as_ref().clone();
        let mut next_source = source.clone();
        let mut card = next_source.remove(from_index);

        let placements = if from == to {
            let index = clamp_index(to_index, next_source.len());
            if index == from_index {
                return Ok(Outcome::Unchanged);
            }
            next_source.insert(index, card);
            reindex(&mut next_source);
            let placements = placements_since(&[source.as_slice()], &[next_source.as_slice()]);
            next.insert(from.clone(), next_source);
            placements
        } else {
            let mut next_destination = destination.clone();
            let index = clamp_index(to_index, next_destination.len());
            card.column_id = to.clone();
            next_destination.insert(index, card);
            reindex(&mut next_source);
            reindex(&mut next_destination);
            let placements = placements_since(
                &[source.as_slice(), destination.as_slice()],
                &[next_source.as_slice(), next_destination.as_slice()],
            );
            next.insert(from.clone(), next_source);
            next.insert(to.clone(), next_destination);
            placements
        };

        self.persist(
            ctx,
            "update_card_positions",
            self.repo.update_card_positions(&self.board.id, &placements),
        )
        .await?;

        // both lists in one update: readers never see the card in neither or both
        self.cards.set(next);
        self.settle();
        debug!(card = %card_id, from = %from, to = %to, rows = placements.len(), "card moved");
        Ok(Outcome::Applied)
    }

    /// Validates a drag event and applies it as a move.
    ///
    /// Malformed events are rejected without touching the board.
    pub async fn apply_drag(&self, ctx: &RequestContext, event: &DragEvent) -> Result<Outcome> {
        let request = event.validate().map_err(|err| {
            debug!(board = %self.board.id, error = %err, "discarding malformed drag event");
            err
        })?;
        self.move_card(
            ctx,
            &request.card_id,
            &request.from,
            &request.to,
            request.to_index,
        )
        .await
    }

    /// Re-reads columns and cards from the repository and publishes them.
    pub async fn reload(&self, ctx: &RequestContext) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let limit = self.config.load_timeout();
        let loaded = fetch(ctx, self.repo.as_ref(), &self.board.id, limit).await?;
        write_back(ctx, self.repo.as_ref(), &self.board.id, &loaded, limit).await;
        self.publish_all(loaded.columns, loaded.cards);
        self.settle();
        Ok(())
    }

    fn has_column(&self, id: &ColumnId) -> bool {
        self.columns.get().iter().any(|c| &c.id == id)
    }

    /// Takes the write gate, first catching up if an earlier write was interrupted.
    async fn begin(&self) -> MutexGuard<'_, ()> {
        let gate = self.write_gate.lock().await;
        if self.unsettled.load(Ordering::SeqCst) {
            debug!(board = %self.board.id, "previous mutation did not finish; resyncing");
            self.resync().await;
        }
        gate
    }

    /// Runs one repository write. On failure the board is resynced and the error returned.
    async fn persist<F>(&self, ctx: &RequestContext, operation: &'static str, call: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.unsettled.store(true, Ordering::SeqCst);
        match ctx
            .run(operation, self.config.persist_timeout(), call)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(
                    board = %self.board.id,
                    operation,
                    error = %err,
                    "persistence failed; mutation not applied"
                );
                self.resync().await;
                Err(err)
            }
        }
    }

    fn settle(&self) {
        self.unsettled.store(false, Ordering::SeqCst);
    }

    /// Replaces in-memory state with the repository's. Caller holds the write gate.
    async fn resync(&self) {
        let ctx = RequestContext::background();
        let limit = self.config.load_timeout();
        match fetch(&ctx, self.repo.as_ref(), &self.board.id, limit).await {
            Ok(loaded) => {
                write_back(&ctx, self.repo.as_ref(), &self.board.id, &loaded, limit).await;
                self.publish_all(loaded.columns, loaded.cards);
                self.settle();
                info!(board = %self.board.id, "resynced from repository");
            }
            Err(err) => {
                warn!(
                    board = %self.board.id,
                    error = %err,
                    "resync failed; keeping last committed state"
                );
            }
        }
    }

    /// Publishes a whole new state without ever exposing a card list
    /// whose column is missing from `columns`.
    fn publish_all(&self, columns: Vec<Column>, cards: CardMap) {
        let kept: HashSet<ColumnId> = self
            .columns
            .get()
            .iter()
            .map(|c| c.id.clone())
            .filter(|id| cards.contains_key(id))
            .collect();
        let interim: CardMap = cards
            .iter()
            .filter(|(id, _)| kept.contains(*id))
            .map(|(id, list)| (id.clone(), list.clone()))
            .collect();

        self.cards.set(interim);
        self.columns.set(columns);
        self.cards.set(cards);
    }
}

impl fmt::Debug for BoardModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardModel")
            .field("board", &self.board)
            .field("columns", &self.columns.get().len())
            .field("viewers", &self.viewer_count())
            .finish()
    }
}

async fn fetch(
    ctx: &RequestContext,
    repo: &dyn Repository,
    board_id: &BoardId,
    limit: Duration,
) -> Result<Loaded> {
    let columns = ctx
        .run("get_columns", limit, repo.get_columns(board_id))
        .await?;
    let cards = ctx.run("get_cards", limit, repo.get_cards(board_id)).await?;
    Ok(assemble(board_id, columns, cards))
}

/// Best effort: a failed write-back leaves the store sparse, which the
/// next load normalises again.
async fn write_back(
    ctx: &RequestContext,
    repo: &dyn Repository,
    board_id: &BoardId,
    loaded: &Loaded,
    limit: Duration,
) {
    if !loaded.column_fixes.is_empty() {
        if let Err(err) = ctx
            .run(
                "update_column_positions",
                limit,
                repo.update_column_positions(board_id, &loaded.column_fixes),
            )
            .await
        {
            warn!(board = %board_id, error = %err, "could not store normalised column positions");
        }
    }
    if !loaded.card_fixes.is_empty() {
        if let Err(err) = ctx
            .run(
                "update_card_positions",
                limit,
                repo.update_card_positions(board_id, &loaded.card_fixes),
            )
            .await
        {
            warn!(board = %board_id, error = %err, "could not store normalised card positions");
        }
    }
}

fn assemble(board_id: &BoardId, mut columns: Vec<Column>, cards: Vec<Card>) -> Loaded {
    sort_by_position(&mut columns);
    let column_fixes = column_placements(&mut columns);

    let mut map: CardMap = columns.iter().map(|c| (c.id.clone(), Vec::new())).collect();
    for card in cards {
        match map.get_mut(&card.column_id) {
            Some(list) => list.push(card),
            None => warn!(
                board = %board_id,
                card = %card.id,
                column = %card.column_id,
                "dropping card whose column does not exist"
            ),
        }
    }

    let mut card_fixes = Vec::new();
    for list in map.values_mut() {
        sort_by_position(list);
        for index in reindex(list) {
            let card = &list[index];
            card_fixes.push(CardPlacement {
                card_id: card.id.clone(),
                column_id: card.column_id.clone(),
                position: index,
            });
        }
    }

    Loaded {
        columns,
        cards: map,
        column_fixes,
        card_fixes,
    }
}

fn column_placements(columns: &mut [Column]) -> Vec<ColumnPlacement> {
    reindex(columns)
        .into_iter()
        .map(|index| ColumnPlacement {
            column_id: columns[index].id.clone(),
            position: index,
        })
        .collect()
}

/// Placements for every card whose column or position differs from `before`.
fn placements_since(before: &[&[Card]], after: &[&[Card]]) -> Vec<CardPlacement> {
    let old: HashMap<&CardId, (&ColumnId, usize)> = before
        .iter()
        .flat_map(|list| list.iter())
        .map(|c| (&c.id, (&c.column_id, c.position)))
        .collect();

    after
        .iter()
        .flat_map(|list| list.iter())
        .filter(|c| old.get(&c.id) != Some(&(&c.column_id, c.position)))
        .map(|c| CardPlacement {
            card_id: c.id.clone(),
            column_id: c.column_id.clone(),
            position: c.position,
        })
        .collect()
}

fn locate(cards: &CardMap, card_id: &CardId) -> Option<(ColumnId, usize)> {
    cards.iter().find_map(|(column_id, list)| {
        list.iter()
            .position(|c| &c.id == card_id)
            .map(|index| (column_id.clone(), index))
    })
}
