//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use hlavi_hub::{
    storage::BoardDocument, Board, BoardError, BoardId, Card, CardId, CardPlacement, Column,
    ColumnId, ColumnPlacement, MemoryRepository, Repository, Result,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a [`MemoryRepository`] with switchable delays and failures
#[derive(Default)]
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    /// Writes return an error without touching the store
    pub fail_writes: AtomicBool,
    /// Writes reach the store but still report an error
    pub fail_after_write: AtomicBool,
    pub load_delay_ms: AtomicU64,
    pub write_delay_ms: AtomicU64,
}

impl FlakyRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn set_fail_after_write(&self, on: bool) {
        self.fail_after_write.store(on, Ordering::SeqCst);
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.load_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn before_write(&self, operation: &'static str) -> Result<()> {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BoardError::persistence(operation, "injected failure"));
        }
        Ok(())
    }

    fn after_write(&self, operation: &'static str, result: Result<()>) -> Result<()> {
        result?;
        if self.fail_after_write.load(Ordering::SeqCst) {
            return Err(BoardError::persistence(operation, "injected failure after write"));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn create_board(&self, board: &Board) -> Result<()> {
        self.inner.create_board(board).await
    }

    async fn get_board(&self, id: &BoardId) -> Result<Board> {
        let delay = self.load_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.get_board(id).await
    }

    async fn get_columns(&self, board_id: &BoardId) -> Result<Vec<Column>> {
        self.inner.get_columns(board_id).await
    }

    async fn get_cards(&self, board_id: &BoardId) -> Result<Vec<Card>> {
        self.inner.get_cards(board_id).await
    }

    async fn create_column(&self, column: &Column) -> Result<()> {
        self.before_write("create_column").await?;
        let result = self.inner.create_column(column).await;
        self.after_write("create_column", result)
    }

    async fn rename_column(&self, board_id: &BoardId, id: &ColumnId, title: &str) -> Result<()> {
        self.before_write("rename_column").await?;
        let result = self.inner.rename_column(board_id, id, title).await;
        self.after_write("rename_column", result)
    }

    async fn delete_column(&self, board_id: &BoardId, id: &ColumnId) -> Result<()> {
        self.before_write("delete_column").await?;
        let result = self.inner.delete_column(board_id, id).await;
        self.after_write("delete_column", result)
    }

    async fn update_column_positions(
        &self,
        board_id: &BoardId,
        placements: &[ColumnPlacement],
    ) -> Result<()> {
        self.before_write("update_column_positions").await?;
        let result = self.inner.update_column_positions(board_id, placements).await;
        self.after_write("update_column_positions", result)
    }

    async fn create_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        self.before_write("create_card").await?;
        let result = self.inner.create_card(board_id, card).await;
        self.after_write("create_card", result)
    }

    async fn update_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        self.before_write("update_card").await?;
        let result = self.inner.update_card(board_id, card).await;
        self.after_write("update_card", result)
    }

    async fn delete_card(&self, board_id: &BoardId, id: &CardId) -> Result<()> {
        self.before_write("delete_card").await?;
        let result = self.inner.delete_card(board_id, id).await;
        self.after_write("delete_card", result)
    }

    async fn update_card_positions(
        &self,
        board_id: &BoardId,
        placements: &[CardPlacement],
    ) -> Result<()> {
        self.before_write("update_card_positions").await?;
        let result = self.inner.update_card_positions(board_id, placements).await;
        self.after_write("update_card_positions", result)
    }
}

/// Board `id` with `Todo = [card1, card2]` and an empty `Doing`
pub fn kanban_document(id: &str) -> BoardDocument {
    let board_id = BoardId::new(id);
    let todo = ColumnId::new("todo");
    let mut doc = BoardDocument::new(Board::new(id, "Team board", "owner"));
    doc.columns = vec![
        Column::new(board_id.clone(), "Todo".into(), 0).with_id("todo"),
        Column::new(board_id, "Doing".into(), 1).with_id("doing"),
    ];
    doc.cards = vec![
        Card::new(todo.clone(), "card1".into(), 0).with_id("card1"),
        Card::new(todo, "card2".into(), 1).with_id("card2"),
    ];
    doc
}

/// Panics unless every card appears once and every list is numbered 0..n
pub fn assert_board_invariants(columns: &[Column], cards: &hlavi_hub::CardMap) {
    let mut seen = std::collections::HashSet::new();
    for (column_id, list) in cards {
        assert!(
            columns.iter().any(|c| &c.id == column_id),
            "card list for unknown column {}",
            column_id
        );
        for (index, card) in list.iter().enumerate() {
            assert!(seen.insert(card.id.clone()), "card {} appears twice", card.id);
            assert_eq!(card.position, index, "card {} out of order", card.id);
            assert_eq!(&card.column_id, column_id);
        }
    }
    for (index, column) in columns.iter().enumerate() {
        assert_eq!(column.position, index);
    }
}
