use crate::{
    domain::{Board, BoardId, Card, CardId, Column, ColumnId},
    error::{BoardError, Result},
    storage::{BoardDocument, CardPlacement, ColumnPlacement, Repository},
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process repository; used in tests and for boards that need no durability
#[derive(Debug, Default)]
pub struct MemoryRepository {
    boards: RwLock<HashMap<BoardId, BoardDocument>>,
    board_loads: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a full document, replacing any existing board with the same id
    pub async fn insert_document(&self, document: BoardDocument) {
        let mut boards = self.boards.write().await;
        boards.insert(document.board.id.clone(), document);
    }

    /// Returns a copy of what is currently stored for a board
    pub async fn document(&self, id: &BoardId) -> Option<BoardDocument> {
        self.boards.read().await.get(id).cloned()
    }

    /// Number of `get_board` calls served so far
    pub fn board_loads(&self) -> usize {
        self.board_loads.load(Ordering::SeqCst)
    }

    async fn with_document<T>(
        &self,
        board_id: &BoardId,
        f: impl FnOnce(&mut BoardDocument) -> Result<T>,
    ) -> Result<T> {
        let mut boards = self.boards.write().await;
        let document = boards
            .get_mut(board_id)
            .ok_or_else(|| BoardError::BoardNotFound(board_id.to_string()))?;
        f(document)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_board(&self, board: &Board) -> Result<()> {
        let mut boards = self.boards.write().await;
        boards
            .entry(board.id.clone())
            .or_insert_with(|| BoardDocument::new(board.clone()));
        Ok(())
    }

    async fn get_board(&self, id: &BoardId) -> Result<Board> {
        self.board_loads.fetch_add(1, Ordering::SeqCst);
        let boards = self.boards.read().await;
        boards
            .get(id)
            .map(|doc| doc.board.clone())
            .ok_or_else(|| BoardError::BoardNotFound(id.to_string()))
    }

    async fn get_columns(&self, board_id: &BoardId) -> Result<Vec<Column>> {
        let boards = self.boards.read().await;
        boards
            .get(board_id)
            .map(|doc| doc.columns.clone())
            .ok_or_else(|| BoardError::BoardNotFound(board_id.to_string()))
    }

    async fn get_cards(&self, board_id: &BoardId) -> Result<Vec<Card>> {
        let boards = self.boards.read().await;
        boards
            .get(board_id)
            .map(|doc| doc.cards.clone())
            .ok_or_else(|| BoardError::BoardNotFound(board_id.to_string()))
    }

    async fn create_column(&self, column: &Column) -> Result<()> {
        self.with_document(&column.board_id, |doc| doc.insert_column(column))
            .await
    }

    async fn rename_column(&self, board_id: &BoardId, id: &ColumnId, title: &str) -> Result<()> {
        self.with_document(board_id, |doc| doc.rename_column(id, title))
            .await
    }

    async fn delete_column(&self, board_id: &BoardId, id: &ColumnId) -> Result<()> {
        self.with_document(board_id, |doc| {
            doc.remove_column(id);
            Ok(())
        })
        .await
    }

    async fn update_column_positions(
        &self,
        board_id: &BoardId,
        placements: &[ColumnPlacement],
    ) -> Result<()> {
        self.with_document(board_id, |doc| doc.place_columns(placements))
            .await
    }

    async fn create_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        self.with_document(board_id, |doc| doc.insert_card(card)).await
    }

    async fn update_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        self.with_document(board_id, |doc| doc.replace_card(card)).await
    }

    async fn delete_card(&self, board_id: &BoardId, id: &CardId) -> Result<()> {
        self.with_document(board_id, |doc| {
            doc.remove_card(id);
            Ok(())
        })
        .await
    }

    async fn update_card_positions(
        &self,
        board_id: &BoardId,
        placements: &[CardPlacement],
    ) -> Result<()> {
        self.with_document(board_id, |doc| doc.place_cards(placements))
            .await
    }
}
