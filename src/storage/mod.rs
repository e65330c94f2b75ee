use crate::{
    domain::{Board, BoardId, Card, CardId, Column, ColumnId},
    error::{BoardError, Result},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "file-storage")]
pub mod file_storage;
pub mod memory;

#[cfg(feature = "sqlite-storage")]
pub mod sqlite_storage;

#[cfg(feature = "file-storage")]
pub use file_storage::FileRepository;
pub use memory::MemoryRepository;
#[cfg(feature = "sqlite-storage")]
pub use sqlite_storage::SqliteRepository;

/// New column assignment and position for one card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPlacement {
    pub card_id: CardId,
    pub column_id: ColumnId,
    pub position: usize,
}

/// New position for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPlacement {
    pub column_id: ColumnId,
    pub position: usize,
}

/// Persistence gateway for boards, columns and cards.
///
/// Every call is atomic on its own; batched position updates are applied
/// all-or-nothing. Deletes of rows that no longer exist succeed.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Stores a new board (used for seeding)
    async fn create_board(&self, board: &Board) -> Result<()>;

    /// Loads a board, failing with `BoardNotFound` if absent
    async fn get_board(&self, id: &BoardId) -> Result<Board>;

    async fn get_columns(&self, board_id: &BoardId) -> Result<Vec<Column>>;

    /// Loads every card on the board, across all columns
    async fn get_cards(&self, board_id: &BoardId) -> Result<Vec<Card>>;

    async fn create_column(&self, column: &Column) -> Result<()>;

    async fn rename_column(&self, board_id: &BoardId, id: &ColumnId, title: &str) -> Result<()>;

    /// Deletes a column and every card in it
    async fn delete_column(&self, board_id: &BoardId, id: &ColumnId) -> Result<()>;

    async fn update_column_positions(
        &self,
        board_id: &BoardId,
        placements: &[ColumnPlacement],
    ) -> Result<()>;

    async fn create_card(&self, board_id: &BoardId, card: &Card) -> Result<()>;

    /// Overwrites the editable fields of an existing card
    async fn update_card(&self, board_id: &BoardId, card: &Card) -> Result<()>;

    async fn delete_card(&self, board_id: &BoardId, id: &CardId) -> Result<()>;

    /// Moves and renumbers cards in one batch
    async fn update_card_positions(
        &self,
        board_id: &BoardId,
        placements: &[CardPlacement],
    ) -> Result<()>;
}

/// Everything stored for one board; the unit the document backends read and write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDocument {
    pub board: Board,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl BoardDocument {
    pub fn new(board: Board) -> Self {
        Self {
            board,
            columns: Vec::new(),
            cards: Vec::new(),
        }
    }

    fn has_column(&self, id: &ColumnId) -> bool {
        self.columns.iter().any(|c| &c.id == id)
    }

    pub fn insert_column(&mut self, column: &Column) -> Result<()> {
        if self.has_column(&column.id) {
            return Err(BoardError::persistence(
                "create_column",
                format!("column {} already exists", column.id),
            ));
        }
        self.columns.push(column.clone());
        Ok(())
    }

    pub fn rename_column(&mut self, id: &ColumnId, title: &str) -> Result<()> {
        let column = self
            .columns
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| BoardError::ColumnNotFound(id.to_string()))?;
        column.title = title.to_string();
        Ok(())
    }

    pub fn remove_column(&mut self, id: &ColumnId) {
        self.columns.retain(|c| &c.id != id);
        self.cards.retain(|c| &c.column_id != id);
    }

    pub fn place_columns(&mut self, placements: &[ColumnPlacement]) -> Result<()> {
        if let Some(missing) = placements.iter().find(|p| !self.has_column(&p.column_id)) {
            return Err(BoardError::ColumnNotFound(missing.column_id.to_string()));
        }
        for placement in placements {
            if let Some(column) = self.columns.iter_mut().find(|c| c.id == placement.column_id) {
                column.position = placement.position;
            }
        }
        Ok(())
    }

    pub fn insert_card(&mut self, card: &Card) -> Result<()> {
        if !self.has_column(&card.column_id) {
            return Err(BoardError::ColumnNotFound(card.column_id.to_string()));
        }
        if self.cards.iter().any(|c| c.id == card.id) {
            return Err(BoardError::persistence(
                "create_card",
                format!("card {} already exists", card.id),
            ));
        }
        self.cards.push(card.clone());
        Ok(())
    }

    pub fn replace_card(&mut self, card: &Card) -> Result<()> {
        let stored = self
            .cards
            .iter_mut()
            .find(|c| c.id == card.id)
            .ok_or_else(|| BoardError::CardNotFound(card.id.to_string()))?;
        *stored = card.clone();
        Ok(())
    }

    pub fn remove_card(&mut self, id: &CardId) {
        self.cards.retain(|c| &c.id != id);
    }

    pub fn place_cards(&mut self, placements: &[CardPlacement]) -> Result<()> {
        for placement in placements {
            if !self.has_column(&placement.column_id) {
                return Err(BoardError::ColumnNotFound(placement.column_id.to_string()));
            }
            if !self.cards.iter().any(|c| c.id == placement.card_id) {
                return Err(BoardError::CardNotFound(placement.card_id.to_string()));
            }
        }
        for placement in placements {
            if let Some(card) = self.cards.iter_mut().find(|c| c.id == placement.card_id) {
                card.column_id = placement.column_id.clone();
                card.position = placement.position;
            }
        }
        Ok(())
    }
}
