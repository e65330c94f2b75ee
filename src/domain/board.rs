use crate::domain::ids::{BoardId, ColumnId};
use serde::{Deserialize, Serialize};

/// Root aggregate; one live model exists per board at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub title: String,
    pub owner_id: String,
}

impl Board {
    pub fn new(id: impl Into<BoardId>, title: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// A board column; `position` orders columns within their board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub board_id: BoardId,
    pub title: String,
    pub position: usize,
}

impl Column {
    pub fn new(board_id: BoardId, title: String, position: usize) -> Self {
        Self {
            id: ColumnId::generate(),
            board_id,
            title,
            position,
        }
    }

    /// Builder-style override of the generated id
    pub fn with_id(mut self, id: impl Into<ColumnId>) -> Self {
        self.id = id.into();
        self
    }
}
