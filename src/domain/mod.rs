pub mod board;
pub mod card;
pub mod ids;
pub mod ordering;

pub use board::{Board, Column};
pub use card::{Card, CardPatch, Label};
pub use ids::{BoardId, CardId, ColumnId};
pub use ordering::{clamp_index, is_contiguous, reindex, sort_by_position, Positioned};
