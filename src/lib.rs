//! # Hlavi Hub
//!
//! Shared live board state for collaborative Hlavi kanban sessions.
//!
//! A [`Hub`] hands out one [`BoardModel`] per board id, so every session
//! viewing a board reads and mutates the same in-memory state. Each model
//! serialises its mutations (add/delete column, add/delete/move card),
//! persists them through a [`Repository`] and fans the result out to
//! subscribed sessions through reactive containers.

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod event;
pub mod hub;
pub mod model;
pub mod reactive;
pub mod storage;

// Re-export commonly used types
pub use config::HubConfig;
pub use context::RequestContext;
pub use domain::{Board, BoardId, Card, CardId, CardPatch, Column, ColumnId, Label};
pub use error::{BoardError, Result};
pub use event::{DragEvent, MoveRequest};
pub use hub::Hub;
pub use model::{BoardModel, BoardSubscription, CardMap, Outcome};
pub use reactive::{Reactive, Snapshot, Subscription};
pub use storage::{CardPlacement, ColumnPlacement, MemoryRepository, Repository};
