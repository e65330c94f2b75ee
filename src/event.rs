//! Drag-and-drop reorder events coming from the client hook.

use crate::domain::{CardId, ColumnId};
use crate::error::{BoardError, Result};
use serde::{Deserialize, Serialize};

/// A reorder event as received from the client.
///
/// Every field is optional on the wire; [`DragEvent::validate`] turns it
/// into a [`MoveRequest`] or rejects it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragEvent {
    #[serde(default, alias = "cardID")]
    pub card_id: Option<String>,
    #[serde(default, alias = "fromContainerID")]
    pub from_container_id: Option<String>,
    #[serde(default, alias = "toContainerID")]
    pub to_container_id: Option<String>,
    /// Missing means "drop at the end"
    #[serde(default)]
    pub to_index: Option<i64>,
}

/// A validated move, ready for [`crate::BoardModel::move_card`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub card_id: CardId,
    pub from: ColumnId,
    pub to: ColumnId,
    pub to_index: i64,
}

impl DragEvent {
    pub fn new(
        card_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        to_index: i64,
    ) -> Self {
        Self {
            card_id: Some(card_id.into()),
            from_container_id: Some(from.into()),
            to_container_id: Some(to.into()),
            to_index: Some(to_index),
        }
    }

    /// Parses a loosely-typed payload (e.g. a JSON object from the transport)
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| BoardError::invalid("event", e.to_string()))
    }

    pub fn validate(&self) -> Result<MoveRequest> {
        Ok(MoveRequest {
            card_id: required(&self.card_id, "card_id")?.parse()?,
            from: required(&self.from_container_id, "from_container_id")?.parse()?,
            to: required(&self.to_container_id, "to_container_id")?.parse()?,
            to_index: self.to_index.unwrap_or(i64::MAX),
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| BoardError::invalid(field, "missing"))
}
