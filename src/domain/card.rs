use crate::domain::ids::{CardId, ColumnId};
use crate::error::{BoardError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A coloured tag shown on a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
}

impl Label {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// A kanban card. Belongs to exactly one column; `position` orders it within that column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub column_id: ColumnId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub position: usize,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Creates a new card with a generated id
    pub fn new(column_id: ColumnId, title: String, position: usize) -> Self {
        let now = Utc::now();
        Self {
            id: CardId::generate(),
            column_id,
            title,
            content: String::new(),
            position,
            labels: Vec::new(),
            cover_color: None,
            due_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<CardId>) -> Self {
        self.id = id.into();
        self
    }

    /// Applies a patch, returning true if any field changed.
    pub fn apply(&mut self, patch: &CardPatch) -> bool {
        let before = self.clone();

        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        if let Some(labels) = &patch.labels {
            self.labels = labels.clone();
        }
        if let Some(cover) = &patch.cover_color {
            self.cover_color = cover.clone();
        }
        if let Some(due) = patch.due_date {
            self.due_date = due;
        }

        let changed = *self != before;
        if changed {
            self.updated_at = Utc::now();
        }
        changed
    }
}

/// Partial update of a card's editable fields.
///
/// The doubly-optional fields distinguish "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<Label>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub cover_color: Option<Option<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
}

// only runs for keys that are present, so an explicit null becomes Some(None)
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl CardPatch {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn labels(mut self, labels: Vec<Label>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn cover_color(mut self, color: Option<String>) -> Self {
        self.cover_color = Some(color);
        self
    }

    pub fn due_date(mut self, due: Option<DateTime<Utc>>) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Checks field formats; titles are checked by the model against its configured limits.
    pub fn validate(&self) -> Result<()> {
        if let Some(Some(color)) = &self.cover_color {
            if !is_hex_color(color) {
                return Err(BoardError::invalid(
                    "cover_color",
                    format!("'{}' is not a #rgb or #rrggbb colour", color),
                ));
            }
        }
        if let Some(labels) = &self.labels {
            if let Some(label) = labels.iter().find(|l| l.name.trim().is_empty()) {
                return Err(BoardError::invalid(
                    "labels",
                    format!("label with colour '{}' has no name", label.color),
                ));
            }
        }
        Ok(())
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card::new(ColumnId::new("todo"), "Write docs".to_string(), 0)
    }

    #[test]
    fn test_card_creation() {
        let card = card();
        assert_eq!(card.title, "Write docs");
        assert_eq!(card.column_id.as_str(), "todo");
        assert!(card.labels.is_empty());
        assert!(card.cover_color.is_none());
        assert_eq!(card.created_at, card.updated_at);
    }

    #[test]
    fn test_apply_patch() {
        let mut card = card();
        let due = Utc::now() + chrono::Duration::days(3);
        let patch = CardPatch::default()
            .title("Write better docs")
            .labels(vec![Label::new("docs", "#00f")])
            .cover_color(Some("#ff0000".to_string()))
            .due_date(Some(due));

        assert!(card.apply(&patch));
        assert_eq!(card.title, "Write better docs");
        assert_eq!(card.labels.len(), 1);
        assert_eq!(card.cover_color.as_deref(), Some("#ff0000"));
        assert_eq!(card.due_date, Some(due));
    }

    #[test]
    fn test_apply_patch_clears_optional_fields() {
        let mut card = card();
        card.cover_color = Some("#abc".to_string());
        card.due_date = Some(Utc::now());

        let patch = CardPatch::default().cover_color(None).due_date(None);
        assert!(card.apply(&patch));
        assert!(card.cover_color.is_none());
        assert!(card.due_date.is_none());
    }

    #[test]
    fn test_apply_identical_patch_reports_no_change() {
        let mut card = card();
        let patch = CardPatch::default().title("Write docs");
        assert!(!card.apply(&patch));
    }

    #[test]
    fn test_patch_validation() {
        assert!(CardPatch::default().validate().is_ok());
        assert!(CardPatch::default()
            .cover_color(Some("#A1b2C3".to_string()))
            .validate()
            .is_ok());
        assert!(CardPatch::default()
            .cover_color(Some("red".to_string()))
            .validate()
            .is_err());
        assert!(CardPatch::default()
            .labels(vec![Label::new("  ", "#fff")])
            .validate()
            .is_err());
    }

    #[test]
    fn test_patch_deserializes_missing_fields_as_untouched() {
        let patch: CardPatch = serde_json::from_str(r#"{"title":"x"}"#).unwrap();
        assert_eq!(patch.title.as_deref(), Some("x"));
        assert!(patch.cover_color.is_none());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_patch_null_clears_optional_fields() {
        let patch: CardPatch =
            serde_json::from_str(r#"{"cover_color": null, "due_date": null}"#).unwrap();
        assert_eq!(patch.cover_color, Some(None));
        assert_eq!(patch.due_date, Some(None));

        let mut card = card();
        card.cover_color = Some("#abc".to_string());
        card.due_date = Some(Utc::now());
        assert!(card.apply(&patch));
        assert!(card.cover_color.is_none());
        assert!(card.due_date.is_none());

        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json["cover_color"], serde_json::Value::Null);
        let untouched = serde_json::to_value(CardPatch::default().title("x")).unwrap();
        assert!(untouched.get("cover_color").is_none());
    }
}
