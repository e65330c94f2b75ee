use crate::{
    domain::{Board, BoardId, Card, CardId, Column, ColumnId, Label},
    error::{BoardError, Result},
    storage::{CardPlacement, ColumnPlacement, Repository},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS boards (
    id       TEXT PRIMARY KEY,
    title    TEXT NOT NULL,
    owner_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS columns (
    id       TEXT PRIMARY KEY,
    board_id TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    title    TEXT NOT NULL,
    position INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cards (
    id          TEXT PRIMARY KEY,
    board_id    TEXT NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
    column_id   TEXT NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    content     TEXT NOT NULL DEFAULT '',
    position    INTEGER NOT NULL,
    labels      TEXT NOT NULL DEFAULT '[]',
    cover_color TEXT,
    due_date    TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_columns_board ON columns(board_id);
CREATE INDEX IF NOT EXISTS idx_cards_board ON cards(board_id);
"#;

/// SQLite-backed repository.
///
/// rusqlite is synchronous, so every call runs on the blocking pool.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Opens (or creates) a database file and applies the schema
    pub fn open(database_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(database_path).map_err(sql_error("open"))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error("open"))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(sql_error("migrate"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| BoardError::persistence(operation, "connection lock poisoned"))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| BoardError::persistence(operation, e))?
    }
}

fn sql_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> BoardError {
    move |e| BoardError::persistence(operation, e)
}

fn to_sql_position(position: usize) -> i64 {
    i64::try_from(position).unwrap_or(i64::MAX)
}

fn from_sql_position(operation: &'static str, position: i64) -> Result<usize> {
    usize::try_from(position)
        .map_err(|_| BoardError::persistence(operation, format!("negative position {}", position)))
}

fn parse_time(operation: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| BoardError::persistence(operation, e))
}

fn board_exists(conn: &Connection, board_id: &str) -> Result<bool> {
    conn.query_row("SELECT 1 FROM boards WHERE id = ?1", params![board_id], |_| Ok(()))
        .optional()
        .map(|row| row.is_some())
        .map_err(sql_error("board_exists"))
}

fn column_exists(conn: &Connection, board_id: &str, column_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM columns WHERE id = ?1 AND board_id = ?2",
        params![column_id, board_id],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(sql_error("column_exists"))
}

/// Raw card columns as stored, converted to a [`Card`] outside the row callback
struct CardRow {
    id: String,
    column_id: String,
    title: String,
    content: String,
    position: i64,
    labels: String,
    cover_color: Option<String>,
    due_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl CardRow {
    fn into_card(self) -> Result<Card> {
        const OP: &str = "get_cards";
        let labels: Vec<Label> = serde_json::from_str(&self.labels)?;
        let due_date = match self.due_date {
            Some(raw) => Some(parse_time(OP, &raw)?),
            None => None,
        };
        Ok(Card {
            id: CardId::new(self.id),
            column_id: ColumnId::new(self.column_id),
            title: self.title,
            content: self.content,
            position: from_sql_position(OP, self.position)?,
            labels,
            cover_color: self.cover_color,
            due_date,
            created_at: parse_time(OP, &self.created_at)?,
            updated_at: parse_time(OP, &self.updated_at)?,
        })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn create_board(&self, board: &Board) -> Result<()> {
        let board = board.clone();
        self.call("create_board", move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO boards (id, title, owner_id) VALUES (?1, ?2, ?3)",
                params![board.id.as_str(), board.title, board.owner_id],
            )
            .map_err(sql_error("create_board"))?;
            Ok(())
        })
        .await
    }

    async fn get_board(&self, id: &BoardId) -> Result<Board> {
        let id = id.clone();
        self.call("get_board", move |conn| {
            conn.query_row(
                "SELECT id, title, owner_id FROM boards WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(Board {
                        id: BoardId::new(row.get::<_, String>(0)?),
                        title: row.get(1)?,
                        owner_id: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(sql_error("get_board"))?
            .ok_or_else(|| BoardError::BoardNotFound(id.to_string()))
        })
        .await
    }

    async fn get_columns(&self, board_id: &BoardId) -> Result<Vec<Column>> {
        let board_id = board_id.clone();
        self.call("get_columns", move |conn| {
            if !board_exists(conn, board_id.as_str())? {
                return Err(BoardError::BoardNotFound(board_id.to_string()));
            }
            let mut stmt = conn
                .prepare("SELECT id, title, position FROM columns WHERE board_id = ?1 ORDER BY position, id")
                .map_err(sql_error("get_columns"))?;
            let rows = stmt
                .query_map(params![board_id.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(sql_error("get_columns"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error("get_columns"))?;

            rows.into_iter()
                .map(|(id, title, position)| {
                    Ok(Column {
                        id: ColumnId::new(id),
                        board_id: board_id.clone(),
                        title,
                        position: from_sql_position("get_columns", position)?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn get_cards(&self, board_id: &BoardId) -> Result<Vec<Card>> {
        let board_id = board_id.clone();
        self.call("get_cards", move |conn| {
            if !board_exists(conn, board_id.as_str())? {
                return Err(BoardError::BoardNotFound(board_id.to_string()));
            }
            let mut stmt = conn
                .prepare(
                    "SELECT id, column_id, title, content, position, labels, cover_color, \
                     due_date, created_at, updated_at \
                     FROM cards WHERE board_id = ?1 ORDER BY column_id, position, id",
                )
                .map_err(sql_error("get_cards"))?;
            let rows = stmt
                .query_map(params![board_id.as_str()], |row| {
                    Ok(CardRow {
                        id: row.get(0)?,
                        column_id: row.get(1)?,
                        title: row.get(2)?,
                        content: row.get(3)?,
                        position: row.get(4)?,
                        labels: row.get(5)?,
                        cover_color: row.get(6)?,
                        due_date: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                })
                .map_err(sql_error("get_cards"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_error("get_cards"))?;

            rows.into_iter().map(CardRow::into_card).collect()
        })
        .await
    }

    async fn create_column(&self, column: &Column) -> Result<()> {
        let column = column.clone();
        self.call("create_column", move |conn| {
            if !board_exists(conn, column.board_id.as_str())? {
                return Err(BoardError::BoardNotFound(column.board_id.to_string()));
            }
            conn.execute(
                "INSERT INTO columns (id, board_id, title, position) VALUES (?1, ?2, ?3, ?4)",
                params![
                    column.id.as_str(),
                    column.board_id.as_str(),
                    column.title,
                    to_sql_position(column.position)
                ],
            )
            .map_err(sql_error("create_column"))?;
            Ok(())
        })
        .await
    }

    async fn rename_column(&self, board_id: &BoardId, id: &ColumnId, title: &str) -> Result<()> {
        let (board_id, id, title) = (board_id.clone(), id.clone(), title.to_string());
        self.call("rename_column", move |conn| {
            let updated = conn
                .execute(
                    "UPDATE columns SET title = ?1 WHERE id = ?2 AND board_id = ?3",
                    params![title, id.as_str(), board_id.as_str()],
                )
                .map_err(sql_error("rename_column"))?;
            if updated == 0 {
                return Err(BoardError::ColumnNotFound(id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_column(&self, board_id: &BoardId, id: &ColumnId) -> Result<()> {
        let (board_id, id) = (board_id.clone(), id.clone());
        self.call("delete_column", move |conn| {
            let tx = conn.transaction().map_err(sql_error("delete_column"))?;
            tx.execute(
                "DELETE FROM cards WHERE column_id = ?1 AND board_id = ?2",
                params![id.as_str(), board_id.as_str()],
            )
            .map_err(sql_error("delete_column"))?;
            tx.execute(
                "DELETE FROM columns WHERE id = ?1 AND board_id = ?2",
                params![id.as_str(), board_id.as_str()],
            )
            .map_err(sql_error("delete_column"))?;
            tx.commit().map_err(sql_error("delete_column"))
        })
        .await
    }

    async fn update_column_positions(
        &self,
        board_id: &BoardId,
        placements: &[ColumnPlacement],
    ) -> Result<()> {
        let (board_id, placements) = (board_id.clone(), placements.to_vec());
        self.call("update_column_positions", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_error("update_column_positions"))?;
            for placement in &placements {
                let updated = tx
                    .execute(
                        "UPDATE columns SET position = ?1 WHERE id = ?2 AND board_id = ?3",
                        params![
                            to_sql_position(placement.position),
                            placement.column_id.as_str(),
                            board_id.as_str()
                        ],
                    )
                    .map_err(sql_error("update_column_positions"))?;
                if updated == 0 {
                    return Err(BoardError::ColumnNotFound(placement.column_id.to_string()));
                }
            }
            tx.commit().map_err(sql_error("update_column_positions"))
        })
        .await
    }

    async fn create_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        let (board_id, card) = (board_id.clone(), card.clone());
        self.call("create_card", move |conn| {
            if !column_exists(conn, board_id.as_str(), card.column_id.as_str())? {
                return Err(BoardError::ColumnNotFound(card.column_id.to_string()));
            }
            let labels = serde_json::to_string(&card.labels)?;
            conn.execute(
                "INSERT INTO cards (id, board_id, column_id, title, content, position, labels, \
                 cover_color, due_date, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    card.id.as_str(),
                    board_id.as_str(),
                    card.column_id.as_str(),
                    card.title,
                    card.content,
                    to_sql_position(card.position),
                    labels,
                    card.cover_color,
                    card.due_date.map(|d| d.to_rfc3339()),
                    card.created_at.to_rfc3339(),
                    card.updated_at.to_rfc3339(),
                ],
            )
            .map_err(sql_error("create_card"))?;
            Ok(())
        })
        .await
    }

    async fn update_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        let (board_id, card) = (board_id.clone(), card.clone());
        self.call("update_card", move |conn| {
            let labels = serde_json::to_string(&card.labels)?;
            let updated = conn
                .execute(
                    "UPDATE cards SET title = ?1, content = ?2, labels = ?3, cover_color = ?4, \
                     due_date = ?5, updated_at = ?6 WHERE id = ?7 AND board_id = ?8",
                    params![
                        card.title,
                        card.content,
                        labels,
                        card.cover_color,
                        card.due_date.map(|d| d.to_rfc3339()),
                        card.updated_at.to_rfc3339(),
                        card.id.as_str(),
                        board_id.as_str(),
                    ],
                )
                .map_err(sql_error("update_card"))?;
            if updated == 0 {
                return Err(BoardError::CardNotFound(card.id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete_card(&self, board_id: &BoardId, id: &CardId) -> Result<()> {
        let (board_id, id) = (board_id.clone(), id.clone());
        self.call("delete_card", move |conn| {
            conn.execute(
                "DELETE FROM cards WHERE id = ?1 AND board_id = ?2",
                params![id.as_str(), board_id.as_str()],
            )
            .map_err(sql_error("delete_card"))?;
            Ok(())
        })
        .await
    }

    async fn update_card_positions(
        &self,
        board_id: &BoardId,
        placements: &[CardPlacement],
    ) -> Result<()> {
        let (board_id, placements) = (board_id.clone(), placements.to_vec());
        self.call("update_card_positions", move |conn| {
            let tx = conn
                .transaction()
                .map_err(sql_error("update_card_positions"))?;
            for placement in &placements {
                if !column_exists(&tx, board_id.as_str(), placement.column_id.as_str())? {
                    return Err(BoardError::ColumnNotFound(placement.column_id.to_string()));
                }
                let updated = tx
                    .execute(
                        "UPDATE cards SET column_id = ?1, position = ?2 WHERE id = ?3 AND board_id = ?4",
                        params![
                            placement.column_id.as_str(),
                            to_sql_position(placement.position),
                            placement.card_id.as_str(),
                            board_id.as_str()
                        ],
                    )
                    .map_err(sql_error("update_card_positions"))?;
                if updated == 0 {
                    return Err(BoardError::CardNotFound(placement.card_id.to_string()));
                }
            }
            tx.commit().map_err(sql_error("update_card_positions"))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (SqliteRepository, BoardId, Column, Column) {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let board = Board::new("b1", "Roadmap", "owner");
        repo.create_board(&board).await.unwrap();

        let todo = Column::new(board.id.clone(), "Todo".into(), 0);
        let done = Column::new(board.id.clone(), "Done".into(), 1);
        repo.create_column(&todo).await.unwrap();
        repo.create_column(&done).await.unwrap();
        (repo, board.id, todo, done)
    }

    #[tokio::test]
    async fn test_board_not_found() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let err = repo.get_board(&BoardId::new("nope")).await.unwrap_err();
        assert!(matches!(err, BoardError::BoardNotFound(_)));
    }

    #[tokio::test]
    async fn test_card_fields_round_trip() {
        let (repo, board_id, todo, _) = seeded().await;
        let mut card = Card::new(todo.id.clone(), "Launch".into(), 0);
        card.labels = vec![Label::new("urgent", "#f00")];
        card.cover_color = Some("#00ff00".to_string());
        card.due_date = Some(Utc::now());
        repo.create_card(&board_id, &card).await.unwrap();

        let cards = repo.get_cards(&board_id).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].labels, card.labels);
        assert_eq!(cards[0].cover_color, card.cover_color);
        assert_eq!(cards[0].due_date, card.due_date);
    }

    #[tokio::test]
    async fn test_delete_column_cascades() {
        let (repo, board_id, todo, done) = seeded().await;
        repo.create_card(&board_id, &Card::new(todo.id.clone(), "a".into(), 0))
            .await
            .unwrap();

        repo.delete_column(&board_id, &todo.id).await.unwrap();

        assert!(repo.get_cards(&board_id).await.unwrap().is_empty());
        let columns = repo.get_columns(&board_id).await.unwrap();
        assert_eq!(columns, vec![done]);
    }

    #[tokio::test]
    async fn test_position_batch_rolls_back_on_unknown_card() {
        let (repo, board_id, todo, done) = seeded().await;
        let card = Card::new(todo.id.clone(), "a".into(), 0);
        repo.create_card(&board_id, &card).await.unwrap();

        let err = repo
            .update_card_positions(
                &board_id,
                &[
                    CardPlacement {
                        card_id: card.id.clone(),
                        column_id: done.id.clone(),
                        position: 0,
                    },
                    CardPlacement {
                        card_id: CardId::new("ghost"),
                        column_id: done.id.clone(),
                        position: 1,
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::CardNotFound(_)));

        let cards = repo.get_cards(&board_id).await.unwrap();
        assert_eq!(cards[0].column_id, todo.id);
    }
}
