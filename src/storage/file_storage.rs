use crate::{
    domain::{Board, BoardId, Card, CardId, Column, ColumnId},
    error::{BoardError, Result},
    storage::{BoardDocument, CardPlacement, ColumnPlacement, Repository},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, sync::Mutex};

/// File-based repository: one JSON document per board
pub struct FileRepository {
    root_path: PathBuf,
    // serialises read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileRepository {
    const HLAVI_DIR: &'static str = ".hlavi";
    const BOARDS_DIR: &'static str = "boards";

    /// Creates a new FileRepository for the given project root
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::HLAVI_DIR),
            write_lock: Mutex::new(()),
        }
    }

    fn boards_dir(&self) -> PathBuf {
        self.root_path.join(Self::BOARDS_DIR)
    }

    fn board_file(&self, id: &BoardId) -> Result<PathBuf> {
        let name = id.as_str();
        if id.is_blank() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(BoardError::invalid(
                "board_id",
                format!("'{}' cannot be used as a file name", name),
            ));
        }
        Ok(self.boards_dir().join(format!("{}.json", name)))
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }

    async fn read_document(&self, id: &BoardId) -> Result<BoardDocument> {
        let file_path = self.board_file(id)?;

        if !file_path.exists() {
            return Err(BoardError::BoardNotFound(id.to_string()));
        }

        let contents = fs::read_to_string(&file_path).await?;
        let document: BoardDocument = serde_json::from_str(&contents)?;
        Ok(document)
    }

    async fn write_document(&self, document: &BoardDocument) -> Result<()> {
        self.ensure_directory_exists(&self.boards_dir()).await?;

        let file_path = self.board_file(&document.board.id)?;
        let tmp_path = file_path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(document)?;

        // rename keeps readers from seeing a half-written file
        fs::write(&tmp_path, json).await?;
        fs::rename(&tmp_path, &file_path).await?;
        Ok(())
    }

    async fn modify<T>(
        &self,
        board_id: &BoardId,
        f: impl FnOnce(&mut BoardDocument) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document(board_id).await?;
        let value = f(&mut document)?;
        self.write_document(&document).await?;
        Ok(value)
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn create_board(&self, board: &Board) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.board_file(&board.id)?.exists() {
            return Ok(());
        }
        self.write_document(&BoardDocument::new(board.clone())).await
    }

    async fn get_board(&self, id: &BoardId) -> Result<Board> {
        Ok(self.read_document(id).await?.board)
    }

    async fn get_columns(&self, board_id: &BoardId) -> Result<Vec<Column>> {
        Ok(self.read_document(board_id).await?.columns)
    }

    async fn get_cards(&self, board_id: &BoardId) -> Result<Vec<Card>> {
        Ok(self.read_document(board_id).await?.cards)
    }

    async fn create_column(&self, column: &Column) -> Result<()> {
        self.modify(&column.board_id, |doc| doc.insert_column(column))
            .await
    }

    async fn rename_column(&self, board_id: &BoardId, id: &ColumnId, title: &str) -> Result<()> {
        self.modify(board_id, |doc| doc.rename_column(id, title)).await
    }

    async fn delete_column(&self, board_id: &BoardId, id: &ColumnId) -> Result<()> {
        self.modify(board_id, |doc| {
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
        self.modify(board_id, |doc| doc.place_columns(placements))
            .await
    }

    async fn create_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        self.modify(board_id, |doc| doc.insert_card(card)).await
    }

    async fn update_card(&self, board_id: &BoardId, card: &Card) -> Result<()> {
        self.modify(board_id, |doc| doc.replace_card(card)).await
    }

    async fn delete_card(&self, board_id: &BoardId, id: &CardId) -> Result<()> {
        self.modify(board_id, |doc| {
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
        self.modify(board_id, |doc| doc.place_cards(placements)).await
    }
}
