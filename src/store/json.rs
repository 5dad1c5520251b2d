use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use super::Store;
use crate::error::AppResult;
use crate::types::{Book, Favorite, IssueRecord, LoanRecord, User};

const USERS_FILE: &str = "users.json";
const BOOKS_FILE: &str = "books.json";
const ISSUED_FILE: &str = "issued.json";
const FAVORITES_FILE: &str = "favorites.json";
const HISTORY_FILE: &str = "history.json";

/// One pretty-printed JSON array per collection inside `dir`.
///
/// A missing file reads as an empty collection. An unreadable one does too,
/// with a warning, unless the store is strict.
#[derive(Debug, Clone)]
pub struct JsonStore {
	dir: PathBuf,
	strict: bool,
}

impl JsonStore {
	pub async fn open(dir: impl Into<PathBuf>, strict: bool) -> AppResult<Self> {
		let dir = dir.into();
		fs::create_dir_all(&dir).await?;
		Ok(JsonStore { dir, strict })
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	async fn read<T: DeserializeOwned>(&self, file: &str) -> AppResult<Vec<T>> {
		let path = self.dir.join(file);
		let raw = match fs::read(&path).await {
			Ok(raw) => raw,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};
		if raw.iter().all(u8::is_ascii_whitespace) {
			return Ok(Vec::new());
		}
		match serde_json::from_slice(&raw) {
			Ok(rows) => Ok(rows),
			Err(e) if !self.strict => {
				tracing::warn!(path = %path.display(), error = %e, "unreadable store file, treating it as empty");
				Ok(Vec::new())
			}
			Err(e) => Err(e.into()),
		}
	}

	async fn write<T: Serialize>(&self, file: &str, rows: &[T]) -> AppResult<()> {
		let path = self.dir.join(file);
		let tmp = self.dir.join(format!(".{file}.tmp"));
		let body = serde_json::to_vec_pretty(rows)?;
		fs::write(&tmp, body).await?;
		fs::rename(&tmp, &path).await?;
		tracing::debug!(path = %path.display(), rows = rows.len(), "saved");
		Ok(())
	}
}

#[async_trait]
impl Store for JsonStore {
	async fn load_users(&self) -> AppResult<Vec<User>> {
		self.read(USERS_FILE).await
	}
	async fn save_users(&self, users: &[User]) -> AppResult<()> {
		self.write(USERS_FILE, users).await
	}

	async fn load_books(&self) -> AppResult<Vec<Book>> {
		self.read(BOOKS_FILE).await
	}
	async fn save_books(&self, books: &[Book]) -> AppResult<()> {
		self.write(BOOKS_FILE, books).await
	}

	async fn load_issued(&self) -> AppResult<Vec<IssueRecord>> {
		self.read(ISSUED_FILE).await
	}
	async fn save_issued(&self, issued: &[IssueRecord]) -> AppResult<()> {
		self.write(ISSUED_FILE, issued).await
	}

	async fn load_favorites(&self) -> AppResult<Vec<Favorite>> {
		self.read(FAVORITES_FILE).await
	}
	async fn save_favorites(&self, favorites: &[Favorite]) -> AppResult<()> {
		self.write(FAVORITES_FILE, favorites).await
	}

	async fn load_history(&self) -> AppResult<Vec<LoanRecord>> {
		self.read(HISTORY_FILE).await
	}
	async fn save_history(&self, history: &[LoanRecord]) -> AppResult<()> {
		self.write(HISTORY_FILE, history).await
	}
}
