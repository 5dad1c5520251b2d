use async_trait::async_trait;
use tokio::sync::Mutex;

use super::Store;
use crate::error::AppResult;
use crate::types::{Book, Favorite, IssueRecord, LoanRecord, User};

#[derive(Debug, Default)]
struct Tables {
	users: Vec<User>,
	books: Vec<Book>,
	issued: Vec<IssueRecord>,
	favorites: Vec<Favorite>,
	history: Vec<LoanRecord>,
}

/// Store kept entirely in memory. Used by tests and throwaway instances.
#[derive(Debug, Default)]
pub struct MemoryStore {
	tables: Mutex<Tables>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_books(books: Vec<Book>) -> Self {
		MemoryStore { tables: Mutex::new(Tables { books, ..Tables::default() }) }
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn load_users(&self) -> AppResult<Vec<User>> {
		Ok(self.tables.lock().await.users.clone())
	}
	async fn save_users(&self, users: &[User]) -> AppResult<()> {
		self.tables.lock().await.users = users.to_vec();
		Ok(())
	}

	async fn load_books(&self) -> AppResult<Vec<Book>> {
		Ok(self.tables.lock().await.books.clone())
	}
	async fn save_books(&self, books: &[Book]) -> AppResult<()> {
		self.tables.lock().await.books = books.to_vec();
		Ok(())
	}

	async fn load_issued(&self) -> AppResult<Vec<IssueRecord>> {
		Ok(self.tables.lock().await.issued.clone())
	}
	async fn save_issued(&self, issued: &[IssueRecord]) -> AppResult<()> {
		self.tables.lock().await.issued = issued.to_vec();
		Ok(())
	}

	async fn load_favorites(&self) -> AppResult<Vec<Favorite>> {
		Ok(self.tables.lock().await.favorites.clone())
	}
	async fn save_favorites(&self, favorites: &[Favorite]) -> AppResult<()> {
		self.tables.lock().await.favorites = favorites.to_vec();
		Ok(())
	}

	async fn load_history(&self) -> AppResult<Vec<LoanRecord>> {
		Ok(self.tables.lock().await.history.clone())
	}
	async fn save_history(&self, history: &[LoanRecord]) -> AppResult<()> {
		self.tables.lock().await.history = history.to_vec();
		Ok(())
	}
}
