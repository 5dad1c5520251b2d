//! Whole-collection persistence.
//!
//! Every collection is loaded and saved as a complete snapshot, the same way
//! the flat files were rewritten on each change. Lookups are layered on top
//! of `load_*` as provided methods so every backend gets them for free.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::StoreConfig;
use crate::error::AppResult;
use crate::types::{Book, BookId, Favorite, IssueRecord, LoanRecord, User, UserId};

pub mod json;
pub mod memory;
pub mod sql;

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use sql::SqliteStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
	async fn load_users(&self) -> AppResult<Vec<User>>;
	async fn save_users(&self, users: &[User]) -> AppResult<()>;

	async fn load_books(&self) -> AppResult<Vec<Book>>;
	async fn save_books(&self, books: &[Book]) -> AppResult<()>;

	async fn load_issued(&self) -> AppResult<Vec<IssueRecord>>;
	async fn save_issued(&self, issued: &[IssueRecord]) -> AppResult<()>;

	async fn load_favorites(&self) -> AppResult<Vec<Favorite>>;
	async fn save_favorites(&self, favorites: &[Favorite]) -> AppResult<()>;

	async fn load_history(&self) -> AppResult<Vec<LoanRecord>>;
	async fn save_history(&self, history: &[LoanRecord]) -> AppResult<()>;

	async fn find_user(&self, email: &UserId) -> AppResult<Option<User>> {
		Ok(self.load_users().await?.into_iter().find(|u| &u.email == email))
	}

	async fn find_book(&self, id: BookId) -> AppResult<Option<Book>> {
		Ok(self.load_books().await?.into_iter().find(|b| b.id == id))
	}

	async fn issued_to(&self, email: &UserId) -> AppResult<Vec<IssueRecord>> {
		Ok(self.load_issued().await?.into_iter().filter(|r| &r.user == email).collect())
	}
}

pub async fn open(config: &StoreConfig) -> AppResult<Arc<dyn Store>> {
	let store: Arc<dyn Store> = match config {
		StoreConfig::Json { dir, strict } => {
			tracing::info!(dir = %dir.display(), strict, "using json store");
			Arc::new(JsonStore::open(dir.clone(), *strict).await?)
		}
		StoreConfig::Sqlite { url } => {
			tracing::info!("using sqlite store");
			Arc::new(SqliteStore::connect(url).await?)
		}
	};
	Ok(store)
}

/// Next catalog id: one past the highest in use, starting at 1.
pub fn next_book_id(books: &[Book]) -> BookId {
	BookId(books.iter().map(|b| b.id.0).max().unwrap_or(0) + 1)
}

#[cfg(test)]
pub(crate) mod fixtures {
	use crate::types::{Book, BookId, BookStatus, Role, User, UserId};

	pub fn user(email: &str, role: Role) -> User {
		User {
			name: email.split('@').next().unwrap_or(email).to_string(),
			email: UserId::new(email),
			mobile: "555-0100".into(),
			password: "secret".into(),
			role,
		}
	}

	pub fn book(id: i64, title: &str, author: &str, category: Option<&str>) -> Book {
		Book {
			id: BookId(id),
			title: title.into(),
			author: author.into(),
			category: category.map(str::to_string),
			description: format!("about {title}"),
			index: String::new(),
			cover: format!("{id}.png"),
			status: BookStatus::Available,
		}
	}
}
