use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;

use super::Store;
use crate::error::AppResult;
use crate::types::{Book, BookId, Favorite, IssueRecord, LoanRecord, User, UserId};

// books keep their own rowid so that catalog order survives a rewrite
pub const TABLE_SCHEMA: [&str; 5] = [
	r#"
CREATE TABLE IF NOT EXISTS accounts (
	email TEXT NOT NULL UNIQUE,
	name TEXT NOT NULL,
	mobile TEXT NOT NULL DEFAULT '',
	pass TEXT NOT NULL,
	role TEXT NOT NULL DEFAULT 'Student'
);"#,
	r#"
CREATE TABLE IF NOT EXISTS books (
	id INTEGER NOT NULL UNIQUE,
	title TEXT NOT NULL,
	author TEXT NOT NULL,
	category TEXT DEFAULT NULL,
	description TEXT NOT NULL DEFAULT '',
	contents TEXT NOT NULL DEFAULT '',
	cover TEXT NOT NULL DEFAULT '',
	status TEXT NOT NULL DEFAULT 'available',
	CHECK(status IN ('available', 'issued'))
);"#,
	r#"
CREATE TABLE IF NOT EXISTS issued (
	email TEXT NOT NULL,
	book_id INTEGER NOT NULL UNIQUE,
	issued_on DATE NOT NULL,
	return_by DATE NOT NULL
);"#,
	r#"
CREATE TABLE IF NOT EXISTS favorites (
	email TEXT NOT NULL,
	book_id INTEGER NOT NULL,
	UNIQUE(email, book_id)
);"#,
	r#"
CREATE TABLE IF NOT EXISTS borrow_log (
	email TEXT NOT NULL,
	book_id INTEGER NOT NULL,
	issued_on DATE NOT NULL,
	return_by DATE NOT NULL,
	returned_on DATE NOT NULL,
	fine INTEGER NOT NULL DEFAULT 0
);"#,
];

#[derive(FromRow)]
struct AccountRow {
	email: String,
	name: String,
	mobile: String,
	pass: String,
	role: String,
}

#[derive(FromRow)]
struct BookRow {
	id: i64,
	title: String,
	author: String,
	category: Option<String>,
	description: String,
	contents: String,
	cover: String,
	status: String,
}

#[derive(FromRow)]
struct IssueRow {
	email: String,
	book_id: i64,
	issued_on: NaiveDate,
	return_by: NaiveDate,
}

#[derive(FromRow)]
struct FavoriteRow {
	email: String,
	book_id: i64,
}

#[derive(FromRow)]
struct LoanRow {
	email: String,
	book_id: i64,
	issued_on: NaiveDate,
	return_by: NaiveDate,
	returned_on: NaiveDate,
	fine: i64,
}

impl AccountRow {
	fn into_user(self) -> AppResult<User> {
		Ok(User {
			name: self.name,
			email: UserId::new(&self.email),
			mobile: self.mobile,
			password: self.pass,
			role: self.role.parse()?,
		})
	}
}

impl BookRow {
	fn into_book(self) -> AppResult<Book> {
		Ok(Book {
			id: BookId(self.id),
			title: self.title,
			author: self.author,
			category: self.category,
			description: self.description,
			index: self.contents,
			cover: self.cover,
			status: self.status.parse()?,
		})
	}
}

/// The same snapshots kept in SQLite tables. Each save replaces a table's
/// contents inside one transaction.
#[derive(Debug, Clone)]
pub struct SqliteStore {
	db: SqlitePool,
}

impl SqliteStore {
	pub async fn connect(url: &str) -> AppResult<Self> {
		let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
		let mut pool = SqlitePoolOptions::new().max_connections(5).acquire_timeout(Duration::from_secs(3));
		// every in-memory connection is its own database, so keep exactly one alive
		if url.contains(":memory:") {
			pool = pool.max_connections(1).min_connections(1).idle_timeout(None).max_lifetime(None);
		}
		let db = pool.connect_with(options).await?;
		SqliteStore::with_pool(db).await
	}

	pub async fn with_pool(db: SqlitePool) -> AppResult<Self> {
		for statement in TABLE_SCHEMA {
			sqlx::query(statement).execute(&db).await?;
		}
		Ok(SqliteStore { db })
	}
}

#[async_trait]
impl Store for SqliteStore {
	async fn load_users(&self) -> AppResult<Vec<User>> {
		sqlx::query_as::<_, AccountRow>("SELECT email, name, mobile, pass, role FROM accounts ORDER BY rowid;")
			.fetch_all(&self.db)
			.await?
			.into_iter()
			.map(AccountRow::into_user)
			.collect()
	}

	async fn save_users(&self, users: &[User]) -> AppResult<()> {
		let mut tx = self.db.begin().await?;
		sqlx::query("DELETE FROM accounts;").execute(&mut *tx).await?;
		for user in users {
			sqlx::query("INSERT INTO accounts (email, name, mobile, pass, role) VALUES (?, ?, ?, ?, ?);")
				.bind(user.email.as_str())
				.bind(&user.name)
				.bind(&user.mobile)
				.bind(&user.password)
				.bind(user.role.to_string())
				.execute(&mut *tx)
				.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	async fn load_books(&self) -> AppResult<Vec<Book>> {
		sqlx::query_as::<_, BookRow>(
			"SELECT id, title, author, category, description, contents, cover, status FROM books ORDER BY rowid;",
		)
		.fetch_all(&self.db)
		.await?
		.into_iter()
		.map(BookRow::into_book)
		.collect()
	}

	async fn save_books(&self, books: &[Book]) -> AppResult<()> {
		let mut tx = self.db.begin().await?;
		sqlx::query("DELETE FROM books;").execute(&mut *tx).await?;
		for book in books {
			sqlx::query(
				"INSERT INTO books (id, title, author, category, description, contents, cover, status) \
				 VALUES (?, ?, ?, ?, ?, ?, ?, ?);",
			)
			.bind(book.id.0)
			.bind(&book.title)
			.bind(&book.author)
			.bind(&book.category)
			.bind(&book.description)
			.bind(&book.index)
			.bind(&book.cover)
			.bind(book.status.to_string())
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	async fn load_issued(&self) -> AppResult<Vec<IssueRecord>> {
		let rows = sqlx::query_as::<_, IssueRow>("SELECT email, book_id, issued_on, return_by FROM issued ORDER BY rowid;")
			.fetch_all(&self.db)
			.await?;
		Ok(rows
			.into_iter()
			.map(|r| IssueRecord {
				user: UserId::new(&r.email),
				book_id: BookId(r.book_id),
				issued_on: r.issued_on,
				return_by: r.return_by,
			})
			.collect())
	}

	async fn save_issued(&self, issued: &[IssueRecord]) -> AppResult<()> {
		let mut tx = self.db.begin().await?;
		sqlx::query("DELETE FROM issued;").execute(&mut *tx).await?;
		for rec in issued {
			sqlx::query("INSERT INTO issued (email, book_id, issued_on, return_by) VALUES (?, ?, ?, ?);")
				.bind(rec.user.as_str())
				.bind(rec.book_id.0)
				.bind(rec.issued_on)
				.bind(rec.return_by)
				.execute(&mut *tx)
				.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	async fn load_favorites(&self) -> AppResult<Vec<Favorite>> {
		let rows = sqlx::query_as::<_, FavoriteRow>("SELECT email, book_id FROM favorites ORDER BY rowid;")
			.fetch_all(&self.db)
			.await?;
		Ok(rows
			.into_iter()
			.map(|r| Favorite { user: UserId::new(&r.email), book_id: BookId(r.book_id) })
			.collect())
	}

	async fn save_favorites(&self, favorites: &[Favorite]) -> AppResult<()> {
		let mut tx = self.db.begin().await?;
		sqlx::query("DELETE FROM favorites;").execute(&mut *tx).await?;
		for fav in favorites {
			sqlx::query("INSERT OR IGNORE INTO favorites (email, book_id) VALUES (?, ?);")
				.bind(fav.user.as_str())
				.bind(fav.book_id.0)
				.execute(&mut *tx)
				.await?;
		}
		tx.commit().await?;
		Ok(())
	}

	async fn load_history(&self) -> AppResult<Vec<LoanRecord>> {
		let rows = sqlx::query_as::<_, LoanRow>(
			"SELECT email, book_id, issued_on, return_by, returned_on, fine FROM borrow_log ORDER BY rowid;",
		)
		.fetch_all(&self.db)
		.await?;
		Ok(rows
			.into_iter()
			.map(|r| LoanRecord {
				user: UserId::new(&r.email),
				book_id: BookId(r.book_id),
				issued_on: r.issued_on,
				return_by: r.return_by,
				returned_on: r.returned_on,
				fine: r.fine,
			})
			.collect())
	}

	async fn save_history(&self, history: &[LoanRecord]) -> AppResult<()> {
		let mut tx = self.db.begin().await?;
		sqlx::query("DELETE FROM borrow_log;").execute(&mut *tx).await?;
		for loan in history {
			sqlx::query(
				"INSERT INTO borrow_log (email, book_id, issued_on, return_by, returned_on, fine) \
				 VALUES (?, ?, ?, ?, ?, ?);",
			)
			.bind(loan.user.as_str())
			.bind(loan.book_id.0)
			.bind(loan.issued_on)
			.bind(loan.return_by)
			.bind(loan.returned_on)
			.bind(loan.fine)
			.execute(&mut *tx)
			.await?;
		}
		tx.commit().await?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::fixtures;
	use crate::types::{BookStatus, Role};

	#[tokio::test]
	async fn tables_keep_catalog_order_and_fields() {
		let store = SqliteStore::connect("sqlite::memory:").await.unwrap();

		let mut later = fixtures::book(9, "Later", "B", None);
		later.status = BookStatus::Issued;
		let books = vec![later, fixtures::book(2, "Earlier", "A", Some("poetry"))];
		store.save_books(&books).await.unwrap();
		assert_eq!(store.load_books().await.unwrap(), books);

		store.save_books(&books[1..]).await.unwrap();
		assert_eq!(store.load_books().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn in_memory_pool_never_recycles_its_connection() {
		let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
		let options = store.db.options();
		assert_eq!(options.get_max_connections(), 1);
		assert_eq!(options.get_min_connections(), 1);
		assert_eq!(options.get_idle_timeout(), None);
		assert_eq!(options.get_max_lifetime(), None);
	}

	#[tokio::test]
	async fn ledger_rows_round_trip_dates() {
		let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
		let day = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
		let later = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
		let user = UserId::new("r@lib.org");

		let rec = IssueRecord { user: user.clone(), book_id: BookId(3), issued_on: day, return_by: later };
		store.save_issued(&[rec.clone()]).await.unwrap();
		assert_eq!(store.issued_to(&user).await.unwrap(), vec![rec]);

		let loan = LoanRecord {
			user: user.clone(),
			book_id: BookId(3),
			issued_on: day,
			return_by: later,
			returned_on: later,
			fine: 0,
		};
		store.save_history(&[loan.clone()]).await.unwrap();
		assert_eq!(store.load_history().await.unwrap(), vec![loan]);

		let fav = Favorite { user: user.clone(), book_id: BookId(4) };
		store.save_favorites(&[fav.clone(), fav.clone()]).await.unwrap();
		assert_eq!(store.load_favorites().await.unwrap(), vec![fav]);
	}

	#[tokio::test]
	async fn accounts_keep_their_role() {
		let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
		store.save_users(&[fixtures::user("lib@lib.org", Role::Librarian)]).await.unwrap();
		let user = store.find_user(&UserId::new("lib@lib.org")).await.unwrap().unwrap();
		assert_eq!(user.role, Role::Librarian);
		assert_eq!(user.mobile, "555-0100");
	}
}
