//! Catalog, booklist and loan lifecycle.
//!
//! Every operation loads the collections it needs in full, changes them in
//! memory and writes the snapshots back. Writers are serialised by one lock
//! so two sessions in this process cannot lose each other's updates; the
//! separate collections are still saved one after the other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::auth;
use crate::config::{LoanPolicy, RecommendFrom};
use crate::error::{AppError, AppResult};
use crate::store::{next_book_id, Store};
use crate::time::{due_date, Clock, SystemClock};
use crate::types::{
	Book, BookId, BookStatus, Favorite, FormSignup, IssueReceipt, IssueRecord, IssuedBook, LoanRecord,
	NewBookForm, Recommendations, ReturnReceipt, User, UserId,
};

pub struct Library {
	store: Arc<dyn Store>,
	clock: Arc<dyn Clock>,
	policy: LoanPolicy,
	bcrypt_cost: u32,
	write: Mutex<()>,
}

impl Library {
	pub fn new(store: Arc<dyn Store>, policy: LoanPolicy) -> Self {
		Library {
			store,
			clock: Arc::new(SystemClock),
			policy,
			bcrypt_cost: bcrypt::DEFAULT_COST,
			write: Mutex::new(()),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
		self.bcrypt_cost = cost;
		self
	}

	pub fn policy(&self) -> &LoanPolicy {
		&self.policy
	}

	// accounts

	pub async fn signup(&self, form: FormSignup) -> AppResult<User> {
		let name = form.name.trim();
		let email = form.email.trim();
		if name.is_empty() {
			return Err(AppError::Validation("name is required".into()));
		}
		if !email.contains('@') {
			return Err(AppError::Validation("a valid email is required".into()));
		}
		if form.password.is_empty() {
			return Err(AppError::Validation("password is required".into()));
		}

		let _guard = self.write.lock().await;
		let mut users = self.store.load_users().await?;
		let id = UserId::new(email);
		if users.iter().any(|u| u.email == id) {
			tracing::warn!(user = %id, "signup rejected, identity taken");
			return Err(AppError::AlreadyExists(format!("user {id}")));
		}
		let user = User {
			name: name.to_string(),
			email: id,
			mobile: form.mobile.trim().to_string(),
			password: auth::hash_password(&form.password, self.bcrypt_cost)?,
			role: form.role,
		};
		users.push(user.clone());
		self.store.save_users(&users).await?;
		tracing::info!(user = %user.email, role = %user.role, "account created");
		Ok(user)
	}

	pub async fn login(&self, email: &str, password: &str) -> AppResult<User> {
		let id = UserId::new(email);
		let users = self.store.load_users().await?;
		match users.into_iter().find(|u| u.email == id) {
			Some(user) if auth::verify_password(password, &user.password)? => {
				tracing::info!(user = %user.email, "credentials accepted");
				Ok(user)
			}
			_ => {
				tracing::warn!(user = %id, "login rejected");
				Err(AppError::InvalidCredentials)
			}
		}
	}

	pub async fn user(&self, email: &UserId) -> AppResult<Option<User>> {
		self.store.find_user(email).await
	}

	pub async fn reset_password(&self, email: &UserId, password: &str) -> AppResult<()> {
		if password.is_empty() {
			return Err(AppError::Validation("password is required".into()));
		}
		let _guard = self.write.lock().await;
		let mut users = self.store.load_users().await?;
		let user = users
			.iter_mut()
			.find(|u| &u.email == email)
			.ok_or_else(|| AppError::NotFound(format!("user {email}")))?;
		user.password = auth::hash_password(password, self.bcrypt_cost)?;
		self.store.save_users(&users).await?;
		tracing::info!(user = %email, "password reset");
		Ok(())
	}

	// catalog

	pub async fn books(&self) -> AppResult<Vec<Book>> {
		self.store.load_books().await
	}

	pub async fn available_books(&self) -> AppResult<Vec<Book>> {
		let mut books = self.store.load_books().await?;
		books.retain(|b| b.status.is_available());
		Ok(books)
	}

	pub async fn add_book(&self, actor: &User, form: NewBookForm) -> AppResult<Book> {
		require_librarian(actor, "add books")?;
		if form.title.trim().is_empty() || form.author.trim().is_empty() {
			return Err(AppError::Validation("title and author are required".into()));
		}

		let _guard = self.write.lock().await;
		let mut books = self.store.load_books().await?;
		let book = Book {
			id: next_book_id(&books),
			title: form.title.trim().to_string(),
			author: form.author.trim().to_string(),
			category: form.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
			description: form.description,
			index: form.index,
			cover: form.cover,
			status: BookStatus::Available,
		};
		books.push(book.clone());
		self.store.save_books(&books).await?;
		tracing::info!(book = %book.id, title = %book.title, "book added");
		Ok(book)
	}

	pub async fn delete_book(&self, actor: &User, book_id: BookId) -> AppResult<Book> {
		require_librarian(actor, "delete books")?;

		let _guard = self.write.lock().await;
		let mut books = self.store.load_books().await?;
		let pos = books
			.iter()
			.position(|b| b.id == book_id)
			.ok_or_else(|| AppError::NotFound(format!("book {book_id}")))?;
		if !books[pos].status.is_available() {
			return Err(AppError::Unavailable(format!(
				"\"{}\" is issued and cannot be deleted until it is returned",
				books[pos].title
			)));
		}
		let book = books.remove(pos);
		self.store.save_books(&books).await?;

		let mut favorites = self.store.load_favorites().await?;
		let before = favorites.len();
		favorites.retain(|f| f.book_id != book_id);
		if favorites.len() != before {
			self.store.save_favorites(&favorites).await?;
		}
		tracing::info!(book = %book.id, title = %book.title, "book deleted");
		Ok(book)
	}

	// booklist

	/// Puts a book on the user's list. Returns false if it was already there.
	pub async fn add_favorite(&self, actor: &User, book_id: BookId) -> AppResult<bool> {
		if actor.role.is_librarian() {
			return Err(AppError::Forbidden("librarians do not keep a booklist".into()));
		}

		let _guard = self.write.lock().await;
		if self.store.find_book(book_id).await?.is_none() {
			return Err(AppError::NotFound(format!("book {book_id}")));
		}
		let mut favorites = self.store.load_favorites().await?;
		if favorites.iter().any(|f| f.user == actor.email && f.book_id == book_id) {
			return Ok(false);
		}
		favorites.push(Favorite { user: actor.email.clone(), book_id });
		self.store.save_favorites(&favorites).await?;
		tracing::info!(user = %actor.email, book = %book_id, "added to booklist");
		Ok(true)
	}

	pub async fn remove_favorite(&self, user: &UserId, book_id: BookId) -> AppResult<()> {
		let _guard = self.write.lock().await;
		let mut favorites = self.store.load_favorites().await?;
		let before = favorites.len();
		favorites.retain(|f| !(&f.user == user && f.book_id == book_id));
		if favorites.len() == before {
			return Err(AppError::NotFound(format!("book {book_id} in your list")));
		}
		self.store.save_favorites(&favorites).await?;
		Ok(())
	}

	pub async fn favorites(&self, user: &UserId) -> AppResult<Vec<Book>> {
		let books = self.store.load_books().await?;
		let catalog = by_id(&books);
		Ok(self
			.store
			.load_favorites()
			.await?
			.iter()
			.filter(|f| &f.user == user)
			.filter_map(|f| catalog.get(&f.book_id).map(|b| (*b).clone()))
			.collect())
	}

	// lifecycle

	pub async fn issue(&self, user: &UserId, book_id: BookId) -> AppResult<IssueReceipt> {
		let _guard = self.write.lock().await;
		let mut books = self.store.load_books().await?;
		let book = books
			.iter_mut()
			.find(|b| b.id == book_id)
			.ok_or_else(|| AppError::NotFound(format!("book {book_id}")))?;
		if !book.status.is_available() {
			tracing::warn!(user = %user, book = %book_id, "issue rejected, already issued");
			return Err(AppError::Unavailable(format!("\"{}\" is already issued", book.title)));
		}

		let mut issued = self.store.load_issued().await?;
		if issued.iter().any(|r| r.book_id == book_id) {
			tracing::warn!(book = %book_id, "ledger holds a record for an available book");
			return Err(AppError::Unavailable(format!("\"{}\" is already issued", book.title)));
		}

		let mut favorites = self.store.load_favorites().await?;
		let listed = favorites.iter().any(|f| &f.user == user && f.book_id == book_id);
		if self.policy.issue_requires_list && !listed {
			return Err(AppError::Unavailable(format!(
				"add \"{}\" to your list before issuing it",
				book.title
			)));
		}

		let today = self.clock.today();
		let record = IssueRecord {
			user: user.clone(),
			book_id,
			issued_on: today,
			return_by: due_date(today, self.policy.loan_days)?,
		};
		book.status = BookStatus::Issued;
		let receipt = IssueReceipt {
			book_id,
			title: book.title.clone(),
			issued_on: record.issued_on,
			return_by: record.return_by,
		};
		issued.push(record);

		self.store.save_books(&books).await?;
		self.store.save_issued(&issued).await?;
		if listed {
			favorites.retain(|f| !(&f.user == user && f.book_id == book_id));
			self.store.save_favorites(&favorites).await?;
		}
		tracing::info!(user = %user, book = %book_id, return_by = %receipt.return_by, "book issued");
		Ok(receipt)
	}

	/// Closes the loan of `book_id`. Librarians may name another borrower;
	/// everyone else returns their own books.
	pub async fn return_book(
		&self,
		actor: &User,
		book_id: BookId,
		borrower: Option<UserId>,
	) -> AppResult<ReturnReceipt> {
		let borrower = match borrower {
			Some(other) if other != actor.email => {
				require_librarian(actor, "return another user's books")?;
				other
			}
			_ => actor.email.clone(),
		};

		let _guard = self.write.lock().await;
		let mut issued = self.store.load_issued().await?;
		let pos = issued
			.iter()
			.position(|r| r.user == borrower && r.book_id == book_id)
			.ok_or_else(|| AppError::NotFound(format!("issued book {book_id} for {borrower}")))?;
		let record = issued.remove(pos);

		let today = self.clock.today();
		let days_late = record.days_late(today);
		let fine = self.policy.fine(days_late);

		let mut books = self.store.load_books().await?;
		match books.iter_mut().find(|b| b.id == book_id) {
			Some(book) => book.status = BookStatus::Available,
			None => tracing::warn!(book = %book_id, "returned book is no longer in the catalog"),
		}

		let mut history = self.store.load_history().await?;
		history.push(LoanRecord {
			user: record.user.clone(),
			book_id,
			issued_on: record.issued_on,
			return_by: record.return_by,
			returned_on: today,
			fine,
		});

		self.store.save_books(&books).await?;
		self.store.save_issued(&issued).await?;
		self.store.save_history(&history).await?;
		tracing::info!(user = %borrower, book = %book_id, days_late, fine, "book returned");
		Ok(ReturnReceipt { book_id, user: borrower, days_late, fine, on_time: fine == 0 })
	}

	pub async fn issued_books(&self, user: &UserId) -> AppResult<Vec<IssuedBook>> {
		let records = self.store.issued_to(user).await?;
		self.resolve(records).await
	}

	pub async fn all_issued(&self, actor: &User) -> AppResult<Vec<IssuedBook>> {
		require_librarian(actor, "see every loan")?;
		let records = self.store.load_issued().await?;
		self.resolve(records).await
	}

	pub async fn history(&self, user: &UserId) -> AppResult<Vec<LoanRecord>> {
		let mut history = self.store.load_history().await?;
		history.retain(|l| &l.user == user);
		Ok(history)
	}

	pub async fn recommend(&self, user: &UserId) -> AppResult<Recommendations> {
		let issued = self.store.issued_to(user).await?;
		let basis: Vec<BookId> = match self.policy.recommend_from {
			RecommendFrom::Latest => issued.last().map(|r| r.book_id).into_iter().collect(),
			RecommendFrom::History => {
				let mut ids: Vec<BookId> = Vec::new();
				let past = self.store.load_history().await?;
				let ever = past.iter().filter(|l| &l.user == user).map(|l| l.book_id);
				for id in ever.chain(issued.iter().map(|r| r.book_id)) {
					if !ids.contains(&id) {
						ids.push(id);
					}
				}
				ids
			}
		};
		if basis.is_empty() {
			tracing::info!(user = %user, "no issue history to recommend from");
			return Ok(Recommendations::default());
		}

		let books = self.store.load_books().await?;
		let catalog = by_id(&books);
		let because: Vec<&Book> = basis.iter().filter_map(|id| catalog.get(id).copied()).collect();
		let suggestions = books
			.iter()
			.filter(|b| b.status.is_available() && !basis.contains(&b.id))
			.filter(|b| because.iter().any(|base| b.is_related_to(base)))
			.cloned()
			.collect();
		Ok(Recommendations { because: because.into_iter().cloned().collect(), books: suggestions })
	}

	async fn resolve(&self, records: Vec<IssueRecord>) -> AppResult<Vec<IssuedBook>> {
		let books = self.store.load_books().await?;
		let catalog = by_id(&books);
		let today = self.clock.today();
		Ok(records
			.into_iter()
			.filter_map(|r| {
				let book = catalog.get(&r.book_id)?;
				Some(IssuedBook {
					days_left: r.days_left(today),
					user: r.user,
					book: (*book).clone(),
					issued_on: r.issued_on,
					return_by: r.return_by,
				})
			})
			.collect())
	}
}

fn by_id(books: &[Book]) -> HashMap<BookId, &Book> {
	books.iter().map(|b| (b.id, b)).collect()
}

fn require_librarian(actor: &User, action: &str) -> AppResult<()> {
	if actor.role.is_librarian() {
		Ok(())
	} else {
		Err(AppError::Forbidden(format!("only librarians can {action}")))
	}
}
