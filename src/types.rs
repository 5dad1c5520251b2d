use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub i64);

impl fmt::Display for BookId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Account identity. Emails are compared case-insensitively, so the id is
/// always stored trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct UserId(String);

impl UserId {
	pub fn new(email: &str) -> Self {
		UserId(email.trim().to_lowercase())
	}
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl From<String> for UserId {
	fn from(email: String) -> Self {
		UserId::new(&email)
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
	#[default]
	Student,
	#[serde(alias = "Admin")]
	Librarian,
	Other,
}

impl Role {
	pub fn is_librarian(self) -> bool {
		matches!(self, Role::Librarian)
	}
}

impl fmt::Display for Role {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Role::Student => "Student",
			Role::Librarian => "Librarian",
			Role::Other => "Other",
		})
	}
}

impl FromStr for Role {
	type Err = AppError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"student" => Ok(Role::Student),
			"librarian" | "admin" => Ok(Role::Librarian),
			"other" => Ok(Role::Other),
			_ => Err(AppError::Validation(format!("unknown role {s}"))),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub name: String,
	pub email: UserId,
	#[serde(default)]
	pub mobile: String,
	pub password: String,
	#[serde(default)]
	pub role: Role,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
	#[default]
	Available,
	Issued,
}

impl BookStatus {
	pub fn is_available(self) -> bool {
		matches!(self, BookStatus::Available)
	}
}

impl fmt::Display for BookStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			BookStatus::Available => "available",
			BookStatus::Issued => "issued",
		})
	}
}

impl FromStr for BookStatus {
	type Err = AppError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"available" => Ok(BookStatus::Available),
			"issued" => Ok(BookStatus::Issued),
			_ => Err(AppError::Validation(format!("unknown book status {s}"))),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
	pub id: BookId,
	pub title: String,
	pub author: String,
	#[serde(default)]
	pub category: Option<String>,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub index: String,
	#[serde(default)]
	pub cover: String,
	#[serde(rename = "available", alias = "status", with = "availability", default)]
	pub status: BookStatus,
}

// Stored as the flat files' `"available": bool`; a `"status"` string is
// still read.
mod availability {
	use serde::de::Error;
	use serde::{Deserialize, Deserializer, Serializer};

	use super::BookStatus;

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Flag {
		Available(bool),
		Status(String),
	}

	pub fn serialize<S: Serializer>(status: &BookStatus, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_bool(status.is_available())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BookStatus, D::Error> {
		match Flag::deserialize(d)? {
			Flag::Available(true) => Ok(BookStatus::Available),
			Flag::Available(false) => Ok(BookStatus::Issued),
			Flag::Status(s) => s.parse().map_err(D::Error::custom),
		}
	}
}

impl Book {
	/// Same author, or same non-empty category.
	pub fn is_related_to(&self, other: &Book) -> bool {
		if self.author == other.author {
			return true;
		}
		match (self.category.as_deref(), other.category.as_deref()) {
			(Some(a), Some(b)) => !a.is_empty() && a == b,
			_ => false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
	#[serde(rename = "email")]
	pub user: UserId,
	pub book_id: BookId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
	#[serde(rename = "email")]
	pub user: UserId,
	pub book_id: BookId,
	pub issued_on: NaiveDate,
	pub return_by: NaiveDate,
}

impl IssueRecord {
	// negative once overdue
	pub fn days_left(&self, today: NaiveDate) -> i64 {
		(self.return_by - today).num_days()
	}
	pub fn days_late(&self, today: NaiveDate) -> i64 {
		(-self.days_left(today)).max(0)
	}
}

/// A completed loan, written to the history log on return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
	#[serde(rename = "email")]
	pub user: UserId,
	pub book_id: BookId,
	pub issued_on: NaiveDate,
	pub return_by: NaiveDate,
	pub returned_on: NaiveDate,
	pub fine: i64,
}

#[derive(Debug, Deserialize)]
pub struct FormSignup {
	pub name: String,
	pub email: String,
	#[serde(default)]
	pub mobile: String,
	pub password: String,
	#[serde(default)]
	pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct FormLogin {
	pub email: String,
	pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct FormOtp {
	pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct FormForgot {
	pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct FormReset {
	pub code: String,
	pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBookForm {
	pub title: String,
	pub author: String,
	#[serde(default)]
	pub category: Option<String>,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub index: String,
	#[serde(default)]
	pub cover: String,
}

#[derive(Debug, Deserialize)]
pub struct BookSelection {
	pub book_id: BookId,
}

#[derive(Debug, Deserialize)]
pub struct ReturnForm {
	pub book_id: BookId,
	// librarians may return on behalf of another user
	#[serde(default)]
	pub email: Option<String>,
}

/// User as shown back to clients, without the password.
#[derive(Debug, Clone, Serialize)]
pub struct Profile {
	pub name: String,
	pub email: UserId,
	pub mobile: String,
	pub role: Role,
}

impl From<&User> for Profile {
	fn from(user: &User) -> Self {
		Profile {
			name: user.name.clone(),
			email: user.email.clone(),
			mobile: user.mobile.clone(),
			role: user.role,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedBook {
	pub user: UserId,
	pub book: Book,
	pub issued_on: NaiveDate,
	pub return_by: NaiveDate,
	pub days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueReceipt {
	pub book_id: BookId,
	pub title: String,
	pub issued_on: NaiveDate,
	pub return_by: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnReceipt {
	pub book_id: BookId,
	pub user: UserId,
	pub days_late: i64,
	pub fine: i64,
	pub on_time: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Recommendations {
	/// Books the suggestions are based on.
	pub because: Vec<Book>,
	pub books: Vec<Book>,
}
