//! Library catalog: accounts, booklists, and the issue / return / fine
//! lifecycle, served as a small JSON API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod library;
pub mod session;
pub mod store;
pub mod time;
pub mod types;

pub use config::{Config, LoanPolicy, RecommendFrom};
pub use error::{AppError, AppResult};
pub use library::Library;
pub use store::Store;
