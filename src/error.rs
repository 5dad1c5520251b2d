use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
	#[error("{0}")]
	Validation(String),
	#[error("{0} already exists")]
	AlreadyExists(String),
	#[error("invalid login details")]
	InvalidCredentials,
	#[error("not logged in")]
	Unauthenticated,
	#[error("invalid or expired code")]
	InvalidOtp,
	#[error("{0}")]
	Forbidden(String),
	#[error("{0} not found")]
	NotFound(String),
	// non-fatal, shown to the user as a warning
	#[error("{0}")]
	Unavailable(String),
	#[error("configuration error: {0}")]
	Config(String),
	#[error("storage io failed")]
	Io(#[from] std::io::Error),
	#[error("storage encoding failed")]
	Json(#[from] serde_json::Error),
	#[error("database query failed")]
	Database(#[from] sqlx::Error),
	#[error("password hashing failed")]
	Hash(#[from] bcrypt::BcryptError),
}

impl AppError {
	pub fn status(&self) -> StatusCode {
		match self {
			AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
			AppError::AlreadyExists(_) | AppError::Unavailable(_) => StatusCode::CONFLICT,
			AppError::InvalidCredentials | AppError::Unauthenticated | AppError::InvalidOtp => {
				StatusCode::UNAUTHORIZED
			}
			AppError::Forbidden(_) => StatusCode::FORBIDDEN,
			AppError::NotFound(_) => StatusCode::NOT_FOUND,
			AppError::Config(_)
			| AppError::Io(_)
			| AppError::Json(_)
			| AppError::Database(_)
			| AppError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for AppError {
	fn into_response(self) -> axum::response::Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(
				error.cause_chain = ?self,
				error.message = %self,
				"unexpected error happened"
			);
		}
		let body = Json(serde_json::json!({ "error": self.to_string() }));
		(status, body).into_response()
	}
}

pub type AppResult<T> = Result<T, AppError>;
