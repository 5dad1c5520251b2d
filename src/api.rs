use std::path::PathBuf;
use std::sync::Arc;

use axum::{
	async_trait,
	extract::{FromRequestParts, Path, State},
	http::{request::Parts, StatusCode},
	routing::{delete, get, post},
	Json, Router,
};
use serde_json::{json, Value};
use tower_cookies::{Cookie, CookieManagerLayer, Cookies};
use tower_http::{services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::{AppError, AppResult};
use crate::library::Library;
use crate::session::{OtpPurpose, Sessions};
use crate::types::{
	Book, BookId, BookSelection, FormForgot, FormLogin, FormOtp, FormReset, FormSignup, IssueReceipt,
	IssuedBook, LoanRecord, NewBookForm, Profile, Recommendations, ReturnForm, ReturnReceipt, User, UserId,
};

pub const SESSION_COOKIE: &str = "sid";

#[derive(Clone)]
pub struct AppState {
	pub library: Arc<Library>,
	pub sessions: Arc<Sessions>,
	pub auth: AuthConfig,
}

impl AppState {
	pub fn new(library: Library, auth: AuthConfig) -> Self {
		AppState { library: Arc::new(library), sessions: Arc::new(Sessions::new()), auth }
	}
}

pub fn router(state: AppState, cover_dir: Option<PathBuf>) -> Router {
	let mut app = Router::new()
		.route("/signup", post(signup))
		.route("/login", post(login))
		.route("/otp/verify", post(verify_otp))
		.route("/logout", post(logout))
		.route("/password/forgot", post(forgot_password))
		.route("/password/reset", post(reset_password))
		.route("/me", get(me))
		.route("/books", get(list_books).post(add_book))
		.route("/books/available", get(available_books))
		.route("/books/:id", delete(delete_book))
		.route("/favorites", get(favorites).post(add_favorite))
		.route("/favorites/:id", delete(remove_favorite))
		.route("/issue", post(issue))
		.route("/issued", get(issued))
		.route("/issued/all", get(all_issued))
		.route("/return", post(return_book))
		.route("/history", get(history))
		.route("/recommendations", get(recommendations));
	if let Some(dir) = cover_dir {
		app = app.nest_service("/covers", ServeDir::new(dir));
	}
	app.layer(CookieManagerLayer::new())
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

/// A request whose session cookie points at an authenticated session.
pub struct CurrentUser {
	pub sid: Uuid,
	pub user: User,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
	type Rejection = AppError;

	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let cookies = Cookies::from_request_parts(parts, state)
			.await
			.map_err(|_| AppError::Unauthenticated)?;
		let sid = existing_session(&cookies).ok_or(AppError::Unauthenticated)?;
		let email = state.sessions.user(sid).await.ok_or(AppError::Unauthenticated)?;
		let user = state.library.user(&email).await?.ok_or(AppError::Unauthenticated)?;
		Ok(CurrentUser { sid, user })
	}
}

fn existing_session(cookies: &Cookies) -> Option<Uuid> {
	cookies.get(SESSION_COOKIE).and_then(|c| Uuid::parse_str(c.value()).ok())
}

// reuses the caller's session id, or hands out a new one
fn session_id(cookies: &Cookies) -> Uuid {
	if let Some(sid) = existing_session(cookies) {
		return sid;
	}
	let sid = Uuid::new_v4();
	cookies.add(Cookie::build((SESSION_COOKIE, sid.to_string())).path("/").http_only(true).build());
	sid
}

async fn signup(State(state): State<AppState>, Json(form): Json<FormSignup>) -> AppResult<(StatusCode, Json<Profile>)> {
	let user = state.library.signup(form).await?;
	Ok((StatusCode::CREATED, Json(Profile::from(&user))))
}

async fn login(State(state): State<AppState>, cookies: Cookies, Json(form): Json<FormLogin>) -> AppResult<Json<Value>> {
	let user = state.library.login(&form.email, &form.password).await?;
	let sid = session_id(&cookies);
	if !state.auth.otp_enabled {
		state.sessions.authenticate(sid, user.email.clone()).await;
		return Ok(Json(json!({ "otp_required": false, "user": Profile::from(&user) })));
	}
	let code = state.sessions.await_otp(sid, user.email.clone(), OtpPurpose::Login).await;
	tracing::info!(user = %user.email, code = %code, "login code issued");
	Ok(Json(json!({
		"otp_required": true,
		"code": state.auth.otp_echo.then(|| code.to_string()),
	})))
}

async fn verify_otp(State(state): State<AppState>, cookies: Cookies, Json(form): Json<FormOtp>) -> AppResult<Json<Profile>> {
	let sid = existing_session(&cookies).ok_or(AppError::InvalidOtp)?;
	let email = state.sessions.check_otp(sid, &form.code, OtpPurpose::Login).await?;
	let user = state.library.user(&email).await?.ok_or(AppError::Unauthenticated)?;
	state.sessions.authenticate(sid, email).await;
	Ok(Json(Profile::from(&user)))
}

async fn logout(State(state): State<AppState>, cookies: Cookies) -> StatusCode {
	if let Some(sid) = existing_session(&cookies) {
		state.sessions.logout(sid).await;
	}
	cookies.remove(Cookie::build(SESSION_COOKIE).path("/").build());
	StatusCode::NO_CONTENT
}

async fn forgot_password(
	State(state): State<AppState>,
	cookies: Cookies,
	Json(form): Json<FormForgot>,
) -> AppResult<(StatusCode, Json<Value>)> {
	let email = UserId::new(&form.email);
	let mut echoed = None;
	// unknown accounts get the same answer and cookie, but no session entry
	let sid = session_id(&cookies);
	if state.library.user(&email).await?.is_some() {
		let code = state.sessions.await_otp(sid, email.clone(), OtpPurpose::PasswordReset).await;
		tracing::info!(user = %email, code = %code, "reset code issued");
		if state.auth.otp_echo {
			echoed = Some(code.to_string());
		}
	}
	Ok((StatusCode::ACCEPTED, Json(json!({ "otp_sent": true, "code": echoed }))))
}

async fn reset_password(State(state): State<AppState>, cookies: Cookies, Json(form): Json<FormReset>) -> AppResult<StatusCode> {
	let sid = existing_session(&cookies).ok_or(AppError::InvalidOtp)?;
	let email = state.sessions.check_otp(sid, &form.code, OtpPurpose::PasswordReset).await?;
	state.library.reset_password(&email, &form.password).await?;
	state.sessions.logout(sid).await;
	Ok(StatusCode::NO_CONTENT)
}

async fn me(current: CurrentUser) -> Json<Profile> {
	Json(Profile::from(&current.user))
}

async fn list_books(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
	Ok(Json(state.library.books().await?))
}

async fn available_books(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
	Ok(Json(state.library.available_books().await?))
}

async fn add_book(
	State(state): State<AppState>,
	current: CurrentUser,
	Json(form): Json<NewBookForm>,
) -> AppResult<(StatusCode, Json<Book>)> {
	let book = state.library.add_book(&current.user, form).await?;
	Ok((StatusCode::CREATED, Json(book)))
}

async fn delete_book(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> AppResult<Json<Book>> {
	Ok(Json(state.library.delete_book(&current.user, BookId(id)).await?))
}

async fn favorites(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Vec<Book>>> {
	Ok(Json(state.library.favorites(&current.user.email).await?))
}

async fn add_favorite(
	State(state): State<AppState>,
	current: CurrentUser,
	Json(form): Json<BookSelection>,
) -> AppResult<Json<Value>> {
	let added = state.library.add_favorite(&current.user, form.book_id).await?;
	Ok(Json(json!({ "added": added })))
}

async fn remove_favorite(State(state): State<AppState>, current: CurrentUser, Path(id): Path<i64>) -> AppResult<StatusCode> {
	state.library.remove_favorite(&current.user.email, BookId(id)).await?;
	Ok(StatusCode::NO_CONTENT)
}

async fn issue(
	State(state): State<AppState>,
	current: CurrentUser,
	Json(form): Json<BookSelection>,
) -> AppResult<Json<IssueReceipt>> {
	Ok(Json(state.library.issue(&current.user.email, form.book_id).await?))
}

async fn issued(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Vec<IssuedBook>>> {
	Ok(Json(state.library.issued_books(&current.user.email).await?))
}

async fn all_issued(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Vec<IssuedBook>>> {
	Ok(Json(state.library.all_issued(&current.user).await?))
}

async fn return_book(
	State(state): State<AppState>,
	current: CurrentUser,
	Json(form): Json<ReturnForm>,
) -> AppResult<Json<ReturnReceipt>> {
	let borrower = form.email.as_deref().map(UserId::new);
	Ok(Json(state.library.return_book(&current.user, form.book_id, borrower).await?))
}

async fn history(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Vec<LoanRecord>>> {
	Ok(Json(state.library.history(&current.user.email).await?))
}

async fn recommendations(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Recommendations>> {
	Ok(Json(state.library.recommend(&current.user.email).await?))
}
