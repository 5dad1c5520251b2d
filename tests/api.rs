use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use serde_json::{json, Value};
use tower::ServiceExt;

use libcat::api::{self, AppState};
use libcat::config::AuthConfig;
use libcat::store::MemoryStore;
use libcat::time::FixedClock;
use libcat::types::{Book, BookId, BookStatus};
use libcat::{Library, LoanPolicy};

fn book(id: i64, title: &str, author: &str) -> Book {
	Book {
		id: BookId(id),
		title: title.into(),
		author: author.into(),
		category: None,
		description: String::new(),
		index: String::new(),
		cover: String::new(),
		status: BookStatus::Available,
	}
}

fn app_with(auth: AuthConfig) -> (Router, Arc<FixedClock>) {
	let store = Arc::new(MemoryStore::with_books(vec![
		book(1, "Book A", "X"),
		book(2, "Book B", "X"),
		book(3, "Book C", "Y"),
	]));
	let clock = Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
	let library = Library::new(store, LoanPolicy::default()).with_clock(clock.clone()).with_bcrypt_cost(4);
	(api::router(AppState::new(library, auth), None), clock)
}

fn app() -> (Router, Arc<FixedClock>) {
	app_with(AuthConfig { bcrypt_cost: 4, ..AuthConfig::default() })
}

struct Reply {
	status: StatusCode,
	cookie: Option<String>,
	body: Value,
}

async fn send(app: &Router, method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Reply {
	let mut req = Request::builder().method(method).uri(uri);
	if let Some(cookie) = cookie {
		req = req.header(header::COOKIE, cookie);
	}
	let req = match body {
		Some(body) => req
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.unwrap(),
		None => req.body(Body::empty()).unwrap(),
	};

	let res = app.clone().oneshot(req).await.unwrap();
	let status = res.status();
	let cookie = res
		.headers()
		.get(header::SET_COOKIE)
		.and_then(|v| v.to_str().ok())
		.and_then(|v| v.split(';').next())
		.map(str::to_string);
	let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
	let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
	Reply { status, cookie, body }
}

async fn signup_and_login(app: &Router, email: &str, role: &str) -> String {
	let reply = send(
		app,
		"POST",
		"/signup",
		None,
		Some(json!({ "name": "Reader", "email": email, "mobile": "555", "password": "pw", "role": role })),
	)
	.await;
	assert_eq!(reply.status, StatusCode::CREATED);
	assert!(reply.body.get("password").is_none());

	let reply = send(app, "POST", "/login", None, Some(json!({ "email": email, "password": "pw" }))).await;
	assert_eq!(reply.status, StatusCode::OK);
	assert_eq!(reply.body["otp_required"], false);
	reply.cookie.expect("login sets a session cookie")
}

#[tokio::test]
async fn lending_flow_over_http() {
	let (app, clock) = app();
	let sid = signup_and_login(&app, "ann@lib.org", "Student").await;
	let sid = Some(sid.as_str());

	let me = send(&app, "GET", "/me", sid, None).await;
	assert_eq!(me.body["email"], "ann@lib.org");

	let listed = send(&app, "POST", "/favorites", sid, Some(json!({ "book_id": 1 }))).await;
	assert_eq!(listed.body["added"], true);

	let issued = send(&app, "POST", "/issue", sid, Some(json!({ "book_id": 1 }))).await;
	assert_eq!(issued.status, StatusCode::OK);
	assert_eq!(issued.body["return_by"], "2024-03-08");

	let again = send(&app, "POST", "/issue", sid, Some(json!({ "book_id": 1 }))).await;
	assert_eq!(again.status, StatusCode::CONFLICT);
	assert_eq!(again.body["error"], "\"Book A\" is already issued");

	let available = send(&app, "GET", "/books/available", None, None).await;
	let ids: Vec<i64> = available.body.as_array().unwrap().iter().map(|b| b["id"].as_i64().unwrap()).collect();
	assert_eq!(ids, [2, 3]);

	let recs = send(&app, "GET", "/recommendations", sid, None).await;
	let titles: Vec<&str> = recs.body["books"].as_array().unwrap().iter().map(|b| b["title"].as_str().unwrap()).collect();
	assert_eq!(titles, ["Book B"]);

	clock.advance(10);
	let mine = send(&app, "GET", "/issued", sid, None).await;
	assert_eq!(mine.body[0]["days_left"], -3);

	let back = send(&app, "POST", "/return", sid, Some(json!({ "book_id": 1 }))).await;
	assert_eq!(back.status, StatusCode::OK);
	assert_eq!(back.body["fine"], 15);
	assert_eq!(back.body["on_time"], false);

	let history = send(&app, "GET", "/history", sid, None).await;
	assert_eq!(history.body.as_array().unwrap().len(), 1);
	assert_eq!(send(&app, "GET", "/books/available", None, None).await.body.as_array().unwrap().len(), 3);

	let out = send(&app, "POST", "/logout", sid, None).await;
	assert_eq!(out.status, StatusCode::NO_CONTENT);
	assert_eq!(send(&app, "GET", "/me", sid, None).await.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_requests_are_turned_away() {
	let (app, _) = app();
	assert_eq!(send(&app, "GET", "/issued", None, None).await.status, StatusCode::UNAUTHORIZED);
	assert_eq!(
		send(&app, "GET", "/me", Some("sid=not-a-uuid"), None).await.status,
		StatusCode::UNAUTHORIZED
	);
	let bad = send(&app, "POST", "/login", None, Some(json!({ "email": "x@y.z", "password": "no" }))).await;
	assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_signup_is_a_conflict() {
	let (app, _) = app();
	signup_and_login(&app, "ann@lib.org", "Student").await;
	let dup = send(
		&app,
		"POST",
		"/signup",
		None,
		Some(json!({ "name": "Other Ann", "email": "ANN@lib.org", "password": "x" })),
	)
	.await;
	assert_eq!(dup.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn catalog_changes_need_a_librarian() {
	let (app, _) = app();
	let lib = signup_and_login(&app, "lib@lib.org", "Admin").await;
	let ann = signup_and_login(&app, "ann@lib.org", "Student").await;
	let new_book = json!({ "title": "Emma", "author": "Austen", "category": "classics" });

	let denied = send(&app, "POST", "/books", Some(ann.as_str()), Some(new_book.clone())).await;
	assert_eq!(denied.status, StatusCode::FORBIDDEN);

	let added = send(&app, "POST", "/books", Some(lib.as_str()), Some(new_book)).await;
	assert_eq!(added.status, StatusCode::CREATED);
	assert_eq!(added.body["id"], 4);

	assert_eq!(send(&app, "DELETE", "/books/4", Some(ann.as_str()), None).await.status, StatusCode::FORBIDDEN);
	assert_eq!(send(&app, "DELETE", "/books/4", Some(lib.as_str()), None).await.status, StatusCode::OK);
	assert_eq!(send(&app, "DELETE", "/books/4", Some(lib.as_str()), None).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn otp_login_goes_through_pending() {
	let (app, _) = app_with(AuthConfig { otp_enabled: true, otp_echo: true, bcrypt_cost: 4 });
	send(&app, "POST", "/signup", None, Some(json!({ "name": "Ann", "email": "ann@lib.org", "password": "pw" }))).await;

	let login = send(&app, "POST", "/login", None, Some(json!({ "email": "ann@lib.org", "password": "pw" }))).await;
	assert_eq!(login.body["otp_required"], true);
	let code = login.body["code"].as_str().unwrap().to_string();
	let sid = login.cookie.unwrap();

	assert_eq!(send(&app, "GET", "/me", Some(sid.as_str()), None).await.status, StatusCode::UNAUTHORIZED);

	let wrong = if code == "000000" { "111111" } else { "000000" };
	let rejected = send(&app, "POST", "/otp/verify", Some(sid.as_str()), Some(json!({ "code": wrong }))).await;
	assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);

	let verified = send(&app, "POST", "/otp/verify", Some(sid.as_str()), Some(json!({ "code": code }))).await;
	assert_eq!(verified.status, StatusCode::OK);
	assert_eq!(send(&app, "GET", "/me", Some(sid.as_str()), None).await.status, StatusCode::OK);
}

#[tokio::test]
async fn password_reset_with_code() {
	let (app, _) = app_with(AuthConfig { otp_enabled: false, otp_echo: true, bcrypt_cost: 4 });
	signup_and_login(&app, "ann@lib.org", "Student").await;

	let forgot = send(&app, "POST", "/password/forgot", None, Some(json!({ "email": "ann@lib.org" }))).await;
	assert_eq!(forgot.status, StatusCode::ACCEPTED);
	let code = forgot.body["code"].as_str().unwrap().to_string();
	let sid = forgot.cookie.unwrap();

	let reset = send(&app, "POST", "/password/reset", Some(sid.as_str()), Some(json!({ "code": code, "password": "new" }))).await;
	assert_eq!(reset.status, StatusCode::NO_CONTENT);

	let old = send(&app, "POST", "/login", None, Some(json!({ "email": "ann@lib.org", "password": "pw" }))).await;
	assert_eq!(old.status, StatusCode::UNAUTHORIZED);
	let new = send(&app, "POST", "/login", None, Some(json!({ "email": "ann@lib.org", "password": "new" }))).await;
	assert_eq!(new.status, StatusCode::OK);

	let unknown = send(&app, "POST", "/password/forgot", None, Some(json!({ "email": "who@lib.org" }))).await;
	assert_eq!(unknown.status, StatusCode::ACCEPTED);
	assert!(unknown.body["code"].is_null());
	assert!(unknown.cookie.is_some());
	assert_eq!(unknown.body["otp_sent"], true);
}

#[tokio::test]
async fn reset_code_stops_working_after_repeated_misses() {
	let (app, _) = app_with(AuthConfig { otp_enabled: false, otp_echo: true, bcrypt_cost: 4 });
	signup_and_login(&app, "ann@lib.org", "Student").await;

	let forgot = send(&app, "POST", "/password/forgot", None, Some(json!({ "email": "ann@lib.org" }))).await;
	let code = forgot.body["code"].as_str().unwrap().to_string();
	let sid = forgot.cookie.unwrap();
	let wrong = if code == "000000" { "111111" } else { "000000" };

	for _ in 0..5 {
		let miss = send(&app, "POST", "/password/reset", Some(sid.as_str()), Some(json!({ "code": wrong, "password": "x" }))).await;
		assert_eq!(miss.status, StatusCode::UNAUTHORIZED);
	}
	let late = send(&app, "POST", "/password/reset", Some(sid.as_str()), Some(json!({ "code": code, "password": "x" }))).await;
	assert_eq!(late.status, StatusCode::UNAUTHORIZED);

	let still = send(&app, "POST", "/login", None, Some(json!({ "email": "ann@lib.org", "password": "pw" }))).await;
	assert_eq!(still.status, StatusCode::OK);
}
