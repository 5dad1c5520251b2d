use std::collections::HashMap;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::auth::OtpCode;
use crate::error::{AppError, AppResult};
use crate::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
	Login,
	PasswordReset,
}

/// Wrong codes a pending session may take before it is dropped.
pub const MAX_OTP_MISSES: u8 = 5;

/// `Anonymous -> PendingOtp -> Authenticated`, or straight to
/// `Authenticated` when no code is asked for. Logout drops the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
	#[default]
	Anonymous,
	PendingOtp { user: UserId, code: OtpCode, purpose: OtpPurpose, misses: u8 },
	Authenticated { user: UserId },
}

/// Per-process session table keyed by the cookie's session id.
#[derive(Debug, Default)]
pub struct Sessions {
	states: Mutex<HashMap<Uuid, SessionState>>,
}

impl Sessions {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn state(&self, sid: Uuid) -> SessionState {
		self.states.lock().await.get(&sid).cloned().unwrap_or_default()
	}

	pub async fn user(&self, sid: Uuid) -> Option<UserId> {
		match self.states.lock().await.get(&sid) {
			Some(SessionState::Authenticated { user }) => Some(user.clone()),
			_ => None,
		}
	}

	pub async fn authenticate(&self, sid: Uuid, user: UserId) {
		self.states.lock().await.insert(sid, SessionState::Authenticated { user });
	}

	/// Parks the session on a fresh code and returns it for delivery.
	pub async fn await_otp(&self, sid: Uuid, user: UserId, purpose: OtpPurpose) -> OtpCode {
		let code = OtpCode::generate();
		let state = SessionState::PendingOtp { user, code: code.clone(), purpose, misses: 0 };
		self.states.lock().await.insert(sid, state);
		code
	}

	/// Checks a code without moving the session on; the caller decides where
	/// it goes next. A wrong code leaves the session pending until
	/// `MAX_OTP_MISSES` of them, then the session is dropped.
	pub async fn check_otp(&self, sid: Uuid, attempt: &str, purpose: OtpPurpose) -> AppResult<UserId> {
		let mut states = self.states.lock().await;
		let Some(SessionState::PendingOtp { user, code, purpose: p, misses }) = states.get_mut(&sid) else {
			return Err(AppError::InvalidOtp);
		};
		if *p == purpose && code.matches(attempt) {
			return Ok(user.clone());
		}
		*misses += 1;
		if *misses >= MAX_OTP_MISSES {
			tracing::warn!(user = %user, "too many wrong codes, session dropped");
			states.remove(&sid);
		}
		Err(AppError::InvalidOtp)
	}

	pub async fn logout(&self, sid: Uuid) {
		self.states.lock().await.remove(&sid);
	}
}
