use rand::Rng;
use std::fmt;

use crate::error::AppResult;

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
	Ok(bcrypt::hash(password, cost)?)
}

/// Checks a password against what the user store holds. Accounts imported
/// from the flat files may still carry a plaintext password.
pub fn verify_password(password: &str, stored: &str) -> AppResult<bool> {
	if is_bcrypt_hash(stored) {
		return Ok(bcrypt::verify(password, stored)?);
	}
	tracing::warn!("account still stores a plaintext password");
	Ok(password == stored)
}

fn is_bcrypt_hash(stored: &str) -> bool {
	stored.len() == 60 && ["$2a$", "$2b$", "$2x$", "$2y$"].iter().any(|p| stored.starts_with(p))
}

/// Six-digit one-time code. Delivery is simulated: the code is only logged
/// or handed back to the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpCode(String);

impl OtpCode {
	pub fn generate() -> Self {
		let n: u32 = rand::rng().random_range(0..1_000_000);
		OtpCode(format!("{n:06}"))
	}

	pub fn matches(&self, attempt: &str) -> bool {
		self.0 == attempt.trim()
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for OtpCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("OtpCode(******)")
	}
}

impl fmt::Display for OtpCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[cfg(test)]
impl From<&str> for OtpCode {
	fn from(code: &str) -> Self {
		OtpCode(code.to_string())
	}
}
