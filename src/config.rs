use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// Where recommendations take their basis from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecommendFrom {
	/// The user's most recently created active issue record.
	#[default]
	Latest,
	/// Every book the user ever issued, returned ones included.
	History,
}

impl FromStr for RecommendFrom {
	type Err = AppError;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"latest" | "last" => Ok(RecommendFrom::Latest),
			"history" | "all" => Ok(RecommendFrom::History),
			_ => Err(AppError::Config(format!("RECOMMEND_FROM: unknown mode {s}"))),
		}
	}
}

pub const MAX_LOAN_DAYS: u32 = 365;
pub const MAX_FINE_PER_DAY: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanPolicy {
	pub loan_days: u32,
	pub fine_per_day: i64,
	pub issue_requires_list: bool,
	pub recommend_from: RecommendFrom,
}

impl Default for LoanPolicy {
	fn default() -> Self {
		LoanPolicy {
			loan_days: 7,
			fine_per_day: 5,
			issue_requires_list: true,
			recommend_from: RecommendFrom::Latest,
		}
	}
}

impl LoanPolicy {
	pub fn fine(&self, days_late: i64) -> i64 {
		days_late.max(0).saturating_mul(self.fine_per_day)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
	Json { dir: PathBuf, strict: bool },
	Sqlite { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthConfig {
	pub otp_enabled: bool,
	// simulated delivery: hand the code back in the login response
	pub otp_echo: bool,
	pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
	fn default() -> Self {
		AuthConfig { otp_enabled: false, otp_echo: false, bcrypt_cost: bcrypt::DEFAULT_COST }
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	pub bind_addr: SocketAddr,
	pub store: StoreConfig,
	pub cover_dir: PathBuf,
	pub policy: LoanPolicy,
	pub auth: AuthConfig,
}

impl Config {
	pub fn from_env() -> AppResult<Self> {
		Config::from_lookup(|key| std::env::var(key).ok())
	}

	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
		let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

		let store = match lookup("LIBRARY_STORE").as_deref().unwrap_or("json") {
			"json" => StoreConfig::Json {
				dir: lookup("DATA_DIR").unwrap_or_else(|| "data".into()).into(),
				strict: parse_bool(&lookup, "STRICT_STORE", false)?,
			},
			"sqlite" => StoreConfig::Sqlite {
				url: lookup("DATABASE_URL")
					.ok_or_else(|| AppError::Config("DATABASE_URL not set in env".into()))?,
			},
			other => return Err(AppError::Config(format!("LIBRARY_STORE: unknown store {other}"))),
		};

		let defaults = LoanPolicy::default();
		let policy = LoanPolicy {
			loan_days: parse_or(&lookup, "LOAN_DAYS", defaults.loan_days)?,
			fine_per_day: parse_or(&lookup, "FINE_PER_DAY", defaults.fine_per_day)?,
			issue_requires_list: parse_bool(&lookup, "ISSUE_REQUIRES_LIST", defaults.issue_requires_list)?,
			recommend_from: parse_or(&lookup, "RECOMMEND_FROM", defaults.recommend_from)?,
		};
		if !(1..=MAX_LOAN_DAYS).contains(&policy.loan_days) {
			return Err(AppError::Config(format!("LOAN_DAYS must be between 1 and {MAX_LOAN_DAYS}")));
		}
		if !(0..=MAX_FINE_PER_DAY).contains(&policy.fine_per_day) {
			return Err(AppError::Config(format!("FINE_PER_DAY must be between 0 and {MAX_FINE_PER_DAY}")));
		}

		let auth = AuthConfig {
			otp_enabled: parse_bool(&lookup, "OTP_ENABLED", false)?,
			otp_echo: parse_bool(&lookup, "OTP_ECHO", false)?,
			bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", bcrypt::DEFAULT_COST)?,
		};

		Ok(Config {
			bind_addr,
			store,
			cover_dir: lookup("COVER_DIR").unwrap_or_else(|| "covers".into()).into(),
			policy,
			auth,
		})
	}
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> AppResult<T> {
	match lookup(key) {
		None => Ok(default),
		Some(raw) => raw
			.trim()
			.parse()
			.map_err(|_| AppError::Config(format!("{key}: invalid value {raw:?}"))),
	}
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> AppResult<bool> {
	match lookup(key).map(|v| v.trim().to_lowercase()) {
		None => Ok(default),
		Some(v) => match v.as_str() {
			"1" | "true" | "yes" | "on" => Ok(true),
			"0" | "false" | "no" | "off" => Ok(false),
			_ => Err(AppError::Config(format!("{key}: expected a boolean, got {v:?}"))),
		},
	}
}
