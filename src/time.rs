use chrono::{Days, Duration, NaiveDate};
use std::sync::Mutex;

use crate::error::{AppError, AppResult};

/// Source of "today" for due dates and fines.
pub trait Clock: Send + Sync {
	fn today(&self) -> NaiveDate;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn today(&self) -> NaiveDate {
		chrono::Local::now().date_naive()
	}
}

/// Clock pinned to a date that can be moved forward by hand.
#[derive(Debug)]
pub struct FixedClock(Mutex<NaiveDate>);

impl FixedClock {
	pub fn new(today: NaiveDate) -> Self {
		FixedClock(Mutex::new(today))
	}

	pub fn set(&self, today: NaiveDate) {
		*self.lock() = today;
	}

	pub fn advance(&self, days: i64) {
		let mut today = self.lock();
		*today = *today + Duration::days(days);
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDate> {
		// a poisoned date is still a date
		self.0.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl Clock for FixedClock {
	fn today(&self) -> NaiveDate {
		*self.lock()
	}
}

pub fn due_date(issued_on: NaiveDate, loan_days: u32) -> AppResult<NaiveDate> {
	issued_on
		.checked_add_days(Days::new(u64::from(loan_days)))
		.ok_or_else(|| AppError::Config(format!("a {loan_days} day loan from {issued_on} is past the calendar")))
}
