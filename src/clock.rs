use chrono::{NaiveDate, NaiveDateTime};

pub trait Clock {
    /// Current calendar date in the deployment's local convention.
    fn today(&self) -> NaiveDate;

    /// Timestamp stamped onto stored rows. Always falls on `today()`.
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Pinned date, used when `ATTENDD_TODAY` is set. The time of day still
/// follows the wall clock so stamps keep their order.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }

    fn now(&self) -> NaiveDateTime {
        self.0.and_time(chrono::Local::now().time())
    }
}

pub fn format_stamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S").to_string()
}
