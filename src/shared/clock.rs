use chrono::{DateTime, Utc};

/// Source of arrival timestamps. Device clocks are never trusted, so every
/// `received_at` comes from here.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use manual::ManualClock;

#[cfg(test)]
mod manual {
    use super::Clock;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Mutex;

    /// Clock that only moves when a test tells it to.
    pub struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn at_secs(secs: i64) -> Self {
            ManualClock(Mutex::new(Utc.timestamp_opt(secs, 0).unwrap()))
        }

        pub fn set_secs(&self, secs: i64) {
            *self.0.lock().unwrap() = Utc.timestamp_opt(secs, 0).unwrap();
        }

        pub fn advance_secs(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now = *now + Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
