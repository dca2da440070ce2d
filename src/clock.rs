//! Calendar date source for the day rollover.

use chrono::{Local, NaiveDate, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};

/// Supplies the current calendar date.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Wall clock in device-local time or a fixed IANA timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    tz: Option<Tz>,
}

impl SystemClock {
    pub fn local() -> Self {
        Self { tz: None }
    }

    pub fn with_timezone(tz: Tz) -> Self {
        Self { tz: Some(tz) }
    }

    /// Build from an optional timezone name. Unknown names fall back to local time.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::parse::<Tz>) {
            Some(Ok(tz)) => Self::with_timezone(tz),
            Some(Err(_)) => {
                tracing::warn!("Unknown timezone {:?}, using device-local time", name);
                Self::local()
            }
            None => Self::local(),
        }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).date_naive(),
            None => Local::now().date_naive(),
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    today: Arc<Mutex<NaiveDate>>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Arc::new(Mutex::new(today)),
        }
    }

    /// Move forward by one calendar day.
    pub fn advance_day(&self) {
        let mut today = self.today.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = today.succ_opt() {
            *today = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        clock.advance_day();
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_unknown_timezone_falls_back() {
        let clock = SystemClock::from_name(Some("Nowhere/Special"));
        assert_eq!(clock.today(), Local::now().date_naive());
    }
}
