//! Daily send quota that resets at local midnight

use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use tracing::debug;

use super::QuotaProvider;

struct QuotaInner {
    day: NaiveDate,
    used: u32,
}

/// In-process daily send budget
pub struct DailyQuota {
    limit: u32,
    inner: Mutex<QuotaInner>,
}

impl DailyQuota {
    pub fn new(limit: u32) -> Self {
        debug!(limit, "DailyQuota::new: called");
        Self {
            limit,
            inner: Mutex::new(QuotaInner {
                day: Local::now().date_naive(),
                used: 0,
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    fn with_today<T>(&self, f: impl FnOnce(&mut QuotaInner) -> T) -> T {
        let today = Local::now().date_naive();
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.day != today {
            debug!(%today, "DailyQuota: new day, resetting usage");
            inner.day = today;
            inner.used = 0;
        }
        f(&mut inner)
    }
}

impl QuotaProvider for DailyQuota {
    fn remaining_today(&self) -> u32 {
        self.with_today(|inner| self.limit.saturating_sub(inner.used))
    }

    fn record_send(&self) {
        self.with_today(|inner| inner.used = inner.used.saturating_add(1));
    }
}
