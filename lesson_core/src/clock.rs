//! Calendar date and monotonic time sources.

use chrono::{Local, NaiveDate};
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Supplies "today" for streak bookkeeping and "now" for debouncing
pub trait Clock {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> Instant;
}

/// Wall-clock time in the local timezone
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock, for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    today: Cell<NaiveDate>,
    now: Cell<Instant>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Cell::new(today),
            now: Cell::new(Instant::now()),
        }
    }

    pub fn set_today(&self, date: NaiveDate) {
        self.today.set(date);
    }

    /// Move to the next calendar day
    pub fn next_day(&self) {
        if let Some(next) = self.today.get().succ_opt() {
            self.today.set(next);
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        self.today.get()
    }

    fn now(&self) -> Instant {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for std::rc::Rc<C> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }

    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Format a date as `YYYY-MM-DD`
pub fn iso_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
