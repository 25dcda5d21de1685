use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::config::CalendarSection;

/// Calendar seam between the engine and wall-clock time.
pub trait Clock {
    fn today(&self) -> NaiveDate;
    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate;
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn from_config(calendar: &CalendarSection) -> Self {
        Self::new(calendar.offset())
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        self.date_of(Utc::now())
    }

    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

/// Clock pinned to a given day; instants still honour the offset.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(today: NaiveDate, offset: FixedOffset) -> Self {
        Self { today, offset }
    }

    pub fn utc(today: NaiveDate) -> Self {
        Self::new(today, CalendarSection::default().offset())
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}
