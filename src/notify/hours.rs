use crate::config::settings::Settings;
use crate::errors::Result;
use chrono::{DateTime, FixedOffset, Local, Timelike, Utc};
use std::fmt;

/// Hour window during which assignment notifications go out.
///
/// Both bounds are inclusive hours, so the default 8..=18 window is open from
/// 08:00 through 18:59.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusinessHours {
    start_hour: u32,
    end_hour: u32,
    offset: Option<FixedOffset>,
}

impl BusinessHours {
    pub fn new(start_hour: u32, end_hour: u32, offset: Option<FixedOffset>) -> Self {
        Self {
            start_hour,
            end_hour,
            offset,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            settings.notifications.start_hour,
            settings.notifications.end_hour,
            settings.utc_offset()?,
        ))
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour <= self.end_hour
    }

    /// Hour of `now` in the configured offset, or in the host's local zone.
    pub fn local_hour(&self, now: DateTime<Utc>) -> u32 {
        match self.offset {
            Some(offset) => now.with_timezone(&offset).hour(),
            None => now.with_timezone(&Local).hour(),
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.contains_hour(self.local_hour(now))
    }
}

impl fmt::Display for BusinessHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:00-{:02}:59", self.start_hour, self.end_hour)?;
        match self.offset {
            Some(offset) => write!(f, " (UTC{})", offset),
            None => write!(f, " (local time)"),
        }
    }
}
