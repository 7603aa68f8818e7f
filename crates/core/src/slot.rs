//! Shift slots: the `(date, shift)` unit that availability and jobs share.

use core::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// Part of the day a job runs in, or a worker is free for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shift {
    Morning,
    Afternoon,
    Evening,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Afternoon, Shift::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Morning => "Morning",
            Shift::Afternoon => "Afternoon",
            Shift::Evening => "Evening",
        }
    }
}

impl core::fmt::Display for Shift {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Shift {
    type Err = SlotParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Shift::ALL
            .into_iter()
            .find(|shift| shift.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SlotParseError::InvalidShift(s.to_string()))
    }
}

/// Errors raised while turning raw request fields into a [`ShiftSlot`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlotParseError {
    #[error("invalid date '{0}': expected YYYY-MM-DD or an RFC 3339 timestamp")]
    InvalidDate(String),

    #[error("invalid shift '{0}': expected Morning, Afternoon or Evening")]
    InvalidShift(String),
}

impl From<SlotParseError> for DomainError {
    fn from(value: SlotParseError) -> Self {
        DomainError::validation(value.to_string())
    }
}

/// A calendar day plus a shift.
///
/// Dates are held at day granularity; timestamps are truncated to their UTC
/// calendar day on parse, so two slots are equal exactly when day and shift
/// are equal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShiftSlot {
    pub date: NaiveDate,
    pub shift: Shift,
}

impl ValueObject for ShiftSlot {}

impl ShiftSlot {
    pub fn new(date: NaiveDate, shift: Shift) -> Self {
        Self { date, shift }
    }

    /// Parse raw request fields.
    pub fn parse(date: &str, shift: &str) -> Result<Self, SlotParseError> {
        let date = parse_day(date)?;
        let shift = shift.parse()?;
        Ok(Self { date, shift })
    }
}

impl core::fmt::Display for ShiftSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.date, self.shift)
    }
}

/// Parse a day from `YYYY-MM-DD` or an RFC 3339 timestamp (truncated to UTC).
pub fn parse_day(raw: &str) -> Result<NaiveDate, SlotParseError> {
    let trimmed = raw.trim();
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(day);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| SlotParseError::InvalidDate(raw.to_string()))
}
