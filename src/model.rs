use std::fmt;

use chrono::{NaiveDate, NaiveTime, TimeDelta, Timelike};
use serde::Serialize;

use crate::limits::*;

/// Wire and storage format for calendar days.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Canonical time-of-day format. Parsing also accepts seconds.
pub const TIME_FORMAT: &str = "%H:%M";

const TIME_FORMAT_SECONDS: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    /// `start == end`.
    Empty { at: NaiveTime },
    /// `end < start`. Cross-midnight blocks are not representable.
    Inverted { start: NaiveTime, end: NaiveTime },
    Malformed { field: &'static str, value: String },
    Blank(&'static str),
    TooLong { field: &'static str, max: usize },
}

impl fmt::Display for IntervalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalError::Empty { at } => {
                write!(f, "time block starting and ending at {} is empty", at.format(TIME_FORMAT))
            }
            IntervalError::Inverted { start, end } => write!(
                f,
                "end time {} must be after start time {}",
                end.format(TIME_FORMAT),
                start.format(TIME_FORMAT)
            ),
            IntervalError::Malformed { field, value } => write!(f, "malformed {field}: {value:?}"),
            IntervalError::Blank(field) => write!(f, "{field} must not be blank"),
            IntervalError::TooLong { field, max } => {
                write!(f, "{field} longer than {max} characters")
            }
        }
    }
}

impl std::error::Error for IntervalError {}

fn bounded(field: &'static str, raw: &str, max: usize) -> Result<String, IntervalError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(IntervalError::Blank(field));
    }
    if value.chars().count() > max {
        return Err(IntervalError::TooLong { field, max });
    }
    Ok(value.to_string())
}

macro_rules! bounded_id {
    ($(#[$doc:meta])* $name:ident, $field:literal, $max:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> Result<Self, IntervalError> {
                bounded($field, raw, $max).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

bounded_id!(
    /// A shared location that can be time-sliced ("Kitchen", "Hall").
    ResourceId,
    "location",
    MAX_RESOURCE_LEN
);
bounded_id!(
    /// The house member who booked a block.
    OwnerId,
    "owner",
    MAX_OWNER_LEN
);
bounded_id!(
    /// Repository-assigned identity of a persisted block.
    BlockId,
    "block id",
    MAX_BLOCK_ID_LEN
);

pub fn parse_day(raw: &str) -> Result<NaiveDate, IntervalError> {
    NaiveDate::parse_from_str(raw.trim(), DAY_FORMAT).map_err(|_| IntervalError::Malformed {
        field: "date",
        value: raw.to_string(),
    })
}

pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Result<NaiveTime, IntervalError> {
    let value = raw.trim();
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, TIME_FORMAT_SECONDS))
        .map_err(|_| IntervalError::Malformed {
            field: "time",
            value: raw.to_string(),
        })
}

pub fn format_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

/// Short label for schedule rows: `9am`, `12pm`, `6:30pm`.
pub fn display_hour(t: NaiveTime) -> String {
    let suffix = if t.hour() >= 12 { "pm" } else { "am" };
    let hour = match t.hour() % 12 {
        0 => 12,
        h => h,
    };
    if t.minute() == 0 {
        format!("{hour}{suffix}")
    } else {
        format!("{hour}:{:02}{suffix}", t.minute())
    }
}

/// Half-open time-of-day range `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Span {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, IntervalError> {
        if end == start {
            return Err(IntervalError::Empty { at: start });
        }
        if end < start {
            return Err(IntervalError::Inverted { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, IntervalError> {
        Self::new(parse_time(start)?, parse_time(end)?)
    }

    pub fn duration(&self) -> TimeDelta {
        self.end.signed_duration_since(self.start)
    }

    /// Back-to-back spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_time(self.start), format_time(self.end))
    }
}

/// Identifies one schedule: a location on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ScheduleKey {
    pub resource: ResourceId,
    pub day: NaiveDate,
}

impl ScheduleKey {
    pub fn new(resource: ResourceId, day: NaiveDate) -> Self {
        Self { resource, day }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.resource, format_day(self.day))
    }
}

/// A validated booking request. Construction is the only place the
/// `start < end` invariant is checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub resource: ResourceId,
    pub day: NaiveDate,
    pub span: Span,
    pub owner: OwnerId,
}

impl Interval {
    pub fn new(
        resource: ResourceId,
        day: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        owner: OwnerId,
    ) -> Result<Self, IntervalError> {
        let span = Span::new(start, end)?;
        Ok(Self { resource, day, span, owner })
    }

    /// Build from untyped form/payload text.
    pub fn parse(
        resource: &str,
        day: &str,
        start: &str,
        end: &str,
        owner: &str,
    ) -> Result<Self, IntervalError> {
        Ok(Self {
            resource: ResourceId::parse(resource)?,
            day: parse_day(day)?,
            span: Span::parse(start, end)?,
            owner: OwnerId::parse(owner)?,
        })
    }

    pub fn key(&self) -> ScheduleKey {
        ScheduleKey::new(self.resource.clone(), self.day)
    }

    pub fn belongs_to(&self, key: &ScheduleKey) -> bool {
        self.resource == key.resource && self.day == key.day
    }

    /// Intervals on different locations or days never overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.resource == other.resource && self.day == other.day && self.span.overlaps(&other.span)
    }
}

/// An interval the repository has accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeBlock {
    pub id: BlockId,
    #[serde(flatten)]
    pub interval: Interval,
    /// Display name the server attaches for the owner, if any.
    pub owner_name: Option<String>,
}

impl TimeBlock {
    pub fn new(id: BlockId, interval: Interval) -> Self {
        Self { id, interval, owner_name: None }
    }

    pub fn span(&self) -> Span {
        self.interval.span
    }

    pub fn start(&self) -> NaiveTime {
        self.interval.span.start
    }
}

/// Blocks of one location on one day, sorted by `start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schedule {
    key: ScheduleKey,
    blocks: Vec<TimeBlock>,
}

impl Schedule {
    pub fn new(key: ScheduleKey) -> Self {
        Self { key, blocks: Vec::new() }
    }

    /// Blocks belonging to another schedule are dropped.
    pub fn from_blocks(key: ScheduleKey, blocks: impl IntoIterator<Item = TimeBlock>) -> Self {
        let mut schedule = Self::new(key);
        for block in blocks {
            if block.interval.belongs_to(&schedule.key) {
                schedule.insert(block);
            }
        }
        schedule
    }

    pub fn key(&self) -> &ScheduleKey {
        &self.key
    }

    pub fn blocks(&self) -> &[TimeBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn get(&self, id: &BlockId) -> Option<&TimeBlock> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Insert keeping start order; equal starts keep arrival order.
    pub fn insert(&mut self, block: TimeBlock) {
        let start = block.start();
        let pos = self.blocks.partition_point(|b| b.start() <= start);
        self.blocks.insert(pos, block);
    }

    pub fn remove(&mut self, id: &BlockId) -> Option<TimeBlock> {
        let pos = self.blocks.iter().position(|b| &b.id == id)?;
        Some(self.blocks.remove(pos))
    }

    /// Blocks whose span overlaps `query`.
    /// Binary search skips blocks starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &TimeBlock> {
        let right_bound = self.blocks.partition_point(|b| b.start() < query.end);
        let start = query.start;
        self.blocks[..right_bound]
            .iter()
            .filter(move |b| b.interval.span.end > start)
    }
}
