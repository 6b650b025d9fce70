use std::fmt;

use crate::model::*;
use crate::repository::RepositoryError;

use super::Phase;

/// Why the validator refused a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Conflicting blocks, ordered by start.
    Overlap {
        candidate: Span,
        conflicts: Vec<TimeBlock>,
    },
    WrongSchedule {
        expected: ScheduleKey,
        found: ScheduleKey,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Overlap { candidate, conflicts } => {
                write!(f, "time block {candidate} overlaps existing block")?;
                if conflicts.len() > 1 {
                    write!(f, "s")?;
                }
                for (i, block) in conflicts.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{} ({})", block.span(), block.interval.owner)?;
                }
                Ok(())
            }
            ValidationError::WrongSchedule { expected, found } => {
                write!(f, "candidate for {found} checked against schedule {expected}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Everything a scheduling call can fail with. Each kind stays distinct so a
/// caller can tell "this clashes with what you see" (`Overlap`) from
/// "someone else just took it" (`Conflict`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    Invalid(IntervalError),
    Overlap {
        candidate: Span,
        conflicts: Vec<TimeBlock>,
    },
    /// The repository refused the booking because of a concurrent one.
    Conflict(Option<BlockId>),
    Repository(RepositoryError),
    NotReady(Phase),
    NoSelection,
    SelectionMismatch {
        selected: Option<ScheduleKey>,
        requested: ScheduleKey,
    },
    UnknownLocation(ResourceId),
    RemovalPending(BlockId),
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::Invalid(e) => write!(f, "invalid time block: {e}"),
            ScheduleError::Overlap { candidate, conflicts } => write!(
                f,
                "{}",
                ValidationError::Overlap {
                    candidate: *candidate,
                    conflicts: conflicts.clone(),
                }
            ),
            ScheduleError::Conflict(_) => write!(f, "someone else just booked this slot"),
            ScheduleError::Repository(e) => write!(f, "{e}"),
            ScheduleError::NotReady(phase) => write!(f, "schedule is {phase}, not ready"),
            ScheduleError::NoSelection => write!(f, "no location and day selected"),
            ScheduleError::SelectionMismatch { selected: Some(selected), requested } => {
                write!(f, "{requested} is not the selected schedule ({selected})")
            }
            ScheduleError::SelectionMismatch { selected: None, requested } => {
                write!(f, "{requested} is not the selected schedule (none selected)")
            }
            ScheduleError::UnknownLocation(id) => write!(f, "unknown location: {id}"),
            ScheduleError::RemovalPending(id) => {
                write!(f, "removal of {id} is already in progress")
            }
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<IntervalError> for ScheduleError {
    fn from(e: IntervalError) -> Self {
        ScheduleError::Invalid(e)
    }
}

impl From<ValidationError> for ScheduleError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Overlap { candidate, conflicts } => {
                ScheduleError::Overlap { candidate, conflicts }
            }
            ValidationError::WrongSchedule { expected, found } => ScheduleError::SelectionMismatch {
                selected: Some(expected),
                requested: found,
            },
        }
    }
}

impl From<RepositoryError> for ScheduleError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(id) => ScheduleError::Conflict(id),
            other => ScheduleError::Repository(other),
        }
    }
}

impl ScheduleError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleError::Invalid(_) => "invalid",
            ScheduleError::Overlap { .. } => "overlap",
            ScheduleError::Conflict(_) => "conflict",
            ScheduleError::Repository(_) => "repository",
            ScheduleError::NotReady(_) => "not_ready",
            ScheduleError::NoSelection => "no_selection",
            ScheduleError::SelectionMismatch { .. } => "selection_mismatch",
            ScheduleError::UnknownLocation(_) => "unknown_location",
            ScheduleError::RemovalPending(_) => "removal_pending",
        }
    }
}
