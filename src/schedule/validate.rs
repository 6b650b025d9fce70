use crate::model::*;

use super::ValidationError;

/// Decide whether `candidate` may join `schedule`. Pure: no I/O, no state.
///
/// Construction of `Interval` already rejected empty and inverted spans, so
/// the only remaining reasons are a foreign schedule or an overlap.
pub fn validate(candidate: &Interval, schedule: &Schedule) -> Result<(), ValidationError> {
    if !candidate.belongs_to(schedule.key()) {
        return Err(ValidationError::WrongSchedule {
            expected: schedule.key().clone(),
            found: candidate.key(),
        });
    }
    let conflicts: Vec<TimeBlock> = schedule.overlapping(&candidate.span).cloned().collect();
    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::Overlap {
            candidate: candidate.span,
            conflicts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: &str, end: &str, owner: &str) -> Interval {
        Interval::parse("Kitchen", "2024-03-01", start, end, owner).unwrap()
    }

    fn schedule(blocks: &[(&str, &str, &str)]) -> Schedule {
        let key = interval("00:00", "00:01", "x").key();
        Schedule::from_blocks(
            key,
            blocks.iter().map(|(id, start, end)| {
                TimeBlock::new(BlockId::parse(id).unwrap(), interval(start, end, "alice"))
            }),
        )
    }

    #[test]
    fn empty_schedule_accepts() {
        assert_eq!(validate(&interval("07:00", "08:00", "bob"), &schedule(&[])), Ok(()));
    }

    #[test]
    fn reports_the_conflicting_block() {
        let s = schedule(&[("a", "07:00", "08:00")]);
        let err = validate(&interval("07:30", "08:30", "bob"), &s).unwrap_err();
        match err {
            ValidationError::Overlap { candidate, conflicts } => {
                assert_eq!(candidate, Span::parse("07:30", "08:30").unwrap());
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id.as_str(), "a");
                assert_eq!(conflicts[0].interval.owner.as_str(), "alice");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reports_every_conflict_in_start_order() {
        let s = schedule(&[
            ("late", "11:00", "12:00"),
            ("early", "07:00", "08:00"),
            ("clear", "12:00", "13:00"),
            ("mid", "09:00", "09:30"),
        ]);
        let err = validate(&interval("07:59", "11:01", "bob"), &s).unwrap_err();
        let ValidationError::Overlap { conflicts, .. } = err else {
            panic!("expected overlap");
        };
        let ids: Vec<_> = conflicts.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["early", "mid", "late"]);
    }

    #[test]
    fn back_to_back_accepted() {
        let s = schedule(&[("a", "07:00", "08:00"), ("b", "09:00", "10:00")]);
        assert!(validate(&interval("08:00", "09:00", "bob"), &s).is_ok());
    }

    #[test]
    fn containment_both_ways_rejected() {
        let s = schedule(&[("a", "10:00", "11:00")]);
        assert!(validate(&interval("09:00", "12:00", "bob"), &s).is_err());
        let s = schedule(&[("a", "09:00", "12:00")]);
        assert!(validate(&interval("10:00", "11:00", "bob"), &s).is_err());
    }

    #[test]
    fn foreign_schedule_rejected() {
        let s = schedule(&[]);
        let other_day = Interval::parse("Kitchen", "2024-03-02", "07:00", "08:00", "bob").unwrap();
        let err = validate(&other_day, &s).unwrap_err();
        assert!(matches!(err, ValidationError::WrongSchedule { .. }));
    }

    #[test]
    fn overlap_message_names_owner() {
        let s = schedule(&[("a", "07:00", "08:00")]);
        let err = validate(&interval("07:30", "08:30", "bob"), &s).unwrap_err();
        assert_eq!(
            err.to_string(),
            "time block [07:30, 08:30) overlaps existing block [07:00, 08:00) (alice)"
        );
    }
}
