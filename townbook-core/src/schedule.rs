use std::fmt::Display;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bookable time window of a room on a given date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub is_available: bool,
}

impl TimeSlot {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            is_available: true,
        }
    }
}

/// A half-open range of slot indices within a day's schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: usize,
    pub end: usize,
}

impl SlotRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A range covering exactly one slot.
    pub fn single(index: usize) -> Self {
        Self::new(index, index + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &SlotRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

impl Display for SlotRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Slot range is empty")]
    EmptyRange,
    #[error("Slot range {range} is outside of a schedule with {len} slots")]
    OutOfBounds { range: SlotRange, len: usize },
    #[error("Slot {index} is already taken")]
    Taken { index: usize },
    #[error("Slot {index} must end after it starts and after the previous slot")]
    Malformed { index: usize },
}

/// Slot bookkeeping for a day's schedule.
pub trait SlotsExt {
    /// Returns the indices and slots that can still be booked.
    fn free(&self) -> Vec<(usize, &TimeSlot)>;

    /// Returns true if every slot in the range exists and is available.
    fn is_range_free(&self, range: SlotRange) -> Result<bool, ScheduleError>;

    /// Marks every slot in the range as taken, or none if any of them is.
    fn claim(&mut self, range: SlotRange) -> Result<(), ScheduleError>;

    /// Marks every slot in the range as available again.
    fn release(&mut self, range: SlotRange) -> Result<(), ScheduleError>;

    /// Ensures slots are well-formed and ordered without overlap.
    fn validate(&self) -> Result<(), ScheduleError>;
}

impl SlotsExt for Vec<TimeSlot> {
    fn free(&self) -> Vec<(usize, &TimeSlot)> {
        self.iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_available)
            .collect()
    }

    fn is_range_free(&self, range: SlotRange) -> Result<bool, ScheduleError> {
        check_bounds(range, self.len())?;

        Ok(self[range.start..range.end].iter().all(|s| s.is_available))
    }

    fn claim(&mut self, range: SlotRange) -> Result<(), ScheduleError> {
        check_bounds(range, self.len())?;

        if let Some(index) = (range.start..range.end).find(|&i| !self[i].is_available) {
            return Err(ScheduleError::Taken { index });
        }

        self[range.start..range.end]
            .iter_mut()
            .for_each(|s| s.is_available = false);

        Ok(())
    }

    fn release(&mut self, range: SlotRange) -> Result<(), ScheduleError> {
        check_bounds(range, self.len())?;

        self[range.start..range.end]
            .iter_mut()
            .for_each(|s| s.is_available = true);

        Ok(())
    }

    fn validate(&self) -> Result<(), ScheduleError> {
        let mut previous_end: Option<NaiveTime> = None;

        for (index, slot) in self.iter().enumerate() {
            let starts_too_early = previous_end.is_some_and(|end| slot.start < end);

            if slot.end <= slot.start || starts_too_early {
                return Err(ScheduleError::Malformed { index });
            }

            previous_end = Some(slot.end);
        }

        Ok(())
    }
}

fn check_bounds(range: SlotRange, len: usize) -> Result<(), ScheduleError> {
    if range.is_empty() {
        return Err(ScheduleError::EmptyRange);
    }

    if range.end > len {
        return Err(ScheduleError::OutOfBounds { range, len });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn at(hour: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap()
    }

    fn day() -> Vec<TimeSlot> {
        (9..13).map(|h| TimeSlot::new(at(h), at(h + 1))).collect()
    }

    #[test]
    fn test_claim_and_release() {
        let mut slots = day();

        slots.claim(SlotRange::new(1, 3)).unwrap();

        let free: Vec<_> = slots.free().into_iter().map(|(i, _)| i).collect();
        assert_eq!(free, vec![0, 3]);

        assert_eq!(
            slots.claim(SlotRange::new(0, 2)),
            Err(ScheduleError::Taken { index: 1 })
        );
        assert!(
            slots[0].is_available,
            "a failed claim must not take any slot"
        );

        slots.release(SlotRange::single(1)).unwrap();
        assert!(slots.is_range_free(SlotRange::new(0, 2)).unwrap());
        assert!(
            !slots[2].is_available,
            "only the released slot should become free"
        );
    }

    #[test]
    fn test_bounds() {
        let mut slots = day();

        assert_eq!(
            slots.claim(SlotRange::new(3, 5)),
            Err(ScheduleError::OutOfBounds {
                range: SlotRange::new(3, 5),
                len: 4
            })
        );
        assert_eq!(
            slots.is_range_free(SlotRange::new(2, 2)),
            Err(ScheduleError::EmptyRange)
        );
    }

    #[test]
    fn test_validate() {
        assert_eq!(day().validate(), Ok(()));

        let overlapping = vec![
            TimeSlot::new(at(9), at(11)),
            TimeSlot::new(at(10), at(12)),
        ];
        assert_eq!(
            overlapping.validate(),
            Err(ScheduleError::Malformed { index: 1 })
        );

        let backwards = vec![TimeSlot::new(at(11), at(10))];
        assert_eq!(
            backwards.validate(),
            Err(ScheduleError::Malformed { index: 0 })
        );
    }

    #[test]
    fn test_overlaps() {
        assert!(SlotRange::new(0, 2).overlaps(&SlotRange::new(1, 3)));
        assert!(!SlotRange::new(0, 2).overlaps(&SlotRange::new(2, 3)));
    }
}
