use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ReservationStatus;

/// The status shown to people, derived from stored fields at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Pending,
    Approved,
    /// Approved, but the end date has passed without a return.
    Overdue,
    Declined,
    Completed,
}

/// Projects a stored status onto what should be displayed on `today`.
pub fn display_status(
    status: ReservationStatus,
    end_date: NaiveDate,
    today: NaiveDate,
) -> DisplayStatus {
    match status {
        ReservationStatus::Pending => DisplayStatus::Pending,
        ReservationStatus::Approved if end_date < today => DisplayStatus::Overdue,
        ReservationStatus::Approved => DisplayStatus::Approved,
        ReservationStatus::Declined => DisplayStatus::Declined,
        ReservationStatus::Completed => DisplayStatus::Completed,
    }
}

/// Returns how many days an approved reservation is past its end date.
pub fn days_overdue(status: ReservationStatus, end_date: NaiveDate, today: NaiveDate) -> i64 {
    match display_status(status, end_date, today) {
        DisplayStatus::Overdue => (today - end_date).num_days(),
        _ => 0,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    #[test]
    fn test_overdue_only_when_approved_and_past_end() {
        let today = date(10);

        assert_eq!(
            display_status(ReservationStatus::Approved, date(9), today),
            DisplayStatus::Overdue
        );
        assert_eq!(
            display_status(ReservationStatus::Approved, date(10), today),
            DisplayStatus::Approved,
            "the end date itself is not overdue"
        );
        assert_eq!(
            display_status(ReservationStatus::Pending, date(1), today),
            DisplayStatus::Pending
        );
        assert_eq!(
            display_status(ReservationStatus::Completed, date(1), today),
            DisplayStatus::Completed
        );
    }

    #[test]
    fn test_days_overdue() {
        assert_eq!(days_overdue(ReservationStatus::Approved, date(3), date(10)), 7);
        assert_eq!(days_overdue(ReservationStatus::Declined, date(3), date(10)), 0);
    }
}
