//! Slot validation rules. Storage only supplies candidate rows; every
//! decision about a proposed interval is made here.

use chrono::NaiveTime;
use tracing::{debug, warn};
use uuid::Uuid;

use doctor_cell::models::AvailabilityWindow;

use crate::models::{Appointment, AppointmentError};

/// Requested intervals must be non-empty.
pub fn validate_interval(start: NaiveTime, end: NaiveTime) -> Result<(), AppointmentError> {
    if end <= start {
        return Err(AppointmentError::InvalidTime("End time must be after start time".to_string()));
    }
    Ok(())
}

/// Half-open overlap of `[a_start, a_end)` and `[b_start, b_end)`.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && a_end > b_start
}

pub fn window_contains(window: &AvailabilityWindow, start: NaiveTime, end: NaiveTime) -> bool {
    window.is_available && window.start_time <= start && window.end_time >= end
}

/// The interval must sit entirely inside one open window; a gap between
/// two windows on the same day does not count.
pub fn check_availability(
    windows: &[AvailabilityWindow],
    start: NaiveTime,
    end: NaiveTime,
) -> Result<(), AppointmentError> {
    if windows.iter().any(|window| window_contains(window, start, end)) {
        return Ok(());
    }

    warn!("No availability window covers {}-{}", start, end);
    Err(AppointmentError::DoctorNotAvailable)
}

pub fn check_conflicts(
    existing: &[Appointment],
    start: NaiveTime,
    end: NaiveTime,
    exclude_appointment_id: Option<Uuid>,
) -> Result<(), AppointmentError> {
    let conflict = existing
        .iter()
        .filter(|appointment| Some(appointment.id) != exclude_appointment_id)
        .filter(|appointment| appointment.status.is_active())
        .find(|appointment| overlaps(appointment.start_time, appointment.end_time, start, end));

    if let Some(appointment) = conflict {
        warn!("Requested {}-{} overlaps appointment {}", start, end, appointment.id);
        return Err(AppointmentError::SlotAlreadyBooked);
    }

    debug!("No conflicts among {} existing appointments", existing.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, Utc};
    use doctor_cell::models::DayOfWeek;

    use crate::models::AppointmentStatus;

    fn t(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn window(start: NaiveTime, end: NaiveTime, is_available: bool) -> AvailabilityWindow {
        AvailabilityWindow {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            day: DayOfWeek::Monday,
            start_time: start,
            end_time: end,
            is_available,
            created_at: Utc::now(),
        }
    }

    fn appointment(start: NaiveTime, end: NaiveTime, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            appointment_date: NaiveDate::from_ymd_opt(2030, 6, 3).unwrap(),
            start_time: start,
            end_time: end,
            status,
            reason: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_or_reversed_intervals_are_invalid() {
        assert!(validate_interval(t(9, 0), t(10, 0)).is_ok());
        assert_matches!(validate_interval(t(10, 0), t(10, 0)), Err(AppointmentError::InvalidTime(_)));
        assert_matches!(validate_interval(t(11, 0), t(10, 0)), Err(AppointmentError::InvalidTime(_)));
    }

    #[test]
    fn adjacent_intervals_do_not_overlap() {
        assert!(overlaps(t(10, 0), t(11, 0), t(10, 30), t(11, 30)));
        assert!(overlaps(t(10, 0), t(11, 0), t(9, 0), t(12, 0)));
        assert!(!overlaps(t(10, 0), t(11, 0), t(11, 0), t(12, 0)));
        assert!(!overlaps(t(10, 0), t(11, 0), t(9, 0), t(10, 0)));
    }

    #[test]
    fn interval_must_fit_inside_single_window() {
        let windows = vec![window(t(9, 0), t(12, 0), true), window(t(13, 0), t(17, 0), true)];

        assert!(check_availability(&windows, t(9, 0), t(12, 0)).is_ok());
        assert!(check_availability(&windows, t(14, 0), t(15, 0)).is_ok());
        assert_matches!(
            check_availability(&windows, t(11, 30), t(13, 30)),
            Err(AppointmentError::DoctorNotAvailable)
        );
    }

    #[test]
    fn unavailable_windows_are_ignored() {
        let windows = vec![window(t(9, 0), t(17, 0), false)];
        assert_matches!(check_availability(&windows, t(10, 0), t(11, 0)), Err(AppointmentError::DoctorNotAvailable));
        assert_matches!(check_availability(&[], t(10, 0), t(11, 0)), Err(AppointmentError::DoctorNotAvailable));
    }

    #[test]
    fn only_active_appointments_block_the_slot() {
        let cancelled = appointment(t(10, 0), t(11, 0), AppointmentStatus::Cancelled);
        let completed = appointment(t(10, 0), t(11, 0), AppointmentStatus::Completed);
        assert!(check_conflicts(&[cancelled, completed], t(10, 30), t(11, 30), None).is_ok());

        let confirmed = appointment(t(10, 0), t(11, 0), AppointmentStatus::Confirmed);
        assert_matches!(
            check_conflicts(&[confirmed], t(10, 30), t(11, 30), None),
            Err(AppointmentError::SlotAlreadyBooked)
        );
    }

    #[test]
    fn edited_appointment_does_not_conflict_with_itself() {
        let existing = appointment(t(10, 0), t(11, 0), AppointmentStatus::Scheduled);
        let id = existing.id;
        assert!(check_conflicts(&[existing], t(10, 15), t(11, 15), Some(id)).is_ok());
    }
}
