use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// A completed appointment is final. Every other transition is allowed,
/// and re-asserting `completed` is a no-op.
pub fn validate_status_transition(
    current: AppointmentStatus,
    proposed: AppointmentStatus,
) -> Result<(), AppointmentError> {
    if current == AppointmentStatus::Completed && proposed != AppointmentStatus::Completed {
        warn!("Rejected status change {} -> {}", current, proposed);
        return Err(AppointmentError::InvalidStatusTransition(current));
    }

    debug!("Status transition {} -> {} allowed", current, proposed);
    Ok(())
}

/// Moving from a cancelled or no-show status back to an active one puts the
/// appointment on the doctor's calendar again.
pub fn reclaims_slot(current: AppointmentStatus, proposed: AppointmentStatus) -> bool {
    proposed.is_active() && !current.is_active()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    #[test]
    fn completed_cannot_regress() {
        for proposed in ALL.into_iter().filter(|s| *s != AppointmentStatus::Completed) {
            assert_matches!(
                validate_status_transition(AppointmentStatus::Completed, proposed),
                Err(AppointmentError::InvalidStatusTransition(AppointmentStatus::Completed))
            );
        }
        assert!(validate_status_transition(AppointmentStatus::Completed, AppointmentStatus::Completed).is_ok());
    }

    #[test]
    fn other_transitions_are_unrestricted() {
        for current in ALL.into_iter().filter(|s| *s != AppointmentStatus::Completed) {
            for proposed in ALL {
                assert!(validate_status_transition(current, proposed).is_ok());
            }
        }
    }

    #[test]
    fn only_inactive_to_active_reclaims_the_slot() {
        assert!(reclaims_slot(AppointmentStatus::Cancelled, AppointmentStatus::Scheduled));
        assert!(reclaims_slot(AppointmentStatus::NoShow, AppointmentStatus::Confirmed));
        assert!(!reclaims_slot(AppointmentStatus::Scheduled, AppointmentStatus::Confirmed));
        assert!(!reclaims_slot(AppointmentStatus::Confirmed, AppointmentStatus::Cancelled));
        assert!(!reclaims_slot(AppointmentStatus::Cancelled, AppointmentStatus::NoShow));
    }
}
