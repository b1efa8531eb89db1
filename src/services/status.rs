use crate::models::assignment::{AssignmentStatus, AssignmentStep};

/// Re-derive an assignment's status from its steps.
///
/// `NeedsAssistance` is sticky: only the assistance workflow may leave it, so
/// step edits made while help is pending never change the status.
pub fn derive(current: AssignmentStatus, steps: &[AssignmentStep]) -> AssignmentStatus {
    if current == AssignmentStatus::NeedsAssistance {
        return current;
    }

    let total = steps.len();
    let completed = steps.iter().filter(|s| s.is_completed).count();

    match completed {
        0 => AssignmentStatus::NotStarted,
        n if n < total => AssignmentStatus::InProgress,
        _ => AssignmentStatus::Completed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn steps(flags: &[bool]) -> Vec<AssignmentStep> {
        let assignment_id = Uuid::new_v4();
        flags
            .iter()
            .enumerate()
            .map(|(i, done)| AssignmentStep {
                id: Uuid::new_v4(),
                assignment_id,
                title: format!("Step {i}"),
                step_order: i as i32,
                is_completed: *done,
                completed_at: None,
            })
            .collect()
    }

    #[test]
    fn no_steps_is_not_started() {
        assert_eq!(
            derive(AssignmentStatus::InProgress, &[]),
            AssignmentStatus::NotStarted
        );
    }

    #[test]
    fn counts_completed_steps() {
        let s = AssignmentStatus::NotStarted;
        assert_eq!(derive(s, &steps(&[false, false])), AssignmentStatus::NotStarted);
        assert_eq!(derive(s, &steps(&[true, false])), AssignmentStatus::InProgress);
        assert_eq!(derive(s, &steps(&[true, true])), AssignmentStatus::Completed);
    }

    #[test]
    fn completed_falls_back_when_a_step_is_unticked() {
        assert_eq!(
            derive(AssignmentStatus::Completed, &steps(&[true, false, true])),
            AssignmentStatus::InProgress
        );
    }

    #[test]
    fn needs_assistance_is_sticky() {
        for flags in [&[][..], &[false][..], &[true, false][..], &[true, true][..]] {
            assert_eq!(
                derive(AssignmentStatus::NeedsAssistance, &steps(flags)),
                AssignmentStatus::NeedsAssistance
            );
        }
    }
}
