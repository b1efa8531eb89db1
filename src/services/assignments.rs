use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    db::Store,
    error::{EngineError, EngineResult},
    models::assignment::{
        AssignMeasureRequest, Assignment, AssignmentDetail, AssignmentStatus, NewAssignment,
        NewStep,
    },
    services::{
        activity,
        overdue::{assignment_is_overdue, is_overdue},
    },
};

/// Due instant for an end date: the last second of that day, UTC.
pub fn due_at_for(end_date: NaiveDate) -> DateTime<Utc> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
    end_date.and_time(end_of_day).and_utc()
}

pub struct AssignmentService;

impl AssignmentService {
    /// Assign a measure template to a company, cloning its steps and
    /// snapshotting its descriptive fields.
    pub async fn assign(
        store: &dyn Store,
        req: &AssignMeasureRequest,
        assigned_by: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<AssignmentDetail> {
        let urgency = req.urgency.unwrap_or(1);
        if !(1..=3).contains(&urgency) {
            return Err(EngineError::Validation(format!(
                "urgency must be between 1 and 3, got {urgency}"
            )));
        }

        let start_date = now.date_naive();
        if let Some(end) = req.end_date {
            if end < start_date {
                return Err(EngineError::Validation(
                    "end_date cannot be in the past".into(),
                ));
            }
        }

        store
            .find_company(req.company_id)
            .await?
            .ok_or_else(|| EngineError::not_found("company", req.company_id))?;
        let template = store
            .find_measure_template(req.measure_id)
            .await?
            .ok_or_else(|| EngineError::not_found("measure", req.measure_id))?;

        if store
            .find_live_assignment(req.company_id, req.measure_id)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "\"{}\" is already assigned to this company",
                template.name
            )));
        }

        let new = NewAssignment {
            company_id: req.company_id,
            measure_id: template.id,
            status: AssignmentStatus::NotStarted,
            urgency,
            start_date,
            end_date: req.end_date,
            due_at: req.end_date.map(due_at_for),
            target: template.target.clone(),
            departments: template.departments.clone(),
            responsible: template.responsible.clone(),
            participants: template.participants.clone(),
        };
        let mut steps: Vec<NewStep> = template
            .steps
            .iter()
            .map(|s| NewStep {
                title: s.title.clone(),
                step_order: s.step_order,
            })
            .collect();
        steps.sort_by_key(|s| s.step_order);

        let assignment = store.create_assignment(&new, &steps).await?;

        activity::record(
            store,
            activity::entry(
                Some(assigned_by),
                "measure_assigned",
                "assignment",
                assignment.id,
                json!({ "measure_id": template.id, "company_id": req.company_id }),
                now,
            ),
        )
        .await;

        info!(
            "Assigned measure '{}' to company {} ({} step(s))",
            template.name,
            req.company_id,
            steps.len()
        );

        Self::detail(store, assignment.id, None, now).await
    }

    /// Soft-delete an assignment; its history stays in place.
    pub async fn unassign(
        store: &dyn Store,
        id: Uuid,
        deleted_by: Uuid,
        now: DateTime<Utc>,
    ) -> EngineResult<()> {
        if !store.soft_delete_assignment(id, deleted_by, now).await? {
            return Err(EngineError::not_found("assignment", id));
        }

        activity::record(
            store,
            activity::entry(
                Some(deleted_by),
                "measure_unassigned",
                "assignment",
                id,
                json!({}),
                now,
            ),
        )
        .await;

        info!("Unassigned assignment {id}");
        Ok(())
    }

    /// Flip one step and re-derive the assignment status.
    ///
    /// While the assignment needs assistance the step still flips but the
    /// status stays put.
    pub async fn toggle_step(
        store: &dyn Store,
        step_id: Uuid,
        user_id: Option<Uuid>,
        company_scope: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> EngineResult<AssignmentDetail> {
        let mut step = store
            .find_step(step_id)
            .await?
            .ok_or_else(|| EngineError::not_found("step", step_id))?;
        let assignment = Self::load(store, step.assignment_id, company_scope).await?;

        step.is_completed = !step.is_completed;
        step.completed_at = step.is_completed.then_some(now);

        let new_status = store.save_step_and_status(&step).await?;
        let steps = store.list_steps(assignment.id).await?;

        activity::record(
            store,
            activity::entry(
                user_id,
                if step.is_completed { "step_completed" } else { "step_reopened" },
                "assignment",
                assignment.id,
                json!({
                    "step_id": step.id,
                    "title": step.title,
                    "status": new_status,
                }),
                now,
            ),
        )
        .await;

        if new_status != assignment.status {
            info!(
                "Assignment {} moved {} -> {}",
                assignment.id, assignment.status, new_status
            );
        }

        Ok(AssignmentDetail {
            is_overdue: is_overdue(new_status, assignment.due_at, now),
            assignment: Assignment {
                status: new_status,
                ..assignment
            },
            steps,
        })
    }

    pub async fn detail(
        store: &dyn Store,
        id: Uuid,
        company_scope: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> EngineResult<AssignmentDetail> {
        let assignment = Self::load(store, id, company_scope).await?;
        let steps = store.list_steps(id).await?;
        Ok(AssignmentDetail {
            is_overdue: assignment_is_overdue(&assignment, now),
            assignment,
            steps,
        })
    }

    pub async fn list(
        store: &dyn Store,
        company_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<AssignmentDetail>> {
        let assignments = store.list_assignments(company_id).await?;
        let mut details = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let steps = store.list_steps(assignment.id).await?;
            details.push(AssignmentDetail {
                is_overdue: assignment_is_overdue(&assignment, now),
                assignment,
                steps,
            });
        }
        Ok(details)
    }

    async fn load(
        store: &dyn Store,
        id: Uuid,
        company_scope: Option<Uuid>,
    ) -> EngineResult<Assignment> {
        let assignment = store
            .find_assignment(id)
            .await?
            .ok_or_else(|| EngineError::not_found("assignment", id))?;
        match company_scope {
            Some(company_id) if assignment.company_id != company_id => {
                Err(EngineError::not_found("assignment", id))
            }
            _ => Ok(assignment),
        }
    }
}
