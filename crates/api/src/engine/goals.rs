use chrono::Utc;
use serde::Serialize;
use stride_core::authorizer::{Authorization, TransitionAuthorizer};
use stride_core::capabilities::{ActorContext, Capability};
use stride_core::error::{require_text, CoreError};
use stride_core::events::{DomainEvent, ENTITY_GOAL};
use stride_core::goal::{
    self, check_transition, ensure_can_adopt, validate_progress, FreezeRequest, Goal, GoalFreezeLog,
    GoalProgressReport, GoalStatus, GoalTransition, NewGoal, Quarter, UnfreezeRequest, MAX_YEAR,
    MIN_YEAR,
};
use stride_core::types::{DbId, Timestamp};
use stride_db::models::event::DomainEventRecord;
use stride_db::models::goal::{CreateFreeze, CreateGoal, CreateProgressReport, CreateUnfreeze};

use super::WorkflowEngine;

type Guard = fn(&ActorContext, &Goal) -> Authorization;

/// Result of a bulk freeze or unfreeze.
#[derive(Debug, Clone, Serialize)]
pub struct FreezeOutcome {
    pub affected_count: i64,
    pub message: String,
    pub log_id: DbId,
}

impl WorkflowEngine {
    // -- Creation and reads --------------------------------------------------

    pub async fn create_goal(&self, actor: &ActorContext, input: NewGoal) -> Result<Goal, CoreError> {
        input.validate()?;
        TransitionAuthorizer::create_goal(actor, input.scope).into_result()?;

        let owner_id = input.owner_id.unwrap_or(actor.user_id);
        let owner_supervisor_id = if owner_id == actor.user_id {
            actor.supervisor_id
        } else {
            if !actor.supervises(owner_id) && !actor.has(Capability::ManageGoals) {
                return Err(CoreError::Forbidden(
                    "Only the owner's supervisor or a goal manager can create goals for others".into(),
                ));
            }
            let owner = self
                .store
                .find_user(owner_id)
                .await?
                .filter(|u| u.is_active)
                .ok_or_else(|| {
                    CoreError::Validation(format!("Owner {owner_id} does not exist or is inactive"))
                })?;
            owner.supervisor_id
        };

        if let Some(parent_id) = input.parent_id {
            let parent = self.store.find_goal(parent_id).await?.ok_or_else(|| {
                CoreError::Validation(format!("Parent goal {parent_id} does not exist"))
            })?;
            ensure_can_adopt(&parent)?;
        }

        let status = goal::initial_status(input.scope);
        let now = Utc::now();
        let create = CreateGoal {
            title: input.title.trim().to_string(),
            description: input.description,
            duration: input.duration,
            scope: input.scope,
            quarter: input.quarter,
            year: input.year,
            status,
            owner_id,
            created_by: actor.user_id,
            parent_id: input.parent_id,
            created_at: now,
        };

        let notify = |created: &Goal| {
            self.notifications.notifications_for(
                &created_event(created, status, owner_supervisor_id),
                Some(actor),
                now,
            )
        };
        let committed = self.store.create_goal(&create, &notify).await?;

        tracing::info!(
            goal_id = committed.value.id,
            owner_id,
            scope = %committed.value.scope,
            %status,
            "Goal created"
        );
        self.outbox
            .emit(
                created_event(&committed.value, status, owner_supervisor_id),
                Some(actor.user_id),
                &committed.notifications,
            )
            .await;
        Ok(committed.value)
    }

    pub async fn get_goal(&self, id: DbId) -> Result<Goal, CoreError> {
        self.load_goal(id).await
    }

    pub async fn child_goals(&self, id: DbId) -> Result<Vec<Goal>, CoreError> {
        self.load_goal(id).await?;
        Ok(self.store.child_goals(id).await?)
    }

    pub async fn progress_reports(&self, id: DbId) -> Result<Vec<GoalProgressReport>, CoreError> {
        self.load_goal(id).await?;
        Ok(self.store.progress_reports(id).await?)
    }

    pub async fn goal_history(&self, id: DbId) -> Result<Vec<DomainEventRecord>, CoreError> {
        self.load_goal(id).await?;
        Ok(self.store.events_for_entity(ENTITY_GOAL, id).await?)
    }

    // -- Transitions ---------------------------------------------------------

    /// Approve (`PENDING_APPROVAL -> ACTIVE`) or reject (reason required).
    pub async fn decide_goal(
        &self,
        actor: &ActorContext,
        id: DbId,
        approved: bool,
        rejection_reason: Option<&str>,
    ) -> Result<Goal, CoreError> {
        if approved {
            self.apply_goal(
                actor,
                id,
                GoalTransition::Approve,
                TransitionAuthorizer::approve_goal,
                |g, now| {
                    g.approved_by = Some(actor.user_id);
                    g.approved_at = Some(now);
                    DomainEvent::GoalApproved { goal: g.summary() }
                },
            )
            .await
        } else {
            let reason = require_text("rejection_reason", rejection_reason)?;
            self.apply_goal(
                actor,
                id,
                GoalTransition::Reject,
                TransitionAuthorizer::approve_goal,
                |g, _| {
                    g.rejection_reason = Some(reason.clone());
                    DomainEvent::GoalRejected {
                        goal: g.summary(),
                        reason,
                    }
                },
            )
            .await
        }
    }

    /// Manually achieve or discard an active goal, then cascade upward.
    ///
    /// Goals with children cannot be achieved by hand. A cascade failure is
    /// logged; the goal's own transition stays committed.
    pub async fn set_goal_status(
        &self,
        actor: &ActorContext,
        id: DbId,
        status: GoalStatus,
    ) -> Result<Goal, CoreError> {
        let goal = match status {
            GoalStatus::Achieved => {
                let children = self.store.child_goals(id).await?;
                if !children.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "Goal {id} has {} sub-goals; its achievement is derived from them",
                        children.len()
                    )));
                }
                self.apply_goal(
                    actor,
                    id,
                    GoalTransition::Achieve,
                    TransitionAuthorizer::manage_goal,
                    |g, now| {
                        g.progress_percentage = 100;
                        g.achieved_at = Some(now);
                        DomainEvent::GoalAchieved {
                            goal: g.summary(),
                            cascaded: false,
                        }
                    },
                )
                .await?
            }
            GoalStatus::Discarded => {
                self.apply_goal(
                    actor,
                    id,
                    GoalTransition::Discard,
                    TransitionAuthorizer::manage_goal,
                    |g, _| DomainEvent::GoalDiscarded { goal: g.summary() },
                )
                .await?
            }
            other => {
                return Err(CoreError::Validation(format!(
                    "status must be ACHIEVED or DISCARDED (got {other})"
                )))
            }
        };

        if let Err(e) = self.cascade.after_change(&goal, Some(actor)).await {
            tracing::error!(goal_id = goal.id, error = %e, "Cascade failed after goal status change");
        }
        Ok(goal)
    }

    /// Manual progress on an active leaf goal. Produces an event but no
    /// notification.
    pub async fn update_progress(
        &self,
        actor: &ActorContext,
        id: DbId,
        new_percentage: i16,
        report: &str,
    ) -> Result<(Goal, GoalProgressReport), CoreError> {
        validate_progress(new_percentage, report)?;

        let mut goal = self.load_goal(id).await?;
        TransitionAuthorizer::manage_goal(actor, &goal).into_result()?;
        goal.ensure_not_frozen()?;
        if goal.status != GoalStatus::Active {
            return Err(CoreError::Conflict(format!(
                "Progress can only be reported on ACTIVE goals (goal {id} is {})",
                goal.status
            )));
        }
        if !self.store.child_goals(id).await?.is_empty() {
            return Err(CoreError::Validation(format!(
                "Goal {id} has sub-goals; its progress is derived from them"
            )));
        }

        let now = Utc::now();
        let previous_percentage = goal.progress_percentage;
        goal.progress_percentage = new_percentage;
        goal.updated_at = now;

        let (goal, report) = self
            .store
            .record_progress(
                &goal,
                &CreateProgressReport {
                    goal_id: id,
                    previous_percentage,
                    new_percentage,
                    report: report.trim().to_string(),
                    reported_by: actor.user_id,
                    created_at: now,
                },
            )
            .await?;

        tracing::info!(goal_id = id, previous_percentage, new_percentage, "Goal progress updated");
        self.outbox
            .emit(
                DomainEvent::GoalProgressUpdated {
                    goal: goal.summary(),
                    previous_percentage,
                    new_percentage,
                },
                Some(actor.user_id),
                &[],
            )
            .await;
        Ok((goal, report))
    }

    // -- Freeze --------------------------------------------------------------

    pub async fn freeze_quarter(
        &self,
        actor: &ActorContext,
        request: FreezeRequest,
    ) -> Result<FreezeOutcome, CoreError> {
        TransitionAuthorizer::freeze_goals(actor).into_result()?;
        let now = Utc::now();
        request.validate(now)?;
        validate_year(request.year)?;

        let input = CreateFreeze {
            quarter: request.quarter,
            year: request.year,
            scheduled_unfreeze_date: request.scheduled_unfreeze_date,
            performed_by: actor.user_id,
            performed_at: now,
        };
        let notify = |goals: &Vec<Goal>| {
            self.notifications.notifications_for(
                &frozen_event(request.quarter, request.year, goals),
                Some(actor),
                now,
            )
        };
        let committed = self.store.freeze_quarter(&input, &notify).await?;
        let batch = committed.value;

        tracing::info!(
            quarter = %request.quarter,
            year = request.year,
            affected = batch.log.affected_goals_count,
            performed_by = actor.user_id,
            "Goals frozen"
        );
        self.outbox
            .emit(
                frozen_event(request.quarter, request.year, &batch.goals),
                Some(actor.user_id),
                &committed.notifications,
            )
            .await;

        Ok(FreezeOutcome {
            affected_count: batch.log.affected_goals_count,
            message: format!(
                "Froze {} goals for {} {}",
                batch.log.affected_goals_count, request.quarter, request.year
            ),
            log_id: batch.log.id,
        })
    }

    pub async fn unfreeze_quarter(
        &self,
        actor: &ActorContext,
        request: UnfreezeRequest,
    ) -> Result<FreezeOutcome, CoreError> {
        TransitionAuthorizer::freeze_goals(actor).into_result()?;
        request.validate()?;
        validate_year(request.year)?;

        let reason = request
            .emergency_reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string);
        self.unfreeze(
            request.quarter,
            request.year,
            request.is_emergency_override,
            reason,
            actor.user_id,
            Some(actor),
        )
        .await
    }

    pub async fn freeze_logs(
        &self,
        quarter: Option<Quarter>,
        year: Option<i32>,
    ) -> Result<Vec<GoalFreezeLog>, CoreError> {
        Ok(self.store.freeze_logs(quarter, year).await?)
    }

    /// Unfreeze every quarter whose scheduled unfreeze date has passed.
    ///
    /// Each runs as a non-emergency unfreeze performed by whoever froze the
    /// quarter. Returns how many quarters were unfrozen.
    pub async fn run_scheduled_unfreezes(&self, now: Timestamp) -> Result<usize, CoreError> {
        let due = self.store.due_scheduled_unfreezes(now).await?;
        let mut done = 0;
        let mut seen: Vec<(Quarter, i32)> = Vec::new();

        for log in due {
            // Several outstanding schedules for one quarter close together.
            if seen.contains(&(log.quarter, log.year)) {
                continue;
            }
            seen.push((log.quarter, log.year));

            match self
                .unfreeze(log.quarter, log.year, false, None, log.performed_by, None)
                .await
            {
                Ok(outcome) => {
                    tracing::info!(
                        quarter = %log.quarter,
                        year = log.year,
                        freeze_log_id = log.id,
                        affected = outcome.affected_count,
                        "Scheduled unfreeze executed"
                    );
                    done += 1;
                }
                Err(e) => {
                    tracing::error!(freeze_log_id = log.id, error = %e, "Scheduled unfreeze failed");
                }
            }
        }

        Ok(done)
    }

    // -- Helpers -------------------------------------------------------------

    /// Commit an unfreeze, then re-evaluate the cascade around every goal
    /// it released.
    async fn unfreeze(
        &self,
        quarter: Quarter,
        year: i32,
        emergency: bool,
        emergency_reason: Option<String>,
        performed_by: DbId,
        actor: Option<&ActorContext>,
    ) -> Result<FreezeOutcome, CoreError> {
        let now = Utc::now();
        let input = CreateUnfreeze {
            quarter,
            year,
            is_emergency_override: emergency,
            emergency_reason,
            performed_by,
            performed_at: now,
        };
        let notify = |goals: &Vec<Goal>| {
            self.notifications.notifications_for(
                &unfrozen_event(quarter, year, emergency, goals),
                actor,
                now,
            )
        };
        let committed = self.store.unfreeze_quarter(&input, &notify).await?;
        let batch = committed.value;

        if emergency {
            tracing::warn!(%quarter, year, performed_by, affected = batch.log.affected_goals_count, "Emergency unfreeze");
        } else {
            tracing::info!(%quarter, year, performed_by, affected = batch.log.affected_goals_count, "Goals unfrozen");
        }
        self.outbox
            .emit(
                unfrozen_event(quarter, year, emergency, &batch.goals),
                actor.map(|a| a.user_id),
                &committed.notifications,
            )
            .await;

        // Parents skipped while frozen, and released goals whose children
        // finished meanwhile.
        let mut candidates: Vec<DbId> = Vec::new();
        for goal in &batch.goals {
            for id in std::iter::once(goal.id).chain(goal.parent_id) {
                if !candidates.contains(&id) {
                    candidates.push(id);
                }
            }
        }
        for goal_id in candidates {
            if let Err(e) = self.cascade.reevaluate(goal_id, actor).await {
                tracing::error!(goal_id, error = %e, "Cascade failed after unfreeze");
            }
        }

        Ok(FreezeOutcome {
            affected_count: batch.log.affected_goals_count,
            message: format!(
                "Unfroze {} goals for {quarter} {year}",
                batch.log.affected_goals_count
            ),
            log_id: batch.log.id,
        })
    }

    /// Load, authorize, check frozen state and the edge, mutate, commit.
    async fn apply_goal(
        &self,
        actor: &ActorContext,
        id: DbId,
        transition: GoalTransition,
        guard: Guard,
        apply: impl FnOnce(&mut Goal, Timestamp) -> DomainEvent,
    ) -> Result<Goal, CoreError> {
        let mut goal = self.load_goal(id).await?;
        guard(actor, &goal).into_result()?;
        goal.ensure_not_frozen()?;
        let next = check_transition(goal.status, transition)?;

        let now = Utc::now();
        goal.status = next;
        goal.updated_at = now;
        let event = apply(&mut goal, now);

        let notifications = self.notifications.notifications_for(&event, Some(actor), now);
        let committed = self.store.update_goal(&goal, notifications).await?;

        tracing::info!(
            goal_id = id,
            %transition,
            status = %next,
            actor_id = actor.user_id,
            "Goal transitioned"
        );
        self.outbox
            .emit(event, Some(actor.user_id), &committed.notifications)
            .await;
        Ok(committed.value)
    }
}

fn validate_year(year: i32) -> Result<(), CoreError> {
    if (MIN_YEAR..=MAX_YEAR).contains(&year) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "year must be between {MIN_YEAR} and {MAX_YEAR}"
        )))
    }
}

fn created_event(goal: &Goal, status: GoalStatus, owner_supervisor_id: Option<DbId>) -> DomainEvent {
    DomainEvent::GoalCreated {
        goal: goal.summary(),
        status,
        owner_supervisor_id,
    }
}

fn distinct_owners(goals: &[Goal]) -> Vec<DbId> {
    let mut owners: Vec<DbId> = goals.iter().map(|g| g.owner_id).collect();
    owners.sort_unstable();
    owners.dedup();
    owners
}

fn frozen_event(quarter: Quarter, year: i32, goals: &[Goal]) -> DomainEvent {
    DomainEvent::GoalsFrozen {
        quarter,
        year,
        affected_count: goals.len() as i64,
        owner_ids: distinct_owners(goals),
    }
}

fn unfrozen_event(quarter: Quarter, year: i32, emergency: bool, goals: &[Goal]) -> DomainEvent {
    DomainEvent::GoalsUnfrozen {
        quarter,
        year,
        affected_count: goals.len() as i64,
        owner_ids: distinct_owners(goals),
        emergency,
    }
}
