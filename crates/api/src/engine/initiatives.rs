use chrono::Utc;
use stride_core::authorizer::{Authorization, TransitionAuthorizer};
use stride_core::capabilities::{ActorContext, Capability};
use stride_core::error::{require_text, CoreError};
use stride_core::events::{DomainEvent, ENTITY_INITIATIVE};
use stride_core::initiative::{
    self, check_transition, validate_extension_date, validate_score, ExtensionStatus, Initiative,
    InitiativeExtension, InitiativeStatus, InitiativeSummary, InitiativeTransition, NewInitiative,
};
use stride_core::types::{DbId, Timestamp};
use stride_db::models::event::DomainEventRecord;
use stride_db::models::initiative::{CreateExtension, CreateInitiative};
use stride_db::StoreError;

use super::WorkflowEngine;

type Guard = fn(&ActorContext, &Initiative) -> Authorization;

impl WorkflowEngine {
    // -- Creation ------------------------------------------------------------

    pub async fn create_initiative(
        &self,
        actor: &ActorContext,
        input: NewInitiative,
    ) -> Result<Initiative, CoreError> {
        input.validate()?;

        for &assignee_id in &input.assignee_ids {
            let assignee = self
                .store
                .find_user(assignee_id)
                .await?
                .filter(|u| u.is_active)
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Assignee {assignee_id} does not exist or is inactive"
                    ))
                })?;
            if assignee_id != actor.user_id
                && !actor.has(Capability::AssignAcrossDepartments)
                && assignee.department_id != actor.department_id
            {
                return Err(CoreError::Forbidden(format!(
                    "Assignee {assignee_id} is outside your department"
                )));
            }
        }

        if let Some(goal_id) = input.goal_id {
            if self.store.find_goal(goal_id).await?.is_none() {
                return Err(CoreError::Validation(format!(
                    "Goal {goal_id} does not exist"
                )));
            }
        }

        let status = initiative::initial_status(actor, &input.assignee_ids);
        let supervisor_id = actor.supervisor_id;
        let now = Utc::now();
        let create = CreateInitiative {
            title: input.title.trim().to_string(),
            description: input.description,
            kind: input.kind,
            status,
            creator_id: actor.user_id,
            assignee_ids: input.assignee_ids,
            team_head_id: input.team_head_id,
            goal_id: input.goal_id,
            due_date: input.due_date,
            urgency: input.urgency,
            created_at: now,
        };

        let notify = |created: &Initiative| {
            self.notifications.notifications_for(
                &created_event(created, status, supervisor_id),
                Some(actor),
                now,
            )
        };
        let committed = self.store.create_initiative(&create, &notify).await?;

        tracing::info!(
            initiative_id = committed.value.id,
            creator_id = actor.user_id,
            %status,
            "Initiative created"
        );
        self.outbox
            .emit(
                created_event(&committed.value, status, supervisor_id),
                Some(actor.user_id),
                &committed.notifications,
            )
            .await;
        Ok(committed.value)
    }

    pub async fn get_initiative(&self, id: DbId) -> Result<Initiative, CoreError> {
        self.load_initiative(id).await
    }

    /// Logged domain events for one initiative, oldest first.
    pub async fn initiative_history(&self, id: DbId) -> Result<Vec<DomainEventRecord>, CoreError> {
        self.load_initiative(id).await?;
        Ok(self.store.events_for_entity(ENTITY_INITIATIVE, id).await?)
    }

    // -- Transitions ---------------------------------------------------------

    /// Approve (`PENDING_APPROVAL -> PENDING`) or reject
    /// (`PENDING_APPROVAL -> REJECTED`, reason required).
    pub async fn decide_initiative(
        &self,
        actor: &ActorContext,
        id: DbId,
        approved: bool,
        rejection_reason: Option<&str>,
    ) -> Result<Initiative, CoreError> {
        if approved {
            self.apply_initiative(
                actor,
                id,
                InitiativeTransition::Approve,
                TransitionAuthorizer::approve_initiative,
                |i, now| {
                    i.approved_at = Some(now);
                    Ok(DomainEvent::InitiativeApproved {
                        initiative: i.summary(),
                    })
                },
            )
            .await
        } else {
            let reason = require_text("rejection_reason", rejection_reason)?;
            self.apply_initiative(
                actor,
                id,
                InitiativeTransition::Reject,
                TransitionAuthorizer::approve_initiative,
                |i, _| {
                    i.feedback = Some(reason.clone());
                    Ok(DomainEvent::InitiativeRejected {
                        initiative: i.summary(),
                        reason,
                    })
                },
            )
            .await
        }
    }

    /// `ASSIGNED -> PENDING`.
    pub async fn accept_initiative(&self, actor: &ActorContext, id: DbId) -> Result<Initiative, CoreError> {
        self.apply_initiative(
            actor,
            id,
            InitiativeTransition::Accept,
            TransitionAuthorizer::work_on_initiative,
            |i, _| {
                Ok(DomainEvent::InitiativeAccepted {
                    initiative: i.summary(),
                })
            },
        )
        .await
    }

    /// `PENDING -> ONGOING`.
    pub async fn start_initiative(&self, actor: &ActorContext, id: DbId) -> Result<Initiative, CoreError> {
        self.apply_initiative(
            actor,
            id,
            InitiativeTransition::Start,
            TransitionAuthorizer::work_on_initiative,
            |i, _| {
                Ok(DomainEvent::InitiativeStarted {
                    initiative: i.summary(),
                })
            },
        )
        .await
    }

    /// `ONGOING -> UNDER_REVIEW`, with a completion report. Blocked while the
    /// initiative is overdue; an approved extension unblocks it.
    pub async fn submit_initiative(
        &self,
        actor: &ActorContext,
        id: DbId,
        report: Option<&str>,
    ) -> Result<Initiative, CoreError> {
        let report = require_text("report", report)?;
        self.apply_initiative(
            actor,
            id,
            InitiativeTransition::Submit,
            TransitionAuthorizer::submit_initiative,
            |i, now| {
                if i.is_overdue(now) {
                    return Err(CoreError::Conflict(format!(
                        "Initiative {} is overdue; request an extension before submitting",
                        i.id
                    )));
                }
                i.completion_report = Some(report);
                Ok(DomainEvent::InitiativeSubmitted {
                    initiative: i.summary(),
                })
            },
        )
        .await
    }

    /// `UNDER_REVIEW -> APPROVED` with a score, or back to `ONGOING` with
    /// feedback.
    pub async fn review_initiative(
        &self,
        actor: &ActorContext,
        id: DbId,
        approved: bool,
        score: Option<i16>,
        feedback: Option<&str>,
    ) -> Result<Initiative, CoreError> {
        if approved {
            let score = validate_score(score)?;
            let feedback = feedback
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string);
            self.apply_initiative(
                actor,
                id,
                InitiativeTransition::ApproveReview,
                TransitionAuthorizer::review_initiative,
                |i, now| {
                    i.score = Some(score);
                    i.feedback = feedback.clone();
                    i.reviewed_at = Some(now);
                    Ok(DomainEvent::InitiativeReviewed {
                        initiative: i.summary(),
                        approved: true,
                        score: Some(score),
                        feedback,
                    })
                },
            )
            .await
        } else {
            let feedback = require_text("feedback", feedback)?;
            self.apply_initiative(
                actor,
                id,
                InitiativeTransition::RequestRedo,
                TransitionAuthorizer::review_initiative,
                |i, now| {
                    i.feedback = Some(feedback.clone());
                    i.reviewed_at = Some(now);
                    Ok(DomainEvent::InitiativeReviewed {
                        initiative: i.summary(),
                        approved: false,
                        score: None,
                        feedback: Some(feedback),
                    })
                },
            )
            .await
        }
    }

    // -- Extensions ----------------------------------------------------------

    pub async fn request_extension(
        &self,
        actor: &ActorContext,
        initiative_id: DbId,
        new_due_date: Timestamp,
        reason: Option<&str>,
    ) -> Result<InitiativeExtension, CoreError> {
        let reason = require_text("reason", reason)?;
        let now = Utc::now();
        validate_extension_date(new_due_date, now)?;

        let initiative = self.load_initiative(initiative_id).await?;
        TransitionAuthorizer::submit_initiative(actor, &initiative).into_result()?;
        if !initiative.is_overdue(now) {
            return Err(CoreError::Conflict(format!(
                "Initiative {initiative_id} is not overdue"
            )));
        }
        self.ensure_goal_unfrozen(&initiative).await?;
        if self.store.pending_extension(initiative_id).await?.is_some() {
            return Err(CoreError::Conflict(
                "An extension request is already pending for this initiative".into(),
            ));
        }

        let input = CreateExtension {
            initiative_id,
            requested_by: actor.user_id,
            new_due_date,
            reason,
            created_at: now,
        };
        let summary = initiative.summary();
        let notify = |extension: &InitiativeExtension| {
            self.notifications
                .notifications_for(&requested_event(&summary, extension), Some(actor), now)
        };
        let committed = self.store.create_extension(&input, &notify).await?;

        tracing::info!(
            initiative_id,
            extension_id = committed.value.id,
            requested_by = actor.user_id,
            "Extension requested"
        );
        self.outbox
            .emit(
                requested_event(&summary, &committed.value),
                Some(actor.user_id),
                &committed.notifications,
            )
            .await;
        Ok(committed.value)
    }

    /// Approve (moving the due date) or deny a pending extension request.
    pub async fn review_extension(
        &self,
        actor: &ActorContext,
        initiative_id: DbId,
        extension_id: DbId,
        approved: bool,
        note: Option<&str>,
    ) -> Result<InitiativeExtension, CoreError> {
        let initiative = self.load_initiative(initiative_id).await?;
        TransitionAuthorizer::review_extension(actor, &initiative).into_result()?;

        let extension = self
            .store
            .find_extension(extension_id)
            .await?
            .filter(|e| e.initiative_id == initiative_id)
            .ok_or(CoreError::NotFound {
                entity: "InitiativeExtension",
                id: extension_id,
            })?;
        if extension.status != ExtensionStatus::Pending {
            return Err(CoreError::Conflict(format!(
                "Extension request {extension_id} was already {}",
                extension.status
            )));
        }
        self.ensure_goal_unfrozen(&initiative).await?;

        let now = Utc::now();
        let mut decided = extension.clone();
        decided.status = if approved {
            ExtensionStatus::Approved
        } else {
            ExtensionStatus::Denied
        };
        decided.reviewed_by = Some(actor.user_id);
        decided.review_note = note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        decided.reviewed_at = Some(now);

        let rescheduled = approved.then(|| {
            let mut updated = initiative.clone();
            updated.due_date = extension.new_due_date;
            updated.overdue_notified_at = None;
            updated.updated_at = now;
            updated
        });

        let event = DomainEvent::ExtensionReviewed {
            initiative: rescheduled.as_ref().unwrap_or(&initiative).summary(),
            extension_id,
            requested_by: extension.requested_by,
            approved,
            new_due_date: extension.new_due_date,
        };
        let notifications = self.notifications.notifications_for(&event, Some(actor), now);
        let committed = self
            .store
            .review_extension(&decided, rescheduled.as_ref(), notifications)
            .await?;

        tracing::info!(initiative_id, extension_id, approved, "Extension reviewed");
        self.outbox
            .emit(event, Some(actor.user_id), &committed.notifications)
            .await;
        Ok(committed.value)
    }

    // -- Overdue sweep -------------------------------------------------------

    /// Announce initiatives that became overdue since the last sweep.
    ///
    /// Returns how many were announced. An initiative changed concurrently is
    /// skipped and picked up by the next sweep.
    pub async fn sweep_overdue(&self, now: Timestamp, limit: i64) -> Result<usize, CoreError> {
        let due = self.store.overdue_unnotified(now, limit).await?;
        let mut announced = 0;

        for initiative in due {
            let event = DomainEvent::InitiativeOverdue {
                initiative: initiative.summary(),
                due_date: initiative.due_date,
            };
            let notifications = self.notifications.notifications_for(&event, None, now);
            let mut marked = initiative;
            marked.overdue_notified_at = Some(now);

            match self.store.update_initiative(&marked, notifications).await {
                Ok(committed) => {
                    announced += 1;
                    self.outbox.emit(event, None, &committed.notifications).await;
                }
                Err(StoreError::Conflict(msg)) => {
                    tracing::debug!(initiative_id = marked.id, reason = %msg, "Overdue initiative changed concurrently");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(announced)
    }

    // -- Helpers -------------------------------------------------------------

    /// Load, authorize, check the edge, mutate, and commit one transition.
    ///
    /// `apply` receives the initiative already moved to the target status and
    /// returns the event describing the change.
    async fn apply_initiative(
        &self,
        actor: &ActorContext,
        id: DbId,
        transition: InitiativeTransition,
        guard: Guard,
        apply: impl FnOnce(&mut Initiative, Timestamp) -> Result<DomainEvent, CoreError>,
    ) -> Result<Initiative, CoreError> {
        let mut initiative = self.load_initiative(id).await?;
        guard(actor, &initiative).into_result()?;
        let next = check_transition(initiative.status, transition)?;
        self.ensure_goal_unfrozen(&initiative).await?;

        let now = Utc::now();
        initiative.status = next;
        initiative.updated_at = now;
        let event = apply(&mut initiative, now)?;

        let notifications = self.notifications.notifications_for(&event, Some(actor), now);
        let committed = self.store.update_initiative(&initiative, notifications).await?;

        tracing::info!(
            initiative_id = id,
            %transition,
            status = %next,
            actor_id = actor.user_id,
            "Initiative transitioned"
        );
        self.outbox
            .emit(event, Some(actor.user_id), &committed.notifications)
            .await;
        Ok(committed.value)
    }

    /// With freeze coupling enabled, an initiative linked to a frozen goal is
    /// read-only.
    async fn ensure_goal_unfrozen(&self, initiative: &Initiative) -> Result<(), CoreError> {
        if !self.config.couple_initiatives_to_goal_freeze {
            return Ok(());
        }
        let Some(goal_id) = initiative.goal_id else {
            return Ok(());
        };
        match self.store.find_goal(goal_id).await? {
            Some(goal) => goal.ensure_not_frozen(),
            None => Ok(()),
        }
    }
}

fn created_event(
    initiative: &Initiative,
    status: InitiativeStatus,
    creator_supervisor_id: Option<DbId>,
) -> DomainEvent {
    DomainEvent::InitiativeCreated {
        initiative: initiative.summary(),
        status,
        creator_supervisor_id,
    }
}

fn requested_event(initiative: &InitiativeSummary, extension: &InitiativeExtension) -> DomainEvent {
    DomainEvent::ExtensionRequested {
        initiative: initiative.clone(),
        extension_id: extension.id,
        requested_by: extension.requested_by,
        new_due_date: extension.new_due_date,
    }
}
