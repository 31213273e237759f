use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use crate::config::MajorityBasis;
use crate::db::activity_types::*;
use crate::db::{
    JoinRequest, JoinRequestRepository, JoinRequestStatus, Pantry, PantryRepository,
    UserRepository, Vote,
};
use crate::error::{AppError, AppResult};
use crate::services::activity::ActivityService;
use crate::services::membership::{normalize_pantry_name, MembershipService};
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum JoinOutcome {
    /// The requester owns the pantry and went straight in.
    Admitted { pantry: Pantry },
    Pending { request: JoinRequest },
}

/// Result of tallying one vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
    Undecided,
}

/// Strict majority of `member_count`.
pub fn required_approvals(member_count: usize) -> usize {
    member_count / 2 + 1
}

/// `approvals` already includes the vote being cast.
pub fn decide(vote: Vote, by_owner: bool, approvals: usize, member_count: usize) -> Decision {
    match vote {
        Vote::Reject => Decision::Reject,
        Vote::Approve if by_owner => Decision::Approve,
        Vote::Approve if approvals >= required_approvals(member_count) => Decision::Approve,
        Vote::Approve => Decision::Undecided,
    }
}

pub struct JoinRequestService;

impl JoinRequestService {
    pub async fn create(
        state: &Arc<AppState>,
        requester_id: &str,
        pantry_name: &str,
        requester_name: Option<&str>,
    ) -> AppResult<JoinOutcome> {
        let name = normalize_pantry_name(pantry_name)?;
        let _guard = state.locks.acquire(&name).await;
        let mut tx = state.begin_write().await?;

        let requester = MembershipService::get_user(&mut tx, requester_id).await?;
        let pantry = PantryRepository::find_by_name(&mut tx, &name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pantry '{}'", name)))?;

        if pantry.is_owned_by(&requester.id) {
            if !requester.belongs_to(&pantry.id) {
                if requester.pantry_id.is_some() {
                    return Err(AppError::Conflict(
                        "Leave your current pantry before joining another".to_string(),
                    ));
                }
                UserRepository::set_pantry(
                    &mut tx,
                    &requester.id,
                    Some(&pantry.id),
                    Some(Utc::now().naive_utc()),
                )
                .await?;
                ActivityService::record_quietly(
                    &mut tx,
                    &state.config.activity,
                    &pantry.id,
                    &requester,
                    MEMBER_JOINED,
                    json!({ "pantryName": pantry.name }),
                )
                .await;
            }
            tx.commit().await?;
            tracing::info!("Owner {} admitted to pantry '{}'", requester.id, pantry.name);
            return Ok(JoinOutcome::Admitted { pantry });
        }

        if requester.pantry_id.is_some() {
            return Err(AppError::Conflict(
                "You already belong to a pantry".to_string(),
            ));
        }
        if JoinRequestRepository::find_pending(&mut tx, &requester.id, &pantry.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "A request to join '{}' is already pending",
                pantry.name
            )));
        }

        let members = UserRepository::list_members(&mut tx, &pantry.id).await?;
        if members.is_empty() {
            return Err(AppError::InvalidState(format!(
                "Pantry '{}' has no members to approve the request",
                pantry.name
            )));
        }
        let snapshot: Vec<String> = members.into_iter().map(|m| m.id).collect();

        let display_name = requester_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(requester.display_name.as_str());

        let request =
            JoinRequestRepository::create(&mut tx, &requester.id, display_name, &pantry, &snapshot)
                .await?;

        ActivityService::record_quietly(
            &mut tx,
            &state.config.activity,
            &pantry.id,
            &requester,
            JOIN_REQUESTED,
            json!({ "pantryName": pantry.name, "requestId": request.id }),
        )
        .await;

        tx.commit().await?;
        tracing::info!(
            "Join request {} from {} to pantry '{}' ({} members to vote)",
            request.id,
            requester.id,
            pantry.name,
            snapshot.len()
        );

        Ok(JoinOutcome::Pending { request })
    }

    pub async fn respond(
        state: &Arc<AppState>,
        request_id: &str,
        responder_id: &str,
        vote: Vote,
    ) -> AppResult<JoinRequest> {
        let pantry_name = {
            let mut conn = state.db.acquire().await?;
            JoinRequestRepository::find_by_id(&mut conn, request_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Join request {}", request_id)))?
                .pantry_name
        };

        let _guard = state.locks.acquire(&pantry_name).await;
        let mut tx = state.begin_write().await?;

        let request = JoinRequestRepository::find_by_id(&mut tx, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Join request {}", request_id)))?;
        if request.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Join request is already {}",
                request.status.as_str()
            )));
        }

        let responder = MembershipService::get_user(&mut tx, responder_id).await?;
        if !responder.belongs_to(&request.pantry_id) {
            return Err(AppError::Forbidden(
                "Only members of the pantry can respond".to_string(),
            ));
        }
        if request.has_voted(&responder.id) {
            return Err(AppError::Conflict(
                "You have already responded to this request".to_string(),
            ));
        }

        let pantry = PantryRepository::find_by_id(&mut tx, &request.pantry_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Pantry {}", request.pantry_id)))?;

        JoinRequestRepository::add_vote(&mut tx, &request.id, &responder.id, vote).await?;

        let approvals = request.approvals.len() + usize::from(vote == Vote::Approve);
        let member_count = match state.config.pantry.majority_basis {
            MajorityBasis::Snapshot => request.members_snapshot.len(),
            MajorityBasis::Live => {
                UserRepository::count_members(&mut tx, &pantry.id).await?.max(0) as usize
            }
        };
        let decision = decide(vote, pantry.is_owned_by(&responder.id), approvals, member_count);

        let now = Utc::now().naive_utc();
        match decision {
            Decision::Reject => {
                JoinRequestRepository::finalize(&mut tx, &request.id, JoinRequestStatus::Rejected, now)
                    .await?;
                if let Some(requester) =
                    UserRepository::find_by_id(&mut tx, &request.requester_id).await?
                {
                    ActivityService::record_quietly(
                        &mut tx,
                        &state.config.activity,
                        &pantry.id,
                        &requester,
                        JOIN_REJECTED,
                        json!({ "pantryName": pantry.name, "rejectedBy": responder.id }),
                    )
                    .await;
                }
                tracing::info!("Join request {} rejected by {}", request.id, responder.id);
            }
            Decision::Approve => {
                let requester = MembershipService::get_user(&mut tx, &request.requester_id).await?;
                if requester.pantry_id.is_some() {
                    // Dropping the transaction discards this vote too
                    return Err(AppError::InvalidState(
                        "The requester has since joined another pantry".to_string(),
                    ));
                }
                JoinRequestRepository::finalize(&mut tx, &request.id, JoinRequestStatus::Approved, now)
                    .await?;
                UserRepository::set_pantry(&mut tx, &requester.id, Some(&pantry.id), Some(now)).await?;
                ActivityService::record_quietly(
                    &mut tx,
                    &state.config.activity,
                    &pantry.id,
                    &requester,
                    MEMBER_JOINED,
                    json!({ "pantryName": pantry.name, "approvedBy": responder.id }),
                )
                .await;
                tracing::info!(
                    "Join request {} approved; {} joined pantry '{}'",
                    request.id,
                    requester.id,
                    pantry.name
                );
            }
            Decision::Undecided => {
                tracing::debug!(
                    "Join request {}: {}/{} approvals",
                    request.id,
                    approvals,
                    required_approvals(member_count)
                );
            }
        }

        let updated = JoinRequestRepository::find_by_id(&mut tx, &request.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Join request {}", request.id)))?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Pending requests targeting the caller's pantry.
    pub async fn pending_for_pantry(state: &Arc<AppState>, user_id: &str) -> AppResult<Vec<JoinRequest>> {
        let mut conn = state.db.acquire().await?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;
        match &user.pantry_id {
            Some(pantry_id) => {
                JoinRequestRepository::list_for_pantry(&mut conn, pantry_id, JoinRequestStatus::Pending)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn my_requests(state: &Arc<AppState>, user_id: &str) -> AppResult<Vec<JoinRequest>> {
        let mut conn = state.db.acquire().await?;
        JoinRequestRepository::list_by_requester(&mut conn, user_id).await
    }

    /// Visible to the requester and to members of the target pantry.
    pub async fn get(state: &Arc<AppState>, user_id: &str, request_id: &str) -> AppResult<JoinRequest> {
        let mut conn = state.db.acquire().await?;
        let request = JoinRequestRepository::find_by_id(&mut conn, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Join request {}", request_id)))?;
        let user = MembershipService::get_user(&mut conn, user_id).await?;

        if request.requester_id != user.id && !user.belongs_to(&request.pantry_id) {
            return Err(AppError::Forbidden(
                "You cannot view this join request".to_string(),
            ));
        }
        Ok(request)
    }
}
