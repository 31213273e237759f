use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    /// Convert from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(JoinRequestStatus::Pending),
            "approved" => Some(JoinRequestStatus::Approved),
            "rejected" => Some(JoinRequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JoinRequestStatus::Pending => "pending",
            JoinRequestStatus::Approved => "approved",
            JoinRequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JoinRequestStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Approve,
    Reject,
}

impl Vote {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "approve" => Some(Vote::Approve),
            "reject" => Some(Vote::Reject),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Vote::Approve => "approve",
            Vote::Reject => "reject",
        }
    }
}

/// Raw `join_requests` row; votes live in `join_request_votes`.
#[derive(Debug, Clone, FromRow)]
pub struct JoinRequestRow {
    pub id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub pantry_id: String,
    pub pantry_name: String,
    pub members_snapshot: String,
    pub status: String,
    pub requested_at: NaiveDateTime,
    pub finalized_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, FromRow)]
pub struct VoteRow {
    pub voter_id: String,
    pub vote: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub pantry_id: String,
    pub pantry_name: String,
    /// Member ids captured when the request was created.
    pub members_snapshot: Vec<String>,
    pub status: JoinRequestStatus,
    pub approvals: Vec<String>,
    pub rejections: Vec<String>,
    pub requested_at: NaiveDateTime,
    pub finalized_at: Option<NaiveDateTime>,
}

impl JoinRequest {
    pub fn from_parts(row: JoinRequestRow, votes: Vec<VoteRow>) -> Self {
        let members_snapshot = serde_json::from_str(&row.members_snapshot).unwrap_or_else(|e| {
            tracing::warn!("Join request {} has a malformed snapshot: {}", row.id, e);
            Vec::new()
        });
        // Unknown strings are never written; treat them as pending rather than failing reads
        let status = JoinRequestStatus::from_str(&row.status).unwrap_or(JoinRequestStatus::Pending);

        let mut approvals = Vec::new();
        let mut rejections = Vec::new();
        for v in votes {
            match Vote::from_str(&v.vote) {
                Some(Vote::Approve) => approvals.push(v.voter_id),
                Some(Vote::Reject) => rejections.push(v.voter_id),
                None => tracing::warn!("Ignoring unknown vote '{}' on {}", v.vote, row.id),
            }
        }

        Self {
            id: row.id,
            requester_id: row.requester_id,
            requester_name: row.requester_name,
            pantry_id: row.pantry_id,
            pantry_name: row.pantry_name,
            members_snapshot,
            status,
            approvals,
            rejections,
            requested_at: row.requested_at,
            finalized_at: row.finalized_at,
        }
    }

    pub fn has_voted(&self, user_id: &str) -> bool {
        self.approvals.iter().any(|id| id == user_id)
            || self.rejections.iter().any(|id| id == user_id)
    }
}
