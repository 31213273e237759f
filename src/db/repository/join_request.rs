use chrono::{NaiveDateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db::models::*;
use crate::error::{AppError, AppResult};

// ============================================================================
// Join Request Repository
// ============================================================================

pub struct JoinRequestRepository;

impl JoinRequestRepository {
    pub async fn create(
        conn: &mut SqliteConnection,
        requester_id: &str,
        requester_name: &str,
        pantry: &Pantry,
        members_snapshot: &[String],
    ) -> AppResult<JoinRequest> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().naive_utc();
        let snapshot = serde_json::to_string(members_snapshot)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize members snapshot: {}", e)))?;

        let row = sqlx::query_as::<_, JoinRequestRow>(
            r#"
            INSERT INTO join_requests (
                id, requester_id, requester_name, pantry_id, pantry_name,
                members_snapshot, status, requested_at, finalized_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(requester_id)
        .bind(requester_name)
        .bind(&pantry.id)
        .bind(&pantry.name)
        .bind(snapshot)
        .bind(JoinRequestStatus::Pending.as_str())
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(JoinRequest::from_parts(row, Vec::new()))
    }

    pub async fn find_by_id(conn: &mut SqliteConnection, id: &str) -> AppResult<Option<JoinRequest>> {
        let row = sqlx::query_as::<_, JoinRequestRow>("SELECT * FROM join_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(AppError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_pending(
        conn: &mut SqliteConnection,
        requester_id: &str,
        pantry_id: &str,
    ) -> AppResult<Option<JoinRequest>> {
        let row = sqlx::query_as::<_, JoinRequestRow>(
            r#"
            SELECT * FROM join_requests
            WHERE requester_id = ? AND pantry_id = ? AND status = ?
            LIMIT 1
            "#,
        )
        .bind(requester_id)
        .bind(pantry_id)
        .bind(JoinRequestStatus::Pending.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        match row {
            Some(row) => Ok(Some(Self::hydrate(conn, row).await?)),
            None => Ok(None),
        }
    }

    /// Requests targeting a pantry with the given status, oldest first.
    pub async fn list_for_pantry(
        conn: &mut SqliteConnection,
        pantry_id: &str,
        status: JoinRequestStatus,
    ) -> AppResult<Vec<JoinRequest>> {
        let rows = sqlx::query_as::<_, JoinRequestRow>(
            r#"
            SELECT * FROM join_requests
            WHERE pantry_id = ? AND status = ?
            ORDER BY requested_at ASC
            "#,
        )
        .bind(pantry_id)
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::hydrate(conn, row).await?);
        }
        Ok(out)
    }

    /// Requests made by one user, newest first.
    pub async fn list_by_requester(
        conn: &mut SqliteConnection,
        requester_id: &str,
    ) -> AppResult<Vec<JoinRequest>> {
        let rows = sqlx::query_as::<_, JoinRequestRow>(
            r#"
            SELECT * FROM join_requests
            WHERE requester_id = ?
            ORDER BY requested_at DESC
            "#,
        )
        .bind(requester_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::hydrate(conn, row).await?);
        }
        Ok(out)
    }

    /// Record a vote. The (request, voter) primary key rejects a second vote.
    pub async fn add_vote(
        conn: &mut SqliteConnection,
        request_id: &str,
        voter_id: &str,
        vote: Vote,
    ) -> AppResult<()> {
        let now = Utc::now().naive_utc();
        let result = sqlx::query(
            r#"
            INSERT INTO join_request_votes (request_id, voter_id, vote, voted_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(request_id, voter_id) DO NOTHING
            "#,
        )
        .bind(request_id)
        .bind(voter_id)
        .bind(vote.as_str())
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "{} has already voted on this request",
                voter_id
            )));
        }
        Ok(())
    }

    /// Move a pending request to a terminal status. Fails if it is no longer pending.
    pub async fn finalize(
        conn: &mut SqliteConnection,
        request_id: &str,
        status: JoinRequestStatus,
        finalized_at: NaiveDateTime,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE join_requests
            SET status = ?, finalized_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(finalized_at)
        .bind(request_id)
        .bind(JoinRequestStatus::Pending.as_str())
        .execute(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvalidState(
                "Join request is no longer pending".to_string(),
            ));
        }
        Ok(())
    }

    async fn hydrate(conn: &mut SqliteConnection, row: JoinRequestRow) -> AppResult<JoinRequest> {
        let votes = sqlx::query_as::<_, VoteRow>(
            r#"
            SELECT voter_id, vote
            FROM join_request_votes
            WHERE request_id = ?
            ORDER BY voted_at ASC
            "#,
        )
        .bind(&row.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(AppError::Database)?;

        Ok(JoinRequest::from_parts(row, votes))
    }
}
