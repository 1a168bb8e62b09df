use chrono::{DateTime, Utc};
use parley_shared::pair::pair_key;
use rusqlite::params;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{FriendRequest, RequestStatus};

impl Database {
    /// Insert a new PENDING request.
    ///
    /// The partial unique index on `(pair_key) WHERE status = 'PENDING'`
    /// rejects a second pending request for the same pair in either
    /// direction; that surfaces as [`StoreError::AlreadyExists`].
    pub fn insert_friend_request(&self, request: &FriendRequest) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO friend_requests (id, from_user, to_user, pair_key, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    request.id.to_string(),
                    request.from_user,
                    request.to_user,
                    pair_key(&request.from_user, &request.to_user),
                    request.status.as_str(),
                    request.created_at.to_rfc3339(),
                ],
            )
            .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    pub fn get_friend_request(&self, id: Uuid) -> Result<FriendRequest> {
        self.conn()
            .query_row(
                "SELECT id, from_user, to_user, status, created_at
                 FROM friend_requests WHERE id = ?1",
                params![id.to_string()],
                row_to_friend_request,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn set_friend_request_status(&self, id: Uuid, status: RequestStatus) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE friend_requests SET status = ?2 WHERE id = ?1",
            params![id.to_string(), status.as_str()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// The PENDING request for an unordered pair, if one exists.
    pub fn pending_request_for_pair(&self, a: &str, b: &str) -> Result<Option<FriendRequest>> {
        self.request_for_pair(a, b, RequestStatus::Pending)
    }

    /// The ACCEPTED request for an unordered pair, if one exists.
    pub fn accepted_request_for_pair(&self, a: &str, b: &str) -> Result<Option<FriendRequest>> {
        self.request_for_pair(a, b, RequestStatus::Accepted)
    }

    fn request_for_pair(
        &self,
        a: &str,
        b: &str,
        status: RequestStatus,
    ) -> Result<Option<FriendRequest>> {
        let result = self.conn().query_row(
            "SELECT id, from_user, to_user, status, created_at
             FROM friend_requests
             WHERE pair_key = ?1 AND status = ?2
             ORDER BY created_at DESC
             LIMIT 1",
            params![pair_key(a, b), status.as_str()],
            row_to_friend_request,
        );

        match result {
            Ok(req) => Ok(Some(req)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// PENDING requests addressed to a user.
    pub fn pending_requests_to(&self, user: &str) -> Result<Vec<FriendRequest>> {
        self.requests_where("LOWER(to_user) = LOWER(?1)", user)
    }

    /// PENDING requests sent by a user.
    pub fn pending_requests_from(&self, user: &str) -> Result<Vec<FriendRequest>> {
        self.requests_where("LOWER(from_user) = LOWER(?1)", user)
    }

    fn requests_where(&self, clause: &str, user: &str) -> Result<Vec<FriendRequest>> {
        let sql = format!(
            "SELECT id, from_user, to_user, status, created_at
             FROM friend_requests
             WHERE {clause} AND status = 'PENDING'
             ORDER BY created_at"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![user], row_to_friend_request)?;

        let mut requests = Vec::new();
        for row in rows {
            requests.push(row?);
        }
        Ok(requests)
    }

    /// Counter-parties of every ACCEPTED request touching the user.
    pub fn friends_of(&self, user: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT from_user, to_user
             FROM friend_requests
             WHERE status = 'ACCEPTED'
               AND (LOWER(from_user) = LOWER(?1) OR LOWER(to_user) = LOWER(?1))
             ORDER BY created_at",
        )?;

        let rows = stmt.query_map(params![user], |row| {
            let from: String = row.get(0)?;
            let to: String = row.get(1)?;
            Ok((from, to))
        })?;

        let mut friends = Vec::new();
        for row in rows {
            let (from, to) = row?;
            if from.eq_ignore_ascii_case(user) {
                friends.push(to);
            } else {
                friends.push(from);
            }
        }
        Ok(friends)
    }

    pub fn delete_friend_request(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_friend_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    let id_str: String = row.get(0)?;
    let from_user: String = row.get(1)?;
    let to_user: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status = RequestStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown request status: {status_str}").into(),
        )
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(FriendRequest {
        id,
        from_user,
        to_user,
        status,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_db() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    fn pending(from: &str, to: &str) -> FriendRequest {
        FriendRequest {
            id: Uuid::new_v4(),
            from_user: from.to_string(),
            to_user: to.to_string(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reverse_direction_duplicate_is_refused() {
        let (_dir, db) = open_test_db();

        db.insert_friend_request(&pending("alice", "bob")).unwrap();

        let reverse = db.insert_friend_request(&pending("bob", "alice"));
        assert!(matches!(reverse, Err(StoreError::AlreadyExists)));

        let case_variant = db.insert_friend_request(&pending("ALICE", "Bob"));
        assert!(matches!(case_variant, Err(StoreError::AlreadyExists)));
    }

    #[test]
    fn accepted_pair_allows_new_pending_for_other_pairs() {
        let (_dir, db) = open_test_db();

        let req = pending("alice", "bob");
        db.insert_friend_request(&req).unwrap();
        db.set_friend_request_status(req.id, RequestStatus::Accepted)
            .unwrap();

        // A different pair is unaffected by alice/bob's accepted record.
        db.insert_friend_request(&pending("alice", "carol")).unwrap();

        let accepted = db.accepted_request_for_pair("bob", "alice").unwrap();
        assert_eq!(accepted.unwrap().id, req.id);
    }

    #[test]
    fn pending_queries_split_by_direction() {
        let (_dir, db) = open_test_db();
        db.insert_friend_request(&pending("alice", "bob")).unwrap();
        db.insert_friend_request(&pending("carol", "alice")).unwrap();

        let to_alice = db.pending_requests_to("alice").unwrap();
        assert_eq!(to_alice.len(), 1);
        assert_eq!(to_alice[0].from_user, "carol");

        let from_alice = db.pending_requests_from("alice").unwrap();
        assert_eq!(from_alice.len(), 1);
        assert_eq!(from_alice[0].to_user, "bob");
    }

    #[test]
    fn friends_lists_counterparties() {
        let (_dir, db) = open_test_db();

        let ab = pending("alice", "bob");
        db.insert_friend_request(&ab).unwrap();
        db.set_friend_request_status(ab.id, RequestStatus::Accepted)
            .unwrap();

        let ca = pending("carol", "alice");
        db.insert_friend_request(&ca).unwrap();
        db.set_friend_request_status(ca.id, RequestStatus::Accepted)
            .unwrap();

        let friends = db.friends_of("alice").unwrap();
        assert_eq!(friends, vec!["bob".to_string(), "carol".to_string()]);
    }
}
