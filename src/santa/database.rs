//! SQLite-backed participant directory.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::santa::assignment::ParticipantId;
use crate::santa::directory::{Assignment, DirectoryError, Participant, ParticipantDirectory};

impl From<rusqlite::Error> for DirectoryError {
    fn from(e: rusqlite::Error) -> Self {
        DirectoryError::Unavailable(e.to_string())
    }
}

/// Persistent SQLite database for participants and the current draw.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Create a new in-memory database.
    pub fn in_memory() -> Result<Self, DirectoryError> {
        let db = Self { conn: Mutex::new(Connection::open_in_memory()?) };
        db.init_schema()?;
        Ok(db)
    }

    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self, DirectoryError> {
        let db = Self { conn: Mutex::new(Connection::open(path)?) };
        db.init_schema()?;

        let (participants, assignments) = db.get_counts()?;
        info!(
            "Loaded database from {:?} ({} participants, {} assignments)",
            path, participants, assignments
        );
        Ok(db)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DirectoryError> {
        self.conn
            .lock()
            .map_err(|_| DirectoryError::Unavailable("database lock poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<(), DirectoryError> {
        let conn = self.conn()?;

        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS participants (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                alias TEXT NOT NULL UNIQUE,
                wish_list TEXT NOT NULL DEFAULT '',
                registered_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS assignments (
                giver_id INTEGER PRIMARY KEY,
                recipient_id INTEGER NOT NULL UNIQUE,
                drawn_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_participants_registered ON participants(registered_at);
        "#)?;
        Ok(())
    }

    fn get_counts(&self) -> Result<(usize, usize), DirectoryError> {
        let conn = self.conn()?;
        let participants: i64 =
            conn.query_row("SELECT COUNT(*) FROM participants", [], |row| row.get(0))?;
        let assignments: i64 =
            conn.query_row("SELECT COUNT(*) FROM assignments", [], |row| row.get(0))?;
        Ok((participants as usize, assignments as usize))
    }
}

fn participant_from_row(row: &Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        username: row.get(1)?,
        alias: row.get(2)?,
        wish_list: row.get(3)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        giver_id: row.get(0)?,
        recipient_id: row.get(1)?,
    })
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl ParticipantDirectory for Database {
    async fn list_participants(&self) -> Result<Vec<Participant>, DirectoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, username, alias, wish_list FROM participants
             ORDER BY registered_at, user_id",
        )?;
        let participants = stmt
            .query_map([], participant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(participants)
    }

    async fn get_participant(
        &self,
        id: ParticipantId,
    ) -> Result<Option<Participant>, DirectoryError> {
        let conn = self.conn()?;
        let participant = conn
            .query_row(
                "SELECT user_id, username, alias, wish_list FROM participants WHERE user_id = ?1",
                params![id],
                participant_from_row,
            )
            .optional()?;
        Ok(participant)
    }

    async fn upsert_participant(&self, participant: &Participant) -> Result<(), DirectoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO participants (user_id, username, alias, wish_list, registered_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                username = ?2,
                alias = ?3,
                wish_list = ?4",
            params![
                participant.id,
                participant.username,
                participant.alias,
                participant.wish_list,
                now()
            ],
        )?;
        debug!("Saved participant {} ({})", participant.id, participant.alias);
        Ok(())
    }

    async fn append_wish_list(
        &self,
        id: ParticipantId,
        text: &str,
    ) -> Result<Participant, DirectoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE participants SET wish_list = CASE
                WHEN wish_list = '' THEN ?2
                ELSE wish_list || char(10) || ?2
             END
             WHERE user_id = ?1",
            params![id, text],
        )?;
        if changed == 0 {
            return Err(DirectoryError::UnknownParticipant(id));
        }

        let participant = conn.query_row(
            "SELECT user_id, username, alias, wish_list FROM participants WHERE user_id = ?1",
            params![id],
            participant_from_row,
        )?;
        Ok(participant)
    }

    async fn set_wish_list(&self, id: ParticipantId, text: &str) -> Result<(), DirectoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE participants SET wish_list = ?2 WHERE user_id = ?1",
            params![id, text],
        )?;
        if changed == 0 {
            return Err(DirectoryError::UnknownParticipant(id));
        }
        Ok(())
    }

    async fn set_alias(&self, id: ParticipantId, alias: &str) -> Result<(), DirectoryError> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE participants SET alias = ?2 WHERE user_id = ?1",
            params![id, alias],
        )?;
        if changed == 0 {
            return Err(DirectoryError::UnknownParticipant(id));
        }
        Ok(())
    }

    async fn replace_assignments(&self, assignments: &[Assignment]) -> Result<(), DirectoryError> {
        let mut conn = self.conn()?;
        let drawn_at = now();

        // Dropping the transaction without commit rolls back, so a failed
        // insert leaves the previous draw in place.
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM assignments", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO assignments (giver_id, recipient_id, drawn_at) VALUES (?1, ?2, ?3)",
            )?;
            for assignment in assignments {
                stmt.execute(params![assignment.giver_id, assignment.recipient_id, drawn_at])?;
            }
        }
        tx.commit()?;

        info!("Stored {} assignment(s)", assignments.len());
        Ok(())
    }

    async fn list_assignments(&self) -> Result<Vec<Assignment>, DirectoryError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT giver_id, recipient_id FROM assignments ORDER BY giver_id")?;
        let assignments = stmt
            .query_map([], assignment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(assignments)
    }

    async fn get_assignment_for_recipient(
        &self,
        recipient_id: ParticipantId,
    ) -> Result<Option<Assignment>, DirectoryError> {
        let conn = self.conn()?;
        let assignment = conn
            .query_row(
                "SELECT giver_id, recipient_id FROM assignments WHERE recipient_id = ?1",
                params![recipient_id],
                assignment_from_row,
            )
            .optional()?;
        Ok(assignment)
    }

    async fn get_assignment_for_giver(
        &self,
        giver_id: ParticipantId,
    ) -> Result<Option<Assignment>, DirectoryError> {
        let conn = self.conn()?;
        let assignment = conn
            .query_row(
                "SELECT giver_id, recipient_id FROM assignments WHERE giver_id = ?1",
                params![giver_id],
                assignment_from_row,
            )
            .optional()?;
        Ok(assignment)
    }
}
