use chrono::Utc;

use acre_core::ids::UserId;
use acre_core::protocol::UserStatus;

use crate::database::Database;
use crate::error::StoreError;

#[derive(Clone, Debug)]
pub struct UserRow {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: String,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, email: &str, display_name: &str) -> Result<UserRow, StoreError> {
        let id = UserId::new();
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, display_name, is_active, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                rusqlite::params![id.as_str(), email, display_name, now],
            )?;
            Ok(UserRow {
                id: id.clone(),
                email: email.to_string(),
                display_name: display_name.to_string(),
                is_active: false,
                created_at: now.clone(),
            })
        })
    }

    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, display_name, is_active, created_at
                 FROM users WHERE id = ?1",
                [id.as_str()],
                |row| {
                    Ok(UserRow {
                        id: UserId::from_raw(row.get::<_, String>(0)?),
                        email: row.get(1)?,
                        display_name: row.get(2)?,
                        is_active: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .map_err(|_| StoreError::NotFound(format!("user {id}")))
        })
    }

    /// Bulk read of every user's presence row; feeds the presence cache at
    /// startup.
    pub fn list_status(&self) -> Result<Vec<UserStatus>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_name, is_active FROM users ORDER BY display_name, id",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(UserStatus {
                        id: UserId::from_raw(row.get::<_, String>(0)?),
                        display_name: row.get(1)?,
                        is_active: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Write-through of a presence flip. Returns false when the user does
    /// not exist; callers treat that as a no-op.
    pub fn set_active(&self, id: &UserId, is_active: bool) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_active = ?2 WHERE id = ?1",
                rusqlite::params![id.as_str(), is_active],
            )?;
            Ok(changed > 0)
        })
    }
}
