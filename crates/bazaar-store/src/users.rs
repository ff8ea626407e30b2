//! Account records: registration, lookup, role toggling, soft-delete.

use bazaar_shared::RoleFlags;
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{unique_as_exists, Result, StoreError};
use crate::models::{NewUser, User, UserDeletion};

const USER_COLUMNS: &str = "id, first_name, last_name, username, email, password_verifier,
     is_admin, is_supplier, is_customer, is_active";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user and return its id.
    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        if user.username.trim().is_empty() {
            return Err(StoreError::InvalidInput("username must not be empty".into()));
        }

        self.conn()
            .execute(
                "INSERT INTO users (first_name, last_name, username, email, password_verifier,
                                    is_admin, is_supplier, is_customer)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.first_name,
                    user.last_name,
                    user.username,
                    user.email,
                    user.password_verifier,
                    user.roles.is_admin,
                    user.roles.is_supplier,
                    user.roles.is_customer,
                ],
            )
            .map_err(unique_as_exists("username or email"))?;

        let id = self.conn().last_insert_rowid();
        tracing::info!(user_id = id, username = %user.username, "user created");
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()?
            .ok_or(StoreError::UserNotFound)
    }

    /// Look up by username, active or not.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Flip supplier <-> customer on an active user and return the new flags.
    ///
    /// `is_admin` is never modified here.
    pub fn toggle_supplier(&self, user_id: i64) -> Result<RoleFlags> {
        let user = self.get_user(user_id)?;
        if !user.is_active {
            return Err(StoreError::UserNotFound);
        }

        let roles = user.roles.flip_supplier_customer();
        self.conn().execute(
            "UPDATE users SET is_supplier = ?1, is_customer = ?2 WHERE id = ?3",
            params![roles.is_supplier, roles.is_customer, user_id],
        )?;

        tracing::info!(
            user_id,
            is_supplier = roles.is_supplier,
            is_customer = roles.is_customer,
            "user role toggled"
        );
        Ok(roles)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Soft-delete a user. Admins are refused; repeated deletes are no-ops.
    pub fn deactivate_user(&self, user_id: i64) -> Result<UserDeletion> {
        let user = self.get_user(user_id)?;
        if user.roles.is_admin {
            return Err(StoreError::ProtectedAccount);
        }
        if !user.is_active {
            return Ok(UserDeletion::AlreadyDeleted);
        }

        self.conn().execute(
            "UPDATE users SET is_active = 0 WHERE id = ?1",
            params![user_id],
        )?;
        tracing::info!(user_id, "user deactivated");
        Ok(UserDeletion::Deleted)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        username: row.get(3)?,
        email: row.get(4)?,
        password_verifier: row.get(5)?,
        roles: RoleFlags {
            is_admin: row.get(6)?,
            is_supplier: row.get(7)?,
            is_customer: row.get(8)?,
        },
        is_active: row.get(9)?,
    })
}
