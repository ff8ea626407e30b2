//! A minimal connection pool.
//!
//! SQLite connections are cheap to open but not `Sync`, so each request
//! checks one out, uses it on a blocking thread and hands it back on drop.
//! Connections beyond `max_idle` are closed instead of being kept.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::debug;

use crate::database::Database;
use crate::error::Result;

pub struct DbPool {
    path: PathBuf,
    busy_timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Database>>,
}

impl DbPool {
    /// Open the database once (running migrations) and keep that first
    /// connection idle.
    pub fn open(path: &Path, busy_timeout: Duration, max_idle: usize) -> Result<Arc<Self>> {
        let first = Database::open_with_timeout(path, busy_timeout)?;
        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            busy_timeout,
            max_idle: max_idle.max(1),
            idle: Mutex::new(vec![first]),
        }))
    }

    /// Check out a connection, opening a new one if none is idle.
    pub fn get(self: &Arc<Self>) -> Result<PooledDatabase> {
        let reused = self.lock_idle().pop();
        let db = match reused {
            Some(db) => db,
            None => {
                debug!(path = %self.path.display(), "opening pooled connection");
                Database::open_with_timeout(&self.path, self.busy_timeout)?
            }
        };
        Ok(PooledDatabase {
            db: Some(db),
            pool: Arc::clone(self),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<Database>> {
        // A panic while holding the lock cannot leave the Vec inconsistent.
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn put_back(&self, db: Database) {
        let mut idle = self.lock_idle();
        if idle.len() < self.max_idle {
            idle.push(db);
        }
    }
}

/// A checked-out connection, returned to its pool on drop.
pub struct PooledDatabase {
    db: Option<Database>,
    pool: Arc<DbPool>,
}

impl Deref for PooledDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        self.db.as_ref().expect("pooled connection present until drop")
    }
}

impl DerefMut for PooledDatabase {
    fn deref_mut(&mut self) -> &mut Database {
        self.db.as_mut().expect("pooled connection present until drop")
    }
}

impl Drop for PooledDatabase {
    fn drop(&mut self) {
        if let Some(db) = self.db.take() {
            self.pool.put_back(db);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connections_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DbPool::open(&dir.path().join("pool.db"), Duration::from_secs(1), 2).unwrap();
        assert_eq!(pool.idle_count(), 1);

        {
            let _a = pool.get().unwrap();
            assert_eq!(pool.idle_count(), 0);
            let _b = pool.get().unwrap();
            let _c = pool.get().unwrap();
        }

        // Three were out, only two are kept.
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn pooled_connections_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DbPool::open(&dir.path().join("pool.db"), Duration::from_secs(1), 4).unwrap();

        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        a.conn()
            .execute("INSERT INTO categories (name, slug) VALUES ('A', 'a')", [])
            .unwrap();
        let n: i64 = b
            .conn()
            .query_row("SELECT COUNT(*) FROM categories", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
