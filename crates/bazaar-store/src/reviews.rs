//! Review/rating consistency engine.
//!
//! A review and its rating are written together in one `BEGIN IMMEDIATE`
//! transaction, and the product's aggregate `rating` is recomputed from the
//! active rating set inside that same transaction. Nothing is visible to
//! other connections until commit; every early return drops the
//! [`rusqlite::Transaction`], which rolls it back.
//!
//! Per (user, product) pair the lifecycle is `NoReview -> Active -> Deleted`
//! and `Deleted` is terminal. The unique index on
//! `reviews(user_id, product_id)` is the authoritative duplicate guard; the
//! `EXISTS` pre-check only produces the error earlier.

use std::time::{Duration, Instant};

use bazaar_shared::constants::{GRADE_MAX, GRADE_MIN};
use bazaar_shared::{authorize, CapabilitySet, Claims};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::database::Database;
use crate::error::{is_unique_violation, Result, StoreError};
use crate::models::{NewReview, Rating, Review, ReviewDeletion, ReviewReceipt};

const REVIEW_SELECT: &str = "SELECT r.id, r.user_id, r.product_id, r.rating_id, g.grade,
            r.comment, r.comment_date, r.is_active
     FROM reviews r JOIN ratings g ON g.id = r.rating_id";

/// Reject grades outside `[1, 10]`, NaN included.
pub fn validate_grade(grade: f64) -> Result<()> {
    if (GRADE_MIN..=GRADE_MAX).contains(&grade) {
        Ok(())
    } else {
        Err(StoreError::InvalidGrade(grade))
    }
}

impl Database {
    // ------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------

    /// Create a review and its rating for `user_id`, then refresh the
    /// product's aggregate rating.
    ///
    /// The grade is validated before any storage access. If `timeout`
    /// elapses before commit the transaction is rolled back and
    /// [`StoreError::TransactionFailed`] is returned.
    pub fn submit_review(
        &mut self,
        user_id: i64,
        review: &NewReview,
        timeout: Duration,
    ) -> Result<ReviewReceipt> {
        validate_grade(review.grade)?;
        let deadline = Instant::now() + timeout;
        let product_id = review.product_id;

        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(aborted)?;

        let product_active: Option<bool> = tx
            .query_row(
                "SELECT is_active FROM products WHERE id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(aborted)?;
        if product_active != Some(true) {
            return Err(StoreError::ProductNotFound);
        }

        let already_reviewed: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM reviews WHERE user_id = ?1 AND product_id = ?2)",
                params![user_id, product_id],
                |row| row.get(0),
            )
            .map_err(aborted)?;
        if already_reviewed {
            return Err(StoreError::DuplicateReview { user_id, product_id });
        }

        tx.execute(
            "INSERT INTO ratings (grade, user_id, product_id) VALUES (?1, ?2, ?3)",
            params![review.grade, user_id, product_id],
        )
        .map_err(aborted)?;
        let rating_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO reviews (user_id, product_id, rating_id, comment, comment_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                product_id,
                rating_id,
                review.comment,
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateReview { user_id, product_id }
            } else {
                aborted(e)
            }
        })?;
        let review_id = tx.last_insert_rowid();

        let product_rating = recompute_product_rating(&tx, product_id).map_err(aborted)?;

        if Instant::now() >= deadline {
            tracing::warn!(user_id, product_id, ?timeout, "review submission timed out");
            return Err(StoreError::TransactionFailed(
                "deadline exceeded before commit".into(),
            ));
        }
        tx.commit().map_err(aborted)?;

        tracing::info!(
            review_id,
            rating_id,
            user_id,
            product_id,
            product_rating,
            "review submitted"
        );
        Ok(ReviewReceipt {
            review_id,
            rating_id,
            product_id,
            product_rating,
        })
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Soft-delete a review and its rating (admin only), then refresh the
    /// product's aggregate rating so it never counts a deleted grade.
    pub fn delete_review(&mut self, claims: &Claims, review_id: i64) -> Result<ReviewDeletion> {
        authorize(claims, CapabilitySet::ADMIN)?;

        let tx = self
            .conn_mut()
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(aborted)?;

        let target: Option<(i64, i64)> = tx
            .query_row(
                "SELECT product_id, rating_id FROM reviews WHERE id = ?1 AND is_active = 1",
                params![review_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(aborted)?;
        let Some((product_id, rating_id)) = target else {
            return Err(StoreError::ReviewNotFound);
        };

        tx.execute(
            "UPDATE reviews SET is_active = 0 WHERE id = ?1",
            params![review_id],
        )
        .map_err(aborted)?;
        tx.execute(
            "UPDATE ratings SET is_active = 0 WHERE id = ?1",
            params![rating_id],
        )
        .map_err(aborted)?;

        let product_rating = recompute_product_rating(&tx, product_id).map_err(aborted)?;
        tx.commit().map_err(aborted)?;

        tracing::info!(
            review_id,
            product_id,
            product_rating,
            admin_id = claims.user_id,
            "review deleted"
        );
        Ok(ReviewDeletion {
            review_id,
            product_id,
            product_rating,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn list_active_reviews(&self) -> Result<Vec<Review>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{REVIEW_SELECT} WHERE r.is_active = 1 ORDER BY r.id ASC"))?;
        let rows = stmt.query_map([], row_to_review)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Active reviews of an active product. An unknown or deleted product is
    /// `ProductNotFound`; a product without reviews yields an empty list.
    pub fn list_reviews_for_product(&self, product_slug: &str) -> Result<Vec<Review>> {
        let product = self.get_product_by_slug(product_slug)?;

        let mut stmt = self.conn().prepare(&format!(
            "{REVIEW_SELECT} WHERE r.is_active = 1 AND r.product_id = ?1 ORDER BY r.id ASC"
        ))?;
        let rows = stmt.query_map(params![product.id], row_to_review)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_review(&self, review_id: i64) -> Result<Review> {
        self.conn()
            .query_row(
                &format!("{REVIEW_SELECT} WHERE r.id = ?1"),
                params![review_id],
                row_to_review,
            )
            .optional()?
            .ok_or(StoreError::ReviewNotFound)
    }

    /// A review's rating, active or not.
    pub fn get_rating(&self, rating_id: i64) -> Result<Rating> {
        self.conn()
            .query_row(
                "SELECT id, grade, user_id, product_id, is_active FROM ratings WHERE id = ?1",
                params![rating_id],
                |row| {
                    Ok(Rating {
                        id: row.get(0)?,
                        grade: row.get(1)?,
                        user_id: row.get(2)?,
                        product_id: row.get(3)?,
                        is_active: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::ReviewNotFound)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Set `products.rating` to the mean of the product's active grades
/// (`0.0` when none remain) and return it. Must run inside the writing
/// transaction so it sees that transaction's own inserts.
fn recompute_product_rating(conn: &Connection, product_id: i64) -> rusqlite::Result<f64> {
    let mean: Option<f64> = conn.query_row(
        "SELECT AVG(grade) FROM ratings WHERE product_id = ?1 AND is_active = 1",
        params![product_id],
        |row| row.get(0),
    )?;
    let rating = mean.unwrap_or(0.0);

    conn.execute(
        "UPDATE products SET rating = ?1 WHERE id = ?2",
        params![rating, product_id],
    )?;
    Ok(rating)
}

fn aborted(err: rusqlite::Error) -> StoreError {
    tracing::error!(error = %err, "review transaction aborted");
    StoreError::TransactionFailed(err.to_string())
}

fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
    let date_str: String = row.get(6)?;
    let comment_date: DateTime<Utc> = DateTime::parse_from_rfc3339(&date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Review {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_id: row.get(2)?,
        rating_id: row.get(3)?,
        grade: row.get(4)?,
        comment: row.get(5)?,
        comment_date,
        is_active: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use bazaar_shared::{ErrorKind, RoleFlags};

    use super::*;
    use crate::testutil::{category, claims_for, customer, open, product, supplier};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn review(product_id: i64, grade: f64) -> NewReview {
        NewReview {
            product_id,
            comment: "solid".into(),
            grade,
        }
    }

    /// A product owned by a fresh supplier, plus `n` customer ids.
    fn fixture(db: &Database, n: usize) -> (i64, Vec<i64>) {
        let owner = supplier(db, "acme");
        let cat = category(db, "Tools", None);
        let product_id = product(db, owner, cat, "Hammer", 10);
        let customers = (0..n).map(|i| customer(db, &format!("c{i}"))).collect();
        (product_id, customers)
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn grade_bounds_are_inclusive() {
        for g in [1.0, 5.5, 10.0] {
            assert!(validate_grade(g).is_ok(), "{g}");
        }
        for g in [0.0, 0.99, 10.01, 11.0, -3.0, f64::NAN] {
            assert!(matches!(validate_grade(g), Err(StoreError::InvalidGrade(_))), "{g}");
        }
    }

    #[test]
    fn invalid_grade_touches_nothing() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);

        for g in [0.0, 11.0] {
            let err = db.submit_review(users[0], &review(product_id, g), TIMEOUT).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
        assert_eq!(count(&db, "ratings"), 0);
        assert_eq!(count(&db, "reviews"), 0);
    }

    #[test]
    fn invalid_grade_is_rejected_even_for_missing_product() {
        let (_dir, mut db) = open();
        let err = db.submit_review(1, &review(999, 0.0), TIMEOUT).unwrap_err();
        assert!(matches!(err, StoreError::InvalidGrade(_)));
    }

    #[test]
    fn submit_creates_pair_and_sets_mean() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 2);

        let first = db.submit_review(users[0], &review(product_id, 4.0), TIMEOUT).unwrap();
        assert_eq!(first.product_rating, 4.0);
        let second = db.submit_review(users[1], &review(product_id, 8.0), TIMEOUT).unwrap();
        assert_eq!(second.product_rating, 6.0);

        assert_eq!(db.get_product(product_id).unwrap().rating, 6.0);
        let stored = db.get_review(second.review_id).unwrap();
        assert_eq!(stored.rating_id, second.rating_id);
        assert_eq!(stored.grade, 8.0);
        assert_eq!(count(&db, "ratings"), 2);
    }

    #[test]
    fn second_review_conflicts_and_leaves_rating() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);

        db.submit_review(users[0], &review(product_id, 9.0), TIMEOUT).unwrap();
        let err = db.submit_review(users[0], &review(product_id, 1.0), TIMEOUT).unwrap_err();

        assert!(matches!(err, StoreError::DuplicateReview { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(db.get_product(product_id).unwrap().rating, 9.0);
        assert_eq!(count(&db, "ratings"), 1);
    }

    #[test]
    fn missing_or_deleted_product_is_not_found() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);

        let err = db.submit_review(users[0], &review(4242, 5.0), TIMEOUT).unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound));

        db.deactivate_product(product_id).unwrap();
        let err = db.submit_review(users[0], &review(product_id, 5.0), TIMEOUT).unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound));
        assert_eq!(count(&db, "ratings"), 0);
    }

    #[test]
    fn storage_failure_rolls_back_everything() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 2);
        db.submit_review(users[0], &review(product_id, 2.0), TIMEOUT).unwrap();

        // Fail the review insert after the rating row has been written.
        db.conn()
            .execute_batch(
                "CREATE TRIGGER fail_review BEFORE INSERT ON reviews
                 BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            )
            .unwrap();

        let err = db.submit_review(users[1], &review(product_id, 10.0), TIMEOUT).unwrap_err();
        assert!(matches!(err, StoreError::TransactionFailed(_)));
        assert_eq!(count(&db, "ratings"), 1);
        assert_eq!(count(&db, "reviews"), 1);
        assert_eq!(db.get_product(product_id).unwrap().rating, 2.0);
    }

    #[test]
    fn deadline_aborts_without_partial_writes() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);

        let err = db
            .submit_review(users[0], &review(product_id, 7.0), Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionFailed);
        assert_eq!(count(&db, "ratings"), 0);
        assert_eq!(count(&db, "reviews"), 0);
        assert_eq!(db.get_product(product_id).unwrap().rating, 0.0);

        // The pair is still in NoReview.
        db.submit_review(users[0], &review(product_id, 7.0), TIMEOUT).unwrap();
    }

    #[test]
    fn unique_index_backs_the_precheck() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);
        let receipt = db.submit_review(users[0], &review(product_id, 3.0), TIMEOUT).unwrap();

        // Bypass the engine: a second row for the same pair hits the index.
        db.conn()
            .execute(
                "INSERT INTO ratings (grade, user_id, product_id) VALUES (3, ?1, ?2)",
                params![users[0], product_id],
            )
            .unwrap();
        let err = db
            .conn()
            .execute(
                "INSERT INTO reviews (user_id, product_id, rating_id, comment, comment_date)
                 VALUES (?1, ?2, last_insert_rowid(), 'dup', '2024-01-01T00:00:00Z')",
                params![users[0], product_id],
            )
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(db.get_review(receipt.review_id).is_ok());
    }

    #[test]
    fn concurrent_duplicates_admit_exactly_one() {
        const WRITERS: usize = 8;

        let (dir, db) = open();
        let (product_id, users) = fixture(&db, 1);
        let user_id = users[0];
        let path = dir.path().join("test.db");
        drop(db);

        let barrier = Arc::new(Barrier::new(WRITERS));
        let handles: Vec<_> = (0..WRITERS)
            .map(|i| {
                let mut conn = Database::open_with_timeout(&path, Duration::from_secs(30)).unwrap();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    conn.submit_review(user_id, &review(product_id, 1.0 + i as f64), TIMEOUT * 6)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::DuplicateReview { .. })))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(conflicts, WRITERS - 1);

        let db = Database::open_at(&path).unwrap();
        assert_eq!(count(&db, "reviews"), 1);
        assert_eq!(count(&db, "ratings"), 1);
        let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
        let grade = db.get_review(winner.review_id).unwrap().grade;
        assert_eq!(db.get_product(product_id).unwrap().rating, grade);
    }

    #[test]
    fn delete_requires_admin() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);
        let receipt = db.submit_review(users[0], &review(product_id, 5.0), TIMEOUT).unwrap();

        let author = claims_for(users[0], RoleFlags::customer());
        let err = db.delete_review(&author, receipt.review_id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailure);
        assert!(db.get_review(receipt.review_id).unwrap().is_active);
    }

    #[test]
    fn delete_recomputes_aggregate() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 2);
        let low = db.submit_review(users[0], &review(product_id, 2.0), TIMEOUT).unwrap();
        db.submit_review(users[1], &review(product_id, 8.0), TIMEOUT).unwrap();
        assert_eq!(db.get_product(product_id).unwrap().rating, 5.0);

        let admin = claims_for(999, RoleFlags::admin());
        let deletion = db.delete_review(&admin, low.review_id).unwrap();
        assert_eq!(deletion.product_rating, 8.0);
        assert_eq!(db.get_product(product_id).unwrap().rating, 8.0);
        assert!(!db.get_rating(low.rating_id).unwrap().is_active);

        let remaining: Vec<i64> = db.list_active_reviews().unwrap().iter().map(|r| r.id).collect();
        assert!(!remaining.contains(&low.review_id));
    }

    #[test]
    fn deleting_last_review_resets_rating() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);
        let receipt = db.submit_review(users[0], &review(product_id, 6.0), TIMEOUT).unwrap();

        let admin = claims_for(999, RoleFlags::admin());
        db.delete_review(&admin, receipt.review_id).unwrap();
        assert_eq!(db.get_product(product_id).unwrap().rating, 0.0);
    }

    #[test]
    fn delete_twice_is_not_found() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);
        let receipt = db.submit_review(users[0], &review(product_id, 6.0), TIMEOUT).unwrap();

        let admin = claims_for(999, RoleFlags::admin());
        db.delete_review(&admin, receipt.review_id).unwrap();
        assert!(matches!(
            db.delete_review(&admin, receipt.review_id),
            Err(StoreError::ReviewNotFound)
        ));
        assert!(matches!(db.delete_review(&admin, 31337), Err(StoreError::ReviewNotFound)));
    }

    #[test]
    fn deleted_is_terminal() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);
        let receipt = db.submit_review(users[0], &review(product_id, 6.0), TIMEOUT).unwrap();

        let admin = claims_for(999, RoleFlags::admin());
        db.delete_review(&admin, receipt.review_id).unwrap();

        let err = db.submit_review(users[0], &review(product_id, 9.0), TIMEOUT).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateReview { .. }));
        assert_eq!(db.get_product(product_id).unwrap().rating, 0.0);
    }

    #[test]
    fn product_listing_requires_active_product() {
        let (_dir, mut db) = open();
        let (product_id, users) = fixture(&db, 1);

        assert!(db.list_reviews_for_product("hammer").unwrap().is_empty());
        db.submit_review(users[0], &review(product_id, 6.0), TIMEOUT).unwrap();
        let listed = db.list_reviews_for_product("hammer").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].grade, 6.0);

        db.deactivate_product(product_id).unwrap();
        assert!(matches!(
            db.list_reviews_for_product("hammer"),
            Err(StoreError::ProductNotFound)
        ));
        assert!(matches!(
            db.list_reviews_for_product("no-such-thing"),
            Err(StoreError::ProductNotFound)
        ));
    }
}
