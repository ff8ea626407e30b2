use bazaar_shared::{AccessError, ErrorKind};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error outside of a review transaction.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Grade outside `[1, 10]` (or not a number).
    #[error("Grade must be between 1 and 10, got {0}")]
    InvalidGrade(f64),

    /// Rejected request field.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Product not found")]
    ProductNotFound,

    #[error("Review not found")]
    ReviewNotFound,

    #[error("Category not found")]
    CategoryNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("User {user_id} already submitted a review for product {product_id}")]
    DuplicateReview { user_id: i64, product_id: i64 },

    /// Unique username/email/slug collision.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Admin accounts cannot be soft-deleted.
    #[error("Admin users cannot be deleted")]
    ProtectedAccount,

    /// The caller's claims do not allow the operation.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// A multi-row write was aborted and rolled back.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidGrade(_) | StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::ProductNotFound
            | StoreError::ReviewNotFound
            | StoreError::CategoryNotFound
            | StoreError::UserNotFound => ErrorKind::NotFound,
            StoreError::DuplicateReview { .. } | StoreError::AlreadyExists(_) => {
                ErrorKind::Conflict
            }
            StoreError::ProtectedAccount => ErrorKind::AuthorizationFailure,
            StoreError::Access(e) => e.kind(),
            StoreError::TransactionFailed(_) => ErrorKind::TransactionFailed,
            StoreError::Sqlite(_)
            | StoreError::Io(_)
            | StoreError::Migration(_) => ErrorKind::Internal,
        }
    }
}

/// Whether `err` is a `UNIQUE` constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Map a `UNIQUE` violation on an insert/update to [`StoreError::AlreadyExists`].
pub(crate) fn unique_as_exists(what: &str) -> impl FnOnce(rusqlite::Error) -> StoreError + '_ {
    move |e| {
        if is_unique_violation(&e) {
            StoreError::AlreadyExists(what.to_string())
        } else {
            StoreError::Sqlite(e)
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
