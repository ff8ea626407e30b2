//! Domain model structs persisted in the catalog database.
//!
//! Every read model derives `Serialize` so the server can hand it straight
//! to a JSON response.

use bazaar_shared::RoleFlags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    /// Opaque one-way verifier. Never serialized.
    #[serde(skip)]
    pub password_verifier: String,
    #[serde(flatten)]
    pub roles: RoleFlags,
    pub is_active: bool,
}

/// Fields required to register a user. `password_verifier` is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password_verifier: String,
    pub roles: RoleFlags,
}

/// Outcome of a soft-delete request against a non-admin user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserDeletion {
    Deleted,
    AlreadyDeleted,
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: i64,
    pub image_url: String,
    pub stock: i64,
    pub supplier_id: i64,
    pub category_id: i64,
    /// Mean of the product's active rating grades, `0.0` when there are none.
    pub rating: f64,
    pub is_active: bool,
}

/// Create/update payload. The slug is always derived from `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    #[serde(default)]
    pub image_url: String,
    pub stock: i64,
    pub category_id: i64,
}

// ---------------------------------------------------------------------------
// Review / Rating
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Rating {
    pub id: i64,
    pub grade: f64,
    pub user_id: i64,
    pub product_id: i64,
    pub is_active: bool,
}

/// A review together with its rating's grade, as returned by listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub rating_id: i64,
    pub grade: f64,
    pub comment: String,
    pub comment_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub product_id: i64,
    pub comment: String,
    pub grade: f64,
}

/// Returned by a successful submission.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ReviewReceipt {
    pub review_id: i64,
    pub rating_id: i64,
    pub product_id: i64,
    /// The product's aggregate rating after the write.
    pub product_rating: f64,
}

/// Returned by a successful deletion.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ReviewDeletion {
    pub review_id: i64,
    pub product_id: i64,
    /// The product's aggregate rating after the review's rating left the active set.
    pub product_rating: f64,
}
