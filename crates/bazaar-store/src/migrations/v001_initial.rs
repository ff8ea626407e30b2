//! v001 -- Initial schema creation.
//!
//! Creates the five catalog tables: `users`, `categories`, `products`,
//! `ratings` and `reviews`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name        TEXT NOT NULL,
    last_name         TEXT NOT NULL,
    username          TEXT NOT NULL UNIQUE,
    email             TEXT NOT NULL UNIQUE,
    password_verifier TEXT NOT NULL,           -- opaque, never the plaintext
    is_active         INTEGER NOT NULL DEFAULT 1,
    is_admin          INTEGER NOT NULL DEFAULT 0,
    is_supplier       INTEGER NOT NULL DEFAULT 0,
    is_customer       INTEGER NOT NULL DEFAULT 1
);

-- ----------------------------------------------------------------
-- Categories (parent_id forms the tree)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS categories (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    slug      TEXT NOT NULL UNIQUE,
    parent_id INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (parent_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_categories_parent ON categories(parent_id);

-- ----------------------------------------------------------------
-- Products
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS products (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT '',
    price       INTEGER NOT NULL DEFAULT 0,
    image_url   TEXT NOT NULL DEFAULT '',
    stock       INTEGER NOT NULL DEFAULT 0,
    supplier_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    rating      REAL NOT NULL DEFAULT 0,       -- mean of active ratings.grade
    is_active   INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (supplier_id) REFERENCES users(id),
    FOREIGN KEY (category_id) REFERENCES categories(id)
);

CREATE INDEX IF NOT EXISTS idx_products_category ON products(category_id);

-- ----------------------------------------------------------------
-- Ratings
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS ratings (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    grade      REAL NOT NULL CHECK (grade BETWEEN 1 AND 10),
    user_id    INTEGER NOT NULL,
    product_id INTEGER NOT NULL,
    is_active  INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (product_id) REFERENCES products(id)
);

CREATE INDEX IF NOT EXISTS idx_ratings_product_active ON ratings(product_id, is_active);

-- ----------------------------------------------------------------
-- Reviews (each owns exactly one rating)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS reviews (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL,
    product_id   INTEGER NOT NULL,
    rating_id    INTEGER NOT NULL UNIQUE,
    comment      TEXT NOT NULL,
    comment_date TEXT NOT NULL,                -- RFC-3339
    is_active    INTEGER NOT NULL DEFAULT 1,

    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (product_id) REFERENCES products(id),
    FOREIGN KEY (rating_id) REFERENCES ratings(id)
);

-- One review per (user, product), ever: a deleted review is terminal.
CREATE UNIQUE INDEX IF NOT EXISTS idx_reviews_user_product ON reviews(user_id, product_id);
CREATE INDEX IF NOT EXISTS idx_reviews_product ON reviews(product_id, is_active);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
