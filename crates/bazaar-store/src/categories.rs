//! CRUD operations for [`Category`] records and one-level tree expansion.

use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension};
use slug::slugify;

use crate::database::Database;
use crate::error::{unique_as_exists, Result, StoreError};
use crate::models::{Category, CategoryInput};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn create_category(&self, input: &CategoryInput) -> Result<Category> {
        let slug = category_slug(&input.name)?;
        if let Some(parent_id) = input.parent_id {
            self.get_active_category(parent_id)?;
        }

        self.conn()
            .execute(
                "INSERT INTO categories (name, slug, parent_id) VALUES (?1, ?2, ?3)",
                params![input.name, slug, input.parent_id],
            )
            .map_err(unique_as_exists("category slug"))?;

        let id = self.conn().last_insert_rowid();
        tracing::info!(category_id = id, %slug, "category created");
        self.get_active_category(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_active_category(&self, id: i64) -> Result<Category> {
        self.conn()
            .query_row(
                "SELECT id, name, slug, parent_id, is_active
                 FROM categories WHERE id = ?1 AND is_active = 1",
                params![id],
                row_to_category,
            )
            .optional()?
            .ok_or(StoreError::CategoryNotFound)
    }

    pub fn get_category_by_slug(&self, slug: &str) -> Result<Category> {
        self.conn()
            .query_row(
                "SELECT id, name, slug, parent_id, is_active
                 FROM categories WHERE slug = ?1 AND is_active = 1",
                params![slug],
                row_to_category,
            )
            .optional()?
            .ok_or(StoreError::CategoryNotFound)
    }

    pub fn list_active_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, slug, parent_id, is_active
             FROM categories WHERE is_active = 1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], row_to_category)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// The category itself plus its direct children.
    ///
    /// Expansion stops at one level: grandchildren are never included.
    pub fn expand_category(&self, category_id: i64) -> Result<BTreeSet<i64>> {
        let root = self.get_active_category(category_id)?;

        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM categories WHERE parent_id = ?1")?;
        let children = stmt.query_map(params![root.id], |row| row.get::<_, i64>(0))?;

        let mut ids = BTreeSet::from([root.id]);
        for child in children {
            ids.insert(child?);
        }
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Rename and/or re-parent. The slug follows the name.
    pub fn update_category(&self, id: i64, input: &CategoryInput) -> Result<Category> {
        self.get_active_category(id)?;
        let slug = category_slug(&input.name)?;
        if let Some(parent_id) = input.parent_id {
            if parent_id == id {
                return Err(StoreError::InvalidInput(
                    "a category cannot be its own parent".into(),
                ));
            }
            self.get_active_category(parent_id)?;
        }

        self.conn()
            .execute(
                "UPDATE categories SET name = ?1, slug = ?2, parent_id = ?3 WHERE id = ?4",
                params![input.name, slug, input.parent_id, id],
            )
            .map_err(unique_as_exists("category slug"))?;

        tracing::info!(category_id = id, %slug, "category updated");
        self.get_active_category(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn deactivate_category(&self, id: i64) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE categories SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![id],
        )?;
        if affected == 0 {
            return Err(StoreError::CategoryNotFound);
        }
        tracing::info!(category_id = id, "category deactivated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn category_slug(name: &str) -> Result<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "category name {name:?} has no sluggable characters"
        )));
    }
    Ok(slug)
}

fn row_to_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        parent_id: row.get(3)?,
        is_active: row.get(4)?,
    })
}
