//! CRUD operations for [`Product`] records and category-scoped listings.
//!
//! The `rating` column is never written here; it belongs to the review
//! engine in [`crate::reviews`].

use rusqlite::{params, params_from_iter, OptionalExtension};
use slug::slugify;

use crate::database::Database;
use crate::error::{unique_as_exists, Result, StoreError};
use crate::models::{Product, ProductInput};

const PRODUCT_COLUMNS: &str = "id, name, slug, description, price, image_url, stock,
     supplier_id, category_id, rating, is_active";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a product owned by `supplier_id`. Starts with `rating = 0`.
    pub fn create_product(&self, supplier_id: i64, input: &ProductInput) -> Result<Product> {
        let slug = validate_product(input)?;
        self.get_active_category(input.category_id)?;

        self.conn()
            .execute(
                "INSERT INTO products (name, slug, description, price, image_url, stock,
                                       supplier_id, category_id, rating)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
                params![
                    input.name,
                    slug,
                    input.description,
                    input.price,
                    input.image_url,
                    input.stock,
                    supplier_id,
                    input.category_id,
                ],
            )
            .map_err(unique_as_exists("product slug"))?;

        let id = self.conn().last_insert_rowid();
        tracing::info!(product_id = id, supplier_id, %slug, "product created");
        self.get_product(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch by id regardless of state.
    pub fn get_product(&self, id: i64) -> Result<Product> {
        self.conn()
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                row_to_product,
            )
            .optional()?
            .ok_or(StoreError::ProductNotFound)
    }

    /// Fetch an active product by slug, in stock or not.
    pub fn get_product_by_slug(&self, slug: &str) -> Result<Product> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = ?1 AND is_active = 1"
                ),
                params![slug],
                row_to_product,
            )
            .optional()?
            .ok_or(StoreError::ProductNotFound)
    }

    /// Public detail view: active and in stock.
    pub fn get_listed_product(&self, slug: &str) -> Result<Product> {
        let product = self.get_product_by_slug(slug)?;
        if product.stock <= 0 {
            return Err(StoreError::ProductNotFound);
        }
        Ok(product)
    }

    /// All active products with stock.
    pub fn list_active_products(&self) -> Result<Vec<Product>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE is_active = 1 AND stock > 0
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_product)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Active products with stock whose category is in `category_ids`.
    ///
    /// Order is by id but callers must not rely on it.
    pub fn list_active_products_for_categories<'a, I>(&self, category_ids: I) -> Result<Vec<Product>>
    where
        I: IntoIterator<Item = &'a i64>,
    {
        let ids: Vec<i64> = category_ids.into_iter().copied().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products
             WHERE category_id IN ({placeholders}) AND is_active = 1 AND stock > 0
             ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter()), row_to_product)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Listing for a category page: the category and its direct children.
    pub fn list_products_by_category_slug(&self, category_slug: &str) -> Result<Vec<Product>> {
        let category = self.get_category_by_slug(category_slug)?;
        let ids = self.expand_category(category.id)?;
        self.list_active_products_for_categories(&ids)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the editable fields. The slug is regenerated from the name.
    pub fn update_product(&self, id: i64, input: &ProductInput) -> Result<Product> {
        let slug = validate_product(input)?;
        self.get_active_category(input.category_id)?;

        let affected = self
            .conn()
            .execute(
                "UPDATE products
                 SET name = ?1, slug = ?2, description = ?3, price = ?4, image_url = ?5,
                     stock = ?6, category_id = ?7
                 WHERE id = ?8 AND is_active = 1",
                params![
                    input.name,
                    slug,
                    input.description,
                    input.price,
                    input.image_url,
                    input.stock,
                    input.category_id,
                    id,
                ],
            )
            .map_err(unique_as_exists("product slug"))?;
        if affected == 0 {
            return Err(StoreError::ProductNotFound);
        }

        tracing::info!(product_id = id, %slug, "product updated");
        self.get_product(id)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn deactivate_product(&self, id: i64) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE products SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![id],
        )?;
        if affected == 0 {
            return Err(StoreError::ProductNotFound);
        }
        tracing::info!(product_id = id, "product deactivated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Check the payload and return the derived slug.
fn validate_product(input: &ProductInput) -> Result<String> {
    if input.stock < 0 {
        return Err(StoreError::InvalidInput("stock must not be negative".into()));
    }
    if input.price < 0 {
        return Err(StoreError::InvalidInput("price must not be negative".into()));
    }
    let slug = slugify(&input.name);
    if slug.is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "product name {:?} has no sluggable characters",
            input.name
        )));
    }
    Ok(slug)
}

fn row_to_product(row: &rusqlite::Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        price: row.get(4)?,
        image_url: row.get(5)?,
        stock: row.get(6)?,
        supplier_id: row.get(7)?,
        category_id: row.get(8)?,
        rating: row.get(9)?,
        is_active: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{category, open, product, product_input, supplier};

    #[test]
    fn listing_by_category_covers_one_level() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let root = category(&db, "Electronics", None);
        let child = category(&db, "Phones", Some(root));
        let grandchild = category(&db, "Flagships", Some(child));

        let in_root = product(&db, owner, root, "Radio", 3);
        let in_child = product(&db, owner, child, "Phone", 3);
        let _in_grandchild = product(&db, owner, grandchild, "Flagship", 3);

        let ids: Vec<i64> = db
            .list_products_by_category_slug("electronics")
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![in_root, in_child]);
    }

    #[test]
    fn listing_skips_inactive_and_out_of_stock() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let cat = category(&db, "Tools", None);
        let listed = product(&db, owner, cat, "Hammer", 1);
        let _empty = product(&db, owner, cat, "Saw", 0);
        let gone = product(&db, owner, cat, "Drill", 5);
        db.deactivate_product(gone).unwrap();

        let ids: Vec<i64> = db.list_active_products().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![listed]);
        let ids: Vec<i64> = db
            .list_active_products_for_categories(&[cat])
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![listed]);
        assert!(db.list_active_products_for_categories(&Vec::<i64>::new()).unwrap().is_empty());
    }

    #[test]
    fn create_starts_unrated_with_derived_slug() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let cat = category(&db, "Tools", None);
        let p = db
            .create_product(owner, &product_input("Claw Hammer XL", cat, 4))
            .unwrap();
        assert_eq!(p.slug, "claw-hammer-xl");
        assert_eq!(p.rating, 0.0);
        assert_eq!(p.supplier_id, owner);
    }

    #[test]
    fn slug_transliterates_and_collapses_punctuation() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let cat = category(&db, "Desserts", None);

        let brulee = db
            .create_product(owner, &product_input("Crème Brûlée", cat, 1))
            .unwrap();
        assert_eq!(brulee.slug, "creme-brulee");

        let cable = db
            .create_product(owner, &product_input("  USB-C -- Cable (2m)  ", cat, 1))
            .unwrap();
        assert_eq!(cable.slug, "usb-c-cable-2m");
        assert_eq!(db.get_listed_product("creme-brulee").unwrap().id, brulee.id);
    }

    #[test]
    fn create_requires_category() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let err = db.create_product(owner, &product_input("Thing", 77, 1)).unwrap_err();
        assert!(matches!(err, StoreError::CategoryNotFound));
    }

    #[test]
    fn update_regenerates_slug() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let cat = category(&db, "Tools", None);
        let id = product(&db, owner, cat, "Hammer", 1);

        let updated = db.update_product(id, &product_input("Mallet", cat, 2)).unwrap();
        assert_eq!(updated.slug, "mallet");
        assert_eq!(updated.stock, 2);
        assert!(matches!(db.get_product_by_slug("hammer"), Err(StoreError::ProductNotFound)));
    }

    #[test]
    fn negative_stock_is_invalid() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let cat = category(&db, "Tools", None);
        let err = db.create_product(owner, &product_input("Hammer", cat, -1)).unwrap_err();
        assert_eq!(err.kind(), bazaar_shared::ErrorKind::InvalidInput);
    }

    #[test]
    fn detail_requires_stock() {
        let (_dir, db) = open();
        let owner = supplier(&db, "acme");
        let cat = category(&db, "Tools", None);
        product(&db, owner, cat, "Saw", 0);
        assert!(db.get_product_by_slug("saw").is_ok());
        assert!(matches!(db.get_listed_product("saw"), Err(StoreError::ProductNotFound)));
    }
}
