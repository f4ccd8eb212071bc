// SPDX-License-Identifier: Apache-2.0

use crate::error::StoreError;
use crate::store::{ms_from_db, Store};
use rusqlite::{params, Row};
use tradepost_model::{Currency, Product, ProductSlug};

fn row_to_product(row: &Row<'_>) -> Result<ProductRow, rusqlite::Error> {
    Ok(ProductRow {
        slug: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_cents: row.get(3)?,
        currency: row.get(4)?,
        image_url: row.get(5)?,
        active: row.get(6)?,
        position: row.get(7)?,
        created_at_ms: row.get(8)?,
        updated_at_ms: row.get(9)?,
    })
}

struct ProductRow {
    slug: String,
    name: String,
    description: String,
    price_cents: i64,
    currency: String,
    image_url: Option<String>,
    active: bool,
    position: i64,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl ProductRow {
    fn into_product(self) -> Result<Product, StoreError> {
        Ok(Product {
            slug: ProductSlug::parse(&self.slug)
                .map_err(|e| StoreError::corrupt(format!("product slug: {e}")))?,
            name: self.name,
            description: self.description,
            price_cents: self.price_cents,
            currency: Currency::parse_str(&self.currency)
                .ok_or_else(|| StoreError::corrupt(format!("product currency {:?}", self.currency)))?,
            image_url: self.image_url,
            active: self.active,
            position: self.position,
            created_at_ms: ms_from_db(self.created_at_ms, "products.created_at_ms")?,
            updated_at_ms: ms_from_db(self.updated_at_ms, "products.updated_at_ms")?,
        })
    }
}

const PRODUCT_COLUMNS: &str = "slug, name, description, price_cents, currency, image_url, \
                               active, position, created_at_ms, updated_at_ms";

impl Store {
    /// Insert or update by slug. Updates keep the original creation stamp.
    pub fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO products (slug, name, description, price_cents, currency, image_url,
                                   active, position, created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(slug) DO UPDATE SET
               name = excluded.name,
               description = excluded.description,
               price_cents = excluded.price_cents,
               currency = excluded.currency,
               image_url = excluded.image_url,
               active = excluded.active,
               position = excluded.position,
               updated_at_ms = excluded.updated_at_ms",
            params![
                product.slug.as_str(),
                product.name,
                product.description,
                product.price_cents,
                product.currency.as_str(),
                product.image_url,
                product.active,
                product.position,
                product.created_at_ms as i64,
                product.updated_at_ms as i64,
            ],
        )
        .map_err(StoreError::from_sqlite)?;
        Ok(())
    }

    pub fn product_by_slug(&self, slug: &ProductSlug) -> Result<Option<Product>, StoreError> {
        use rusqlite::OptionalExtension;
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = ?1"),
                params![slug.as_str()],
                row_to_product,
            )
            .optional()
            .map_err(StoreError::from_sqlite)?;
        row.map(ProductRow::into_product).transpose()
    }

    pub fn list_products(
        &self,
        active_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Product>, u64), StoreError> {
        let conn = self.conn()?;
        let filter = if active_only { "WHERE active = 1" } else { "" };
        let total: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM products {filter}"), [], |r| {
                r.get(0)
            })
            .map_err(StoreError::from_sqlite)?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM products {filter}
                 ORDER BY position, id LIMIT ?1 OFFSET ?2"
            ))
            .map_err(StoreError::from_sqlite)?;
        let rows = stmt
            .query_map(params![limit, offset], row_to_product)
            .map_err(StoreError::from_sqlite)?;
        let mut products = Vec::new();
        for row in rows {
            products.push(row.map_err(StoreError::from_sqlite)?.into_product()?);
        }
        Ok((products, total.max(0) as u64))
    }

    /// Archive keeps the row for order-history joins and hides it from the
    /// storefront. Returns false when the slug is unknown.
    pub fn archive_product(&self, slug: &ProductSlug, now_ms: u64) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE products SET active = 0, updated_at_ms = ?2 WHERE slug = ?1",
                params![slug.as_str(), now_ms as i64],
            )
            .map_err(StoreError::from_sqlite)?;
        Ok(changed == 1)
    }
}
