//! Local read-model caches of entities owned by other services.
//!
//! Rows are only ever written by projectors, keyed by the source entity id.
//! An upsert overwrites whatever is stored, including a row carrying a newer
//! `updated_at`; a late older event therefore reverts the row.

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryReadModel;

use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use ecom_sdk::events::{CustomerUpserted, IntegrationEvent, ProductUpserted};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CustomerCache {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ProductCache {
    pub id: Uuid,
    pub title: Option<String>,
    pub sku: Option<String>,
    pub price: Option<i64>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UpsertCustomerCache {
    pub event: CustomerUpserted,
}

impl Processor<UpsertCustomerCache> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertCustomerCache")]
    async fn process(&self, cmd: UpsertCustomerCache) -> Result<(), sqlx::Error> {
        let UpsertCustomerCache { event } = cmd;
        sqlx::query(
            r#"
            INSERT INTO customers_cache (id, name, email, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                email = EXCLUDED.email,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id)
        .bind(event.name)
        .bind(event.email)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct UpsertProductCache {
    pub event: ProductUpserted,
}

impl Processor<UpsertProductCache> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertProductCache")]
    async fn process(&self, cmd: UpsertProductCache) -> Result<(), sqlx::Error> {
        let UpsertProductCache { event } = cmd;
        sqlx::query(
            r#"
            INSERT INTO products_cache (id, title, sku, price, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title,
                sku = EXCLUDED.sku,
                price = EXCLUDED.price,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(event.id)
        .bind(event.title)
        .bind(event.sku)
        .bind(event.price)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetCustomerCache {
    pub id: Uuid,
}

impl Processor<GetCustomerCache> for DatabaseProcessor {
    type Output = Option<CustomerCache>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCustomerCache")]
    async fn process(&self, query: GetCustomerCache) -> Result<Option<CustomerCache>, sqlx::Error> {
        sqlx::query_as::<_, CustomerCache>(
            "SELECT id, name, email, updated_at FROM customers_cache WHERE id = $1",
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetProductCache {
    pub id: Uuid,
}

impl Processor<GetProductCache> for DatabaseProcessor {
    type Output = Option<ProductCache>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProductCache")]
    async fn process(&self, query: GetProductCache) -> Result<Option<ProductCache>, sqlx::Error> {
        sqlx::query_as::<_, ProductCache>(
            "SELECT id, title, sku, price, updated_at FROM products_cache WHERE id = $1",
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Applies one decoded event to a read model. Must be idempotent: applying
/// the same event twice leaves the same row as applying it once.
#[async_trait]
pub trait ReadModelWriter<E: IntegrationEvent>: Send + Sync {
    async fn upsert(&self, event: E) -> Result<(), sqlx::Error>;
}

#[async_trait]
impl<E, T> ReadModelWriter<E> for std::sync::Arc<T>
where
    E: IntegrationEvent,
    T: ReadModelWriter<E> + ?Sized,
{
    async fn upsert(&self, event: E) -> Result<(), sqlx::Error> {
        (**self).upsert(event).await
    }
}

#[async_trait]
impl ReadModelWriter<CustomerUpserted> for DatabaseProcessor {
    async fn upsert(&self, event: CustomerUpserted) -> Result<(), sqlx::Error> {
        self.process(UpsertCustomerCache { event }).await
    }
}

#[async_trait]
impl ReadModelWriter<ProductUpserted> for DatabaseProcessor {
    async fn upsert(&self, event: ProductUpserted) -> Result<(), sqlx::Error> {
        self.process(UpsertProductCache { event }).await
    }
}
