use crate::framework::{DatabaseAccessor, DatabaseProcessor, TransactionProcessor};
use crate::writer::AggregateMutation;
use ecom_sdk::events::ProductUpserted;
use ecom_sdk::objects::Product as SdkProduct;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub sku: String,
    pub price: i64,
    pub updated_at: OffsetDateTime,
}

impl Product {
    pub fn upserted_event(&self) -> ProductUpserted {
        ProductUpserted {
            id: self.id,
            title: self.title.clone(),
            sku: self.sku.clone(),
            price: self.price,
            updated_at: self.updated_at,
        }
    }
}

impl From<Product> for SdkProduct {
    fn from(value: Product) -> Self {
        SdkProduct {
            id: value.id,
            title: value.title,
            sku: value.sku,
            price: value.price,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Create a product. Id and timestamp are assigned by the caller so the
/// matching event can be built before the transaction starts.
pub struct InsertProduct {
    pub id: Uuid,
    pub title: String,
    pub sku: String,
    pub price: i64,
    pub updated_at: OffsetDateTime,
}

impl InsertProduct {
    pub fn as_product(&self) -> Product {
        Product {
            id: self.id,
            title: self.title.clone(),
            sku: self.sku.clone(),
            price: self.price,
            updated_at: self.updated_at,
        }
    }
}

impl AggregateMutation for InsertProduct {
    type Output = Product;

    async fn apply(self, db: &mut TransactionProcessor<'_>) -> Result<Product, sqlx::Error> {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (id, title, sku, price, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, sku, price, updated_at
            "#,
        )
        .bind(self.id)
        .bind(self.title)
        .bind(self.sku)
        .bind(self.price)
        .bind(self.updated_at)
        .fetch_one(db.acquire())
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetProductById {
    pub id: Uuid,
}

impl Processor<GetProductById> for DatabaseProcessor {
    type Output = Option<Product>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProductById")]
    async fn process(&self, query: GetProductById) -> Result<Option<Product>, sqlx::Error> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, title, sku, price, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }
}

#[derive(Debug, Clone)]
/// Get every product whose id is in `ids`. Unknown ids are skipped.
pub struct GetProductsByIds {
    pub ids: Vec<Uuid>,
}

impl Processor<GetProductsByIds> for DatabaseProcessor {
    type Output = Vec<Product>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetProductsByIds")]
    async fn process(&self, query: GetProductsByIds) -> Result<Vec<Product>, sqlx::Error> {
        if query.ids.is_empty() {
            return Ok(Vec::new());
        }
        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, title, sku, price, updated_at
            FROM products
            WHERE id = ANY($1)
            ORDER BY title ASC
            "#,
        )
        .bind(&query.ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(products)
    }
}
