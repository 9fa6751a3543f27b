use crate::framework::{DatabaseAccessor, DatabaseProcessor, TransactionProcessor};
use crate::writer::AggregateMutation;
use ecom_sdk::events::CustomerUpserted;
use ecom_sdk::objects::Customer as SdkCustomer;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub updated_at: OffsetDateTime,
}

impl Customer {
    pub fn upserted_event(&self) -> CustomerUpserted {
        CustomerUpserted {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl From<Customer> for SdkCustomer {
    fn from(value: Customer) -> Self {
        SdkCustomer {
            id: value.id,
            name: value.name,
            email: value.email,
            updated_at: value.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Create a customer. Id and timestamp are assigned by the caller so the
/// matching event can be built before the transaction starts.
pub struct InsertCustomer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub updated_at: OffsetDateTime,
}

impl InsertCustomer {
    pub fn as_customer(&self) -> Customer {
        Customer {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            updated_at: self.updated_at,
        }
    }
}

impl AggregateMutation for InsertCustomer {
    type Output = Customer;

    async fn apply(self, db: &mut TransactionProcessor<'_>) -> Result<Customer, sqlx::Error> {
        sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (id, name, email, updated_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, email, updated_at
            "#,
        )
        .bind(self.id)
        .bind(self.name)
        .bind(self.email)
        .bind(self.updated_at)
        .fetch_one(db.acquire())
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetCustomerById {
    pub id: Uuid,
}

impl Processor<GetCustomerById> for DatabaseProcessor {
    type Output = Option<Customer>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetCustomerById")]
    async fn process(&self, query: GetCustomerById) -> Result<Option<Customer>, sqlx::Error> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, name, email, updated_at
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(customer)
    }
}
