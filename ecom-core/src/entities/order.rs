use crate::entities::OrderStatus;
use crate::framework::{DatabaseAccessor, TransactionProcessor};
use crate::writer::AggregateMutation;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub created_at: OffsetDateTime,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItemInsert {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Create an order together with its line items.
pub struct InsertOrder {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub created_at: OffsetDateTime,
    pub items: Vec<OrderItemInsert>,
}

impl AggregateMutation for InsertOrder {
    type Output = Order;

    async fn apply(self, db: &mut TransactionProcessor<'_>) -> Result<Order, sqlx::Error> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, customer_id, created_at, status)
            VALUES ($1, $2, $3, $4)
            RETURNING id, customer_id, created_at, status
            "#,
        )
        .bind(self.id)
        .bind(self.customer_id)
        .bind(self.created_at)
        .bind(OrderStatus::Created)
        .fetch_one(db.acquire())
        .await?;

        if self.items.is_empty() {
            return Ok(order);
        }

        let mut query_builder = sqlx::QueryBuilder::<sqlx::Postgres>::new(
            "INSERT INTO order_items (order_id, product_id, quantity, unit_price) ",
        );
        query_builder.push_values(self.items, |mut b, item| {
            b.push_bind(order.id)
                .push_bind(item.product_id)
                .push_bind(item.quantity)
                .push_bind(item.unit_price);
        });
        query_builder.build().execute(db.acquire()).await?;

        Ok(order)
    }
}
