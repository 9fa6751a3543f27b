//! Order view assembly.
//!
//! Joins the order and its items with the local customer and product caches.
//! A missing cache row is rendered as empty fields, never as an error.

use crate::entities::OrderStatus;
use crate::framework::DatabaseProcessor;
use ecom_sdk::objects::{CustomerSnapshot, OrderHeaderView, OrderItemView, OrderView, ProductSnapshot};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderHeaderRow {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub status: OrderStatus,
    pub customer_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct OrderItemRow {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub product_title: Option<String>,
    pub product_sku: Option<String>,
    pub product_price: Option<i64>,
}

/// Build the view from already joined rows.
pub fn assemble(header: OrderHeaderRow, items: Vec<OrderItemRow>) -> OrderView {
    OrderView {
        order: OrderHeaderView {
            id: header.id,
            created_at: header.created_at,
            status: header.status.into(),
            customer: CustomerSnapshot {
                id: header.customer_id,
                name: header.customer_name,
                email: header.customer_email,
            },
        },
        items: items
            .into_iter()
            .map(|item| OrderItemView {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                product: ProductSnapshot {
                    id: item.product_id,
                    title: item.product_title,
                    sku: item.product_sku,
                    price: item.product_price,
                },
            })
            .collect(),
    }
}

#[derive(Debug, Clone)]
/// Get the assembled view of one order, or `None` if the order is unknown.
pub struct GetOrderView {
    pub order_id: Uuid,
}

impl Processor<GetOrderView> for DatabaseProcessor {
    type Output = Option<OrderView>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetOrderView")]
    async fn process(&self, query: GetOrderView) -> Result<Option<OrderView>, sqlx::Error> {
        let header = sqlx::query_as::<_, OrderHeaderRow>(
            r#"
            SELECT
                o.id,
                o.created_at,
                o.status,
                o.customer_id,
                c.name AS customer_name,
                c.email AS customer_email
            FROM orders o
            LEFT JOIN customers_cache c ON c.id = o.customer_id
            WHERE o.id = $1
            "#,
        )
        .bind(query.order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT
                oi.product_id,
                oi.quantity,
                oi.unit_price,
                p.title AS product_title,
                p.sku AS product_sku,
                p.price AS product_price
            FROM order_items oi
            LEFT JOIN products_cache p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY oi.product_id ASC
            "#,
        )
        .bind(query.order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(assemble(header, items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecom_sdk::objects::OrderStatus as SdkOrderStatus;

    fn header(name: Option<&str>) -> OrderHeaderRow {
        OrderHeaderRow {
            id: Uuid::new_v4(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            status: OrderStatus::Created,
            customer_id: Uuid::new_v4(),
            customer_name: name.map(str::to_string),
            customer_email: name.map(|n| format!("{n}@example.com")),
        }
    }

    #[test]
    fn test_assemble_missing_caches_render_as_none() {
        let header = header(None);
        let customer_id = header.customer_id;
        let product_id = Uuid::new_v4();
        let view = assemble(
            header,
            vec![OrderItemRow {
                product_id,
                quantity: 2,
                unit_price: 500,
                product_title: None,
                product_sku: None,
                product_price: None,
            }],
        );

        assert_eq!(view.order.status, SdkOrderStatus::Created);
        assert_eq!(view.order.customer.id, customer_id);
        assert_eq!(view.order.customer.name, None);
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.items[0].product.id, product_id);
        assert_eq!(view.items[0].product.title, None);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json["order"]["customer"]["email"].is_null());
        assert!(json["items"][0]["product"]["price"].is_null());
        assert_eq!(json["items"][0]["unitPrice"], 500);
    }

    #[test]
    fn test_assemble_with_caches() {
        let view = assemble(
            header(Some("ada")),
            vec![OrderItemRow {
                product_id: Uuid::new_v4(),
                quantity: 1,
                unit_price: 100,
                product_title: Some("Lamp".into()),
                product_sku: Some("LMP-1".into()),
                product_price: Some(120),
            }],
        );

        assert_eq!(view.order.customer.name.as_deref(), Some("ada"));
        assert_eq!(view.order.customer.email.as_deref(), Some("ada@example.com"));
        // Quoted price and current cached price are kept apart.
        assert_eq!(view.items[0].unit_price, 100);
        assert_eq!(view.items[0].product.price, Some(120));
    }
}
