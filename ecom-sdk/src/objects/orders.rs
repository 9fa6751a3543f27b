//! Order objects, including the assembled order view.
//!
//! The view mixes order data owned by the orders service with cached copies
//! of customers and products. Cached fields are `Option` because the cache
//! may not have caught up yet; they serialize as `null`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Validate, ValidationError};

/// `POST /orders` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.customer_id.is_none() || self.items.is_empty() {
            return Err(ValidationError::new("customerId and items required"));
        }
        let mut seen = std::collections::HashSet::new();
        for item in &self.items {
            if !seen.insert(item.product_id) {
                return Err(ValidationError::new("duplicate productId in items"));
            }
            if item.quantity <= 0 {
                return Err(ValidationError::new("quantity must be positive"));
            }
            if item.unit_price < 0 {
                return Err(ValidationError::new("unitPrice must not be negative"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Created => write!(f, "CREATED"),
        }
    }
}

/// `GET /orders/{id}/view` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub order: OrderHeaderView,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHeaderView {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub status: OrderStatus,
    pub customer: CustomerSnapshot,
}

/// Cached customer data; fields are `None` until the cache row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub product: ProductSnapshot,
}

/// Cached product data; fields are `None` until the cache row exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: Uuid,
    pub title: Option<String>,
    pub sku: Option<String>,
    pub price: Option<i64>,
}
