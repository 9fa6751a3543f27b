pub mod cache;
pub mod customer;
pub mod order;
pub mod order_view;
pub mod outbox;
pub mod product;

use ecom_sdk::objects::OrderStatus as SdkOrderStatus;

/// Order status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `ecom_sdk::objects::OrderStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "order_status")]
pub enum OrderStatus {
    Created,
}

impl From<OrderStatus> for SdkOrderStatus {
    fn from(value: OrderStatus) -> Self {
        match value {
            OrderStatus::Created => SdkOrderStatus::Created,
        }
    }
}

impl From<SdkOrderStatus> for OrderStatus {
    fn from(value: SdkOrderStatus) -> Self {
        match value {
            SdkOrderStatus::Created => OrderStatus::Created,
        }
    }
}
