//! HTTP request and response objects for the service APIs.

pub mod catalog;
pub mod customers;
pub mod orders;

pub use catalog::{CreateProductRequest, Product, ProductBatchRequest};
pub use customers::{CreateCustomerRequest, Customer};
pub use orders::{
    CreateOrderRequest, CreateOrderResponse, CustomerSnapshot, OrderHeaderView, OrderItemRequest,
    OrderItemView, OrderStatus, OrderView, ProductSnapshot,
};

/// A request body that failed validation.
///
/// Validation happens before anything touches the store or the bus.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Request bodies that can be checked for client-side mistakes.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}
