use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Validate, ValidationError};

/// `POST /products` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub sku: String,
    /// Price in minor currency units.
    pub price: i64,
}

impl Validate for CreateProductRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::new("title is required"));
        }
        if self.sku.trim().is_empty() {
            return Err(ValidationError::new("sku is required"));
        }
        if self.price < 0 {
            return Err(ValidationError::new("price must not be negative"));
        }
        Ok(())
    }
}

/// `POST /products/batch` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductBatchRequest {
    pub ids: Vec<Uuid>,
}

/// A product as returned by the catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub sku: String,
    pub price: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, sku: &str, price: i64) -> CreateProductRequest {
        CreateProductRequest {
            title: title.to_string(),
            sku: sku.to_string(),
            price,
        }
    }

    #[test]
    fn test_product_validation() {
        assert!(request("Mug", "MUG-1", 0).validate().is_ok());
        assert!(request("  ", "MUG-1", 10).validate().is_err());
        assert!(request("Mug", "", 10).validate().is_err());
        assert_eq!(
            request("Mug", "MUG-1", -1).validate(),
            Err(ValidationError::new("price must not be negative"))
        );
    }
}
