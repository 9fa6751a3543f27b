//! Integration event contracts.
//!
//! Every event travels over one durable topic exchange. The routing key is
//! a dot-segmented event-type identifier and the body is the JSON encoding
//! of the event struct. Payloads are snapshots taken when the event was
//! enqueued; consumers must tolerate duplicates and out-of-order arrival.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;
use uuid::Uuid;

/// The topic exchange carrying all domain events.
pub const EXCHANGE_NAME: &str = "domain.events";

/// Content type declared on every published message.
pub const CONTENT_TYPE: &str = "application/json";

pub const PRODUCT_UPSERTED: &str = "product.upserted";
pub const CUSTOMER_UPSERTED: &str = "customer.upserted";

/// An event that can be announced through the outbox.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + 'static {
    /// Routing key the event is published under.
    const ROUTING_KEY: &'static str;

    /// Id of the entity the event describes.
    fn entity_id(&self) -> Uuid;

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// Snapshot of a product, emitted by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpserted {
    pub id: Uuid,
    pub title: String,
    pub sku: String,
    /// Price in minor currency units (cents).
    pub price: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl IntegrationEvent for ProductUpserted {
    const ROUTING_KEY: &'static str = PRODUCT_UPSERTED;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

/// Snapshot of a customer, emitted by the customers service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpserted {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl IntegrationEvent for CustomerUpserted {
    const ROUTING_KEY: &'static str = CUSTOMER_UPSERTED;

    fn entity_id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn product_payload_uses_camel_case_fields() {
        let event = ProductUpserted {
            id: Uuid::nil(),
            title: "Mug".to_string(),
            sku: "MUG-1".to_string(),
            price: 1299,
            updated_at: datetime!(2024-05-01 12:00:00 UTC),
        };

        let json: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();
        assert_eq!(json["price"], 1299);
        assert_eq!(json["updatedAt"], "2024-05-01T12:00:00Z");
        assert!(json.get("updated_at").is_none());
    }

    #[test]
    fn customer_payload_decodes_from_foreign_producer() {
        let body = br#"{
            "id": "6f1c3c1e-8f3a-4a4e-9d7e-2b1f0c9a7e11",
            "name": "Ada",
            "email": "ada@example.com",
            "updatedAt": "2024-05-01T12:00:00.123456Z"
        }"#;

        let event = CustomerUpserted::decode(body).unwrap();
        assert_eq!(event.name, "Ada");
        assert_eq!(event.updated_at.nanosecond(), 123_456_000);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(CustomerUpserted::decode(b"{\"id\": 42}").is_err());
        assert!(ProductUpserted::decode(b"not json").is_err());
    }

    #[test]
    fn routing_keys_are_dot_segmented() {
        assert_eq!(ProductUpserted::ROUTING_KEY, "product.upserted");
        assert_eq!(CustomerUpserted::ROUTING_KEY, "customer.upserted");
    }
}
