//! Orders service API.
//!
//! # Endpoints
//!
//! - `POST /orders`           – create an order with its items
//! - `GET  /orders/{id}/view` – order joined with cached customer and products

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ecom_core::entities::order::{InsertOrder, OrderItemInsert};
use ecom_core::entities::order_view::GetOrderView;
use ecom_core::framework::db_timestamp_now;
use ecom_core::writer::commit;
use ecom_sdk::objects::{CreateOrderRequest, CreateOrderResponse, OrderView};
use kanau::processor::Processor;
use uuid::Uuid;

use super::{ApiError, ValidatedJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}/view", get(get_order_view))
}

/// `POST /orders`: the order and all its items are written in one
/// transaction. Orders are not announced on the bus.
async fn create_order(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let customer_id = payload
        .customer_id
        .ok_or_else(|| ApiError::BadRequest("customerId and items required".to_string()))?;

    let order = commit(
        &state.db,
        InsertOrder {
            id: Uuid::now_v7(),
            customer_id,
            created_at: db_timestamp_now(),
            items: payload
                .items
                .into_iter()
                .map(|item| OrderItemInsert {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
        },
    )
    .await?;
    tracing::info!(order_id = %order.id, %customer_id, "Order created");

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse { order_id: order.id }),
    ))
}

async fn get_order_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderView>, ApiError> {
    let view = state
        .db
        .process(GetOrderView { order_id: id })
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    Ok(Json(view))
}
