//! Customers service API.
//!
//! # Endpoints
//!
//! - `POST /customers`      – create a customer and announce it
//! - `GET  /customers/{id}` – fetch one customer

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ecom_core::entities::customer::{GetCustomerById, InsertCustomer};
use ecom_core::entities::outbox::OutboxMessageInsert;
use ecom_core::framework::db_timestamp_now;
use ecom_core::writer::{WriteError, commit_with_event};
use ecom_sdk::objects::{CreateCustomerRequest, Customer};
use kanau::processor::Processor;
use uuid::Uuid;

use super::{ApiError, ValidatedJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/customers/{id}", get(get_customer))
}

async fn create_customer(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let insert = InsertCustomer {
        id: Uuid::now_v7(),
        name: payload.name,
        email: payload.email,
        updated_at: db_timestamp_now(),
    };
    let outbox = OutboxMessageInsert::from_event(&insert.as_customer().upserted_event())
        .map_err(WriteError::from)?;

    let customer = commit_with_event(&state.db, insert, outbox).await?;
    tracing::info!(customer_id = %customer.id, "Customer created");

    Ok((StatusCode::CREATED, Json(Customer::from(customer))))
}

async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Customer>, ApiError> {
    let customer = state
        .db
        .process(GetCustomerById { id })
        .await?
        .ok_or(ApiError::NotFound("customer"))?;
    Ok(Json(customer.into()))
}
