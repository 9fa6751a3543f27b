//! Catalog service API.
//!
//! # Endpoints
//!
//! - `POST /products`       – create a product and announce it
//! - `GET  /products/{id}`  – fetch one product
//! - `POST /products/batch` – fetch many products; unknown ids are skipped

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use ecom_core::entities::outbox::OutboxMessageInsert;
use ecom_core::entities::product::{GetProductById, GetProductsByIds, InsertProduct};
use ecom_core::framework::db_timestamp_now;
use ecom_core::writer::{WriteError, commit_with_event};
use ecom_sdk::objects::{CreateProductRequest, Product, ProductBatchRequest};
use kanau::processor::Processor;
use uuid::Uuid;

use super::{ApiError, ValidatedJson};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/batch", post(get_products_batch))
        .route("/products/{id}", get(get_product))
}

/// `POST /products`: the product row and its `product.upserted` outbox row
/// are committed together.
async fn create_product(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateProductRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let insert = InsertProduct {
        id: Uuid::now_v7(),
        title: payload.title,
        sku: payload.sku,
        price: payload.price,
        updated_at: db_timestamp_now(),
    };
    let outbox = OutboxMessageInsert::from_event(&insert.as_product().upserted_event())
        .map_err(WriteError::from)?;

    let product = commit_with_event(&state.db, insert, outbox).await?;
    tracing::info!(product_id = %product.id, "Product created");

    Ok((StatusCode::CREATED, Json(Product::from(product))))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .db
        .process(GetProductById { id })
        .await?
        .ok_or(ApiError::NotFound("product"))?;
    Ok(Json(product.into()))
}

async fn get_products_batch(
    State(state): State<AppState>,
    Json(payload): Json<ProductBatchRequest>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = state
        .db
        .process(GetProductsByIds { ids: payload.ids })
        .await?;
    Ok(Json(products.into_iter().map(Product::from).collect()))
}
