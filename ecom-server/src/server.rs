//! Axum server setup and router configuration.

use crate::api::{self, handle_middleware_error};
use crate::config::ServiceRole;
use crate::state::AppState;
use axum::{
    Json, Router, error_handling::HandleErrorLayer, extract::State, response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

/// Build the router for the state's service role.
///
/// Every request runs under `request_timeout`. When it expires the handler
/// is dropped and 504 is returned; a transaction that already committed
/// stays committed.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let api = match state.role {
        ServiceRole::Catalog => api::catalog::router(),
        ServiceRole::Customers => api::customers::router(),
        ServiceRole::Orders => api::orders::router(),
    };

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(request_timeout),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: state.role.name(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Serve until `shutdown` completes, then stop accepting and drain open
/// connections.
pub async fn run_server(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    // The pool never connects; these requests are all answered before the
    // database is touched.
    fn router(role: ServiceRole) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/never")
            .unwrap();
        build_router(AppState::new(pool, role), Duration::from_secs(2))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(ServiceRole::Orders)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_routes_follow_role() {
        let response = router(ServiceRole::Catalog)
            .oneshot(post_json("/orders", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_order_without_customer_is_rejected() {
        let response = router(ServiceRole::Orders)
            .oneshot(post_json("/orders", r#"{"items": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected() {
        let response = router(ServiceRole::Catalog)
            .oneshot(post_json(
                "/products",
                r#"{"title": "", "sku": "X", "price": 1}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(ServiceRole::Customers)
            .oneshot(post_json("/customers", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected() {
        let response = router(ServiceRole::Orders)
            .oneshot(
                Request::get("/orders/not-a-uuid/view")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
