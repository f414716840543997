//! Route definitions for the stock transfer platform

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - locations
        .nest("/locations", location_routes(state.clone()))
        // Protected routes - transfers
        .nest("/transfers", transfer_routes(state.clone()))
        // Protected routes - stock ledger
        .nest("/stock", stock_routes(state))
}

/// Location routes (protected)
fn location_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_locations).post(handlers::create_location))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Transfer routes (protected)
fn transfer_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_transfers).post(handlers::create_transfer))
        .route("/code/:code", get(handlers::get_transfer_by_code))
        .route(
            "/:transfer_id",
            get(handlers::get_transfer).put(handlers::update_transfer),
        )
        .route("/:transfer_id/history", get(handlers::get_transfer_history))
        .route("/:transfer_id/dispatch", post(handlers::dispatch_transfer))
        .route("/:transfer_id/receive", post(handlers::receive_transfer))
        .route("/:transfer_id/cancel", post(handlers::cancel_transfer))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Stock ledger routes (protected)
fn stock_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/locations/:location_id", get(handlers::list_location_stock))
        .route(
            "/locations/:location_id/products/:product_id/movements",
            get(handlers::list_product_movements),
        )
        .route("/adjustments", post(handlers::create_adjustment))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
