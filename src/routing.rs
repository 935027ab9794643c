//! Application router configuration wiring the endpoint paths to the
//! transaction route handlers.

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::{
    AppState, endpoints,
    logging::logging_middleware,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint,
        get_receive_transactions_endpoint, get_spent_transactions_endpoint,
        get_transactions_by_category_endpoint, get_transactions_endpoint,
        update_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            endpoints::TRANSACTIONS,
            post(create_transaction_endpoint).get(get_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_SPENT,
            get(get_spent_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_RECEIVE,
            get(get_receive_transactions_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS_BY_CATEGORY,
            get(get_transactions_by_category_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(update_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .layer(middleware::from_fn(logging_middleware))
        .with_state(state)
}
