pub mod health;

use crate::webhook;
use axum::Router;

pub fn router(webhook_path: &str) -> Router {
    Router::new()
        .merge(health::router())
        .merge(webhook::router(webhook_path))
}
