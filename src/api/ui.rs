//! Companion web page served at the root

use axum::{Router, response::Html, routing::get};

const COMPANION_PAGE: &str = include_str!("../../assets/companion.html");

async fn index() -> Html<&'static str> {
    Html(COMPANION_PAGE)
}

/// Build UI router
pub fn router() -> Router {
    Router::new().route("/", get(index))
}
