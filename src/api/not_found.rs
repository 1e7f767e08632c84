use axum::{
    http::StatusCode,
    response::{Html, IntoResponse},
};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Pages;

const NOT_FOUND_FALLBACK: &str = "<h1>404 Not Found</h1>";

/// Fallback for every unknown route
pub async fn not_found() -> impl IntoResponse {
    let page = Pages::get("404.html")
        .map(|content| String::from_utf8_lossy(&content.data).into_owned())
        .unwrap_or_else(|| NOT_FOUND_FALLBACK.to_string());

    (StatusCode::NOT_FOUND, Html(page))
}
