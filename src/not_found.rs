//! Defines the route handler and templates for 404 and 500 error pages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use maud::Markup;

use crate::html::error_view;

/// The fallback route handler for requests that match no other route.
pub async fn get_404_not_found() -> Response {
    get_404_not_found_response()
}

/// Create a 404 response with the not found page.
pub fn get_404_not_found_response() -> Response {
    (
        StatusCode::NOT_FOUND,
        error_view(
            "Not Found",
            "404",
            "Sorry, the page you were looking for does not exist.",
            "Check the URL for typos or head back to the dashboard.",
        ),
    )
        .into_response()
}

/// Render the page shown when an unexpected error occurs.
pub fn internal_server_error_page() -> Markup {
    error_view(
        "Internal Server Error",
        "500",
        "Sorry, something went wrong.",
        "Try again later or check the server logs.",
    )
}

#[cfg(test)]
mod not_found_tests {
    use axum::http::StatusCode;

    use super::get_404_not_found;

    #[tokio::test]
    async fn returns_not_found_status() {
        let response = get_404_not_found().await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
