//! Alerts for displaying success and error messages to users.
//!
//! Alerts are returned as HTML fragments that HTMX swaps into the
//! `#alert-container` div of the base page template.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use maud::{Markup, html};

const SUCCESS_ALERT_STYLE: &str = "flex items-start gap-3 p-4 mb-4 rounded-lg \
    text-green-800 bg-green-50 dark:bg-gray-800 dark:text-green-400";
const ERROR_ALERT_STYLE: &str = "flex items-start gap-3 p-4 mb-4 rounded-lg \
    text-red-800 bg-red-50 dark:bg-gray-800 dark:text-red-400";

/// An alert message to display to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// An alert indicating an operation succeeded.
    Success {
        /// A short summary of what succeeded.
        message: String,
    },
    /// An alert indicating an operation failed.
    Error {
        /// A short summary of what went wrong.
        message: String,
        /// A longer explanation, ideally telling the user what to do next.
        details: String,
    },
}

impl Alert {
    /// Create a success alert.
    pub fn success(message: &str) -> Self {
        Alert::Success {
            message: message.to_owned(),
        }
    }

    /// Create an error alert.
    pub fn error(message: &str, details: &str) -> Self {
        Alert::Error {
            message: message.to_owned(),
            details: details.to_owned(),
        }
    }

    /// Render the alert as an HTML fragment.
    pub fn into_html(self) -> Markup {
        match self {
            Alert::Success { message } => html! {
                div class=(SUCCESS_ALERT_STYLE) role="alert"
                {
                    div
                    {
                        p class="font-medium" { (message) }
                    }
                    (dismiss_button())
                }
            },
            Alert::Error { message, details } => html! {
                div class=(ERROR_ALERT_STYLE) role="alert"
                {
                    div
                    {
                        p class="font-medium" { (message) }
                        p class="text-sm" { (details) }
                    }
                    (dismiss_button())
                }
            },
        }
    }

    /// Convert the alert into an HTTP response with the given status code.
    pub fn into_response_with_status(self, status_code: StatusCode) -> Response {
        (status_code, self.into_html()).into_response()
    }
}

impl IntoResponse for Alert {
    fn into_response(self) -> Response {
        self.into_response_with_status(StatusCode::OK)
    }
}

fn dismiss_button() -> Markup {
    html! {
        button
            type="button"
            class="ms-auto -mx-1.5 -my-1.5 rounded-lg p-1.5 hover:bg-gray-100 dark:hover:bg-gray-700"
            aria-label="Close"
            onclick="this.parentElement.remove()"
        {
            "✕"
        }
    }
}

#[cfg(test)]
mod alert_tests {
    use axum::http::StatusCode;
    use scraper::{Html, Selector};

    use super::Alert;

    #[test]
    fn error_alert_renders_message_and_details() {
        let markup = Alert::error("Something failed", "Here is what to do.").into_html();
        let html = Html::parse_fragment(&markup.into_string());

        let p = Selector::parse("p").unwrap();
        let paragraphs: Vec<String> = html
            .select(&p)
            .map(|element| element.text().collect::<String>())
            .collect();

        assert_eq!(paragraphs, vec!["Something failed", "Here is what to do."]);
    }

    #[tokio::test]
    async fn into_response_with_status_sets_status() {
        let response = Alert::error("Nope", "Not found")
            .into_response_with_status(StatusCode::NOT_FOUND);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
