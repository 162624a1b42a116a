//! Dealcast is a web app for forecasting a sales pipeline of reseller deals.
//!
//! Deals are recorded against a manufacturer, a reseller, and optionally a
//! BDM, with a sell price, margin, win probability, and an expected close
//! month. The app derives probability-weighted forecasts, KPI totals,
//! per-manufacturer and per-reseller breakdowns, and committed/best-case/
//! worst-case categorizations, and serves them as HTML pages and CSV
//! downloads.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use tokio::signal;

mod alert;
mod app_state;
mod bdm;
mod dashboard;
mod db;
mod deal;
mod directory;
mod endpoints;
mod export;
mod forecast;
mod html;
mod manufacturer;
mod matrix;
mod month;
mod navigation;
mod not_found;
mod reseller;
mod routing;

pub use app_state::AppState;
pub use bdm::create_bdm;
pub use db::initialize as initialize_db;
pub use deal::{DealDraft, DealStatus, create_deal};
pub use manufacturer::create_manufacturer;
pub use month::Month;
pub use reseller::create_reseller;
pub use routing::build_router;

use crate::{
    alert::Alert,
    not_found::{get_404_not_found_response, internal_server_error_page},
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An empty string was used for a manufacturer, reseller, or BDM name.
    #[error("name cannot be empty")]
    EmptyName,

    /// An empty string was used for a deal's end customer.
    #[error("end customer cannot be empty")]
    EmptyEndCustomer,

    /// A ratio field (probability or margin) was outside [0, 1].
    ///
    /// Probabilities and margins are stored as fractions, so a value of
    /// 1.07 almost always means the caller sent a percentage.
    #[error("{field} must be between 0 and 1, got {value}")]
    RatioOutOfRange {
        /// The name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A negative sell price was used to create or update a deal.
    #[error("sell price must not be negative, got {0}")]
    NegativeSellPrice(f64),

    /// A string could not be parsed as a `"YYYY-MM"` month.
    #[error("\"{0}\" is not a valid month, expected the format YYYY-MM")]
    InvalidMonth(String),

    /// A string could not be parsed as a deal status.
    #[error("\"{0}\" is not a valid deal status")]
    InvalidStatus(String),

    /// A deal referenced a manufacturer, reseller, or BDM that does not
    /// exist in the database.
    #[error("a referenced manufacturer, reseller, or BDM does not exist")]
    InvalidReference,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// Tried to update a deal that does not exist
    #[error("tried to update a deal that is not in the database")]
    UpdateMissingDeal,

    /// Tried to delete a deal that does not exist
    #[error("tried to delete a deal that is not in the database")]
    DeleteMissingDeal,

    /// Tried to update a manufacturer, reseller, or BDM that does not exist
    #[error("tried to update an entry that is not in the database")]
    UpdateMissingEntry,

    /// Tried to delete a manufacturer, reseller, or BDM that does not exist
    #[error("tried to delete an entry that is not in the database")]
    DeleteMissingEntry,

    /// An error occurred while writing a CSV export.
    #[error("could not write CSV export: {0}")]
    CsvError(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(_))
                if sql_error.extended_code == 787 =>
            {
                Error::InvalidReference
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::NotFound => get_404_not_found_response(),
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (StatusCode::INTERNAL_SERVER_ERROR, internal_server_error_page()).into_response()
            }
        }
    }
}

impl Error {
    fn into_alert_response(self) -> Response {
        match self {
            Error::InvalidReference => Alert::error(
                "Invalid reference",
                "The selected manufacturer, reseller, or BDM no longer exists. \
                Refresh the page and try again.",
            )
            .into_response_with_status(StatusCode::BAD_REQUEST),
            Error::UpdateMissingDeal => Alert::error(
                "Could not update deal",
                "The deal could not be found. \
                Try refreshing the page to see if the deal has already been deleted.",
            )
            .into_response_with_status(StatusCode::NOT_FOUND),
            Error::DeleteMissingDeal => Alert::error(
                "Could not delete deal",
                "The deal could not be found. \
                Try refreshing the page to see if the deal has already been deleted.",
            )
            .into_response_with_status(StatusCode::NOT_FOUND),
            Error::UpdateMissingEntry => Alert::error(
                "Could not update entry",
                "The entry could not be found.",
            )
            .into_response_with_status(StatusCode::NOT_FOUND),
            Error::DeleteMissingEntry => Alert::error(
                "Could not delete entry",
                "The entry could not be found. \
                Try refreshing the page to see if it has already been deleted.",
            )
            .into_response_with_status(StatusCode::NOT_FOUND),
            error @ (Error::EmptyName
            | Error::EmptyEndCustomer
            | Error::RatioOutOfRange { .. }
            | Error::NegativeSellPrice(_)
            | Error::InvalidMonth(_)
            | Error::InvalidStatus(_)) => {
                Alert::error("Invalid input", &error.to_string())
                    .into_response_with_status(StatusCode::BAD_REQUEST)
            }
            error => {
                tracing::error!("An unexpected error occurred: {}", error);

                Alert::error(
                    "Something went wrong",
                    "An unexpected error occurred, check the server logs for more details.",
                )
                .into_response_with_status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
