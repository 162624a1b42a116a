//! This file defines the `Reseller` type, its database functions, and the API
//! routes for creating and deleting resellers.
//! A reseller is the channel partner a deal is sold through, e.g., 'ATEA' or
//! 'Westcon-Comstor'.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Form,
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_htmx::HxRedirect;
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{AppState, Error, alert::Alert, endpoints, manufacturer::validate_name};

pub type ResellerId = i64;

/// A channel partner that deals are sold through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reseller {
    /// The ID of the reseller.
    pub id: ResellerId,

    /// The display name of the reseller.
    pub name: String,

    /// When the reseller was created.
    pub created_at: OffsetDateTime,

    /// When the reseller was last updated.
    pub updated_at: OffsetDateTime,
}

/// The state needed for creating a reseller.
#[derive(Debug, Clone)]
pub struct CreateResellerEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateResellerEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a reseller.
#[derive(Debug, Clone)]
pub struct DeleteResellerEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteResellerEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResellerFormData {
    pub name: String,
}

/// A route handler for creating a new reseller.
pub async fn create_reseller_endpoint(
    State(state): State<CreateResellerEndpointState>,
    Form(form_data): Form<ResellerFormData>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match create_reseller(&form_data.name, &connection) {
        Ok(_) => (
            HxRedirect(endpoints::DIRECTORY_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => {
            tracing::error!("Could not create reseller: {error}");
            error.into_alert_response()
        }
    }
}

/// A route handler for deleting a reseller.
pub async fn delete_reseller_endpoint(
    Path(reseller_id): Path<ResellerId>,
    State(state): State<DeleteResellerEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match delete_reseller(reseller_id, &connection) {
        Ok(_) => Alert::success("Reseller deleted successfully").into_response(),
        Err(Error::InvalidReference) => Alert::error(
            "Could not delete reseller",
            "One or more deals still reference this reseller. \
            Delete or reassign those deals first.",
        )
        .into_response_with_status(StatusCode::CONFLICT),
        Err(Error::DeleteMissingEntry) => Error::DeleteMissingEntry.into_alert_response(),
        Err(error) => {
            tracing::error!(
                "An unexpected error occurred while deleting reseller {reseller_id}: {error}"
            );
            error.into_alert_response()
        }
    }
}

/// Create a reseller in the database.
///
/// # Errors
/// This function will return an [Error::EmptyName] if `name` is empty, or an
/// error if there is an SQL error.
pub fn create_reseller(name: &str, connection: &Connection) -> Result<Reseller, Error> {
    let name = validate_name(name)?;
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO reseller (name, created_at, updated_at) VALUES (?1, ?2, ?3);",
        (name.as_str(), now, now),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Reseller {
        id,
        name,
        created_at: now,
        updated_at: now,
    })
}

/// Retrieve all resellers in the database, sorted by name.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_resellers(connection: &Connection) -> Result<Vec<Reseller>, Error> {
    connection
        .prepare("SELECT id, name, created_at, updated_at FROM reseller ORDER BY name ASC;")?
        .query_map([], map_row)?
        .map(|maybe_reseller| maybe_reseller.map_err(|error| error.into()))
        .collect()
}

/// Build a lookup from reseller ID to name.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn reseller_names(connection: &Connection) -> Result<HashMap<ResellerId, String>, Error> {
    let resellers = get_all_resellers(connection)?;

    Ok(resellers
        .into_iter()
        .map(|reseller| (reseller.id, reseller.name))
        .collect())
}

/// Delete a reseller from the database.
///
/// # Errors
/// This function will return an error if the reseller doesn't exist, if it is
/// still referenced by a deal, or if there is an SQL error.
pub fn delete_reseller(reseller_id: ResellerId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM reseller WHERE id = ?1", [reseller_id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingEntry);
    }

    Ok(())
}

pub fn create_reseller_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS reseller (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Reseller, rusqlite::Error> {
    Ok(Reseller {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

#[cfg(test)]
mod reseller_query_tests {
    use rusqlite::Connection;

    use crate::Error;

    use super::{create_reseller, create_reseller_table, delete_reseller, get_all_resellers};

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        create_reseller_table(&connection).expect("Could not create reseller table");
        connection
    }

    #[test]
    fn create_reseller_succeeds() {
        let connection = get_test_db_connection();

        let reseller = create_reseller("Dustin", &connection).expect("Could not create reseller");

        assert!(reseller.id > 0);
        assert_eq!(reseller.name, "Dustin");
    }

    #[test]
    fn create_reseller_fails_on_empty_name() {
        let connection = get_test_db_connection();

        let result = create_reseller("   ", &connection);

        assert_eq!(result, Err(Error::EmptyName));
    }

    #[test]
    fn create_reseller_sets_timestamps_that_round_trip() {
        let connection = get_test_db_connection();

        let reseller = create_reseller("ATEA", &connection).expect("Could not create reseller");

        assert_eq!(reseller.created_at, reseller.updated_at);

        let stored = get_all_resellers(&connection).expect("Could not get resellers");
        assert_eq!(stored, vec![reseller]);
    }

    #[test]
    fn get_all_resellers_sorts_by_name() {
        let connection = get_test_db_connection();
        create_reseller("Westcon-Comstor", &connection).expect("Could not create reseller");
        create_reseller("ATEA", &connection).expect("Could not create reseller");

        let resellers = get_all_resellers(&connection).expect("Could not get resellers");

        let names: Vec<&str> = resellers
            .iter()
            .map(|reseller| reseller.name.as_str())
            .collect();
        assert_eq!(names, vec!["ATEA", "Westcon-Comstor"]);
    }

    #[test]
    fn delete_reseller_with_invalid_id_returns_error() {
        let connection = get_test_db_connection();

        let result = delete_reseller(999999, &connection);

        assert_eq!(result, Err(Error::DeleteMissingEntry));
    }
}
