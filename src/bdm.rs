//! This file defines the `Bdm` type, its database functions, and the API
//! routes for creating and deleting BDMs.
//! A BDM (business development manager) is the salesperson who owns a deal.
//! Deals may have no BDM assigned.

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

pub type BdmId = i64;

/// A business development manager who owns deals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bdm {
    /// The ID of the BDM.
    pub id: BdmId,

    /// The display name of the BDM.
    pub name: String,

    /// When the BDM was created.
    pub created_at: OffsetDateTime,

    /// When the BDM was last updated.
    pub updated_at: OffsetDateTime,
}

/// The state needed for creating a BDM.
#[derive(Debug, Clone)]
pub struct CreateBdmEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateBdmEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a BDM.
#[derive(Debug, Clone)]
pub struct DeleteBdmEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteBdmEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BdmFormData {
    pub name: String,
}

/// A route handler for creating a new BDM.
pub async fn create_bdm_endpoint(
    State(state): State<CreateBdmEndpointState>,
    Form(form_data): Form<BdmFormData>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match create_bdm(&form_data.name, &connection) {
        Ok(_) => (
            HxRedirect(endpoints::DIRECTORY_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => {
            tracing::error!("Could not create BDM: {error}");
            error.into_alert_response()
        }
    }
}

/// A route handler for deleting a BDM.
///
/// Deals owned by the deleted BDM keep existing with no BDM assigned.
pub async fn delete_bdm_endpoint(
    Path(bdm_id): Path<BdmId>,
    State(state): State<DeleteBdmEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match delete_bdm(bdm_id, &connection) {
        Ok(_) => Alert::success("BDM deleted successfully").into_response(),
        Err(Error::DeleteMissingEntry) => Error::DeleteMissingEntry.into_alert_response(),
        Err(error) => {
            tracing::error!("An unexpected error occurred while deleting BDM {bdm_id}: {error}");
            error.into_alert_response()
        }
    }
}

/// Create a BDM in the database.
///
/// # Errors
/// This function will return an [Error::EmptyName] if `name` is empty, or an
/// error if there is an SQL error.
pub fn create_bdm(name: &str, connection: &Connection) -> Result<Bdm, Error> {
    let name = validate_name(name)?;
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO bdm (name, created_at, updated_at) VALUES (?1, ?2, ?3);",
        (name.as_str(), now, now),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Bdm {
        id,
        name,
        created_at: now,
        updated_at: now,
    })
}

/// Retrieve all BDMs in the database, sorted by name.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_bdms(connection: &Connection) -> Result<Vec<Bdm>, Error> {
    connection
        .prepare("SELECT id, name, created_at, updated_at FROM bdm ORDER BY name ASC;")?
        .query_map([], map_row)?
        .map(|maybe_bdm| maybe_bdm.map_err(|error| error.into()))
        .collect()
}

/// Build a lookup from BDM ID to name.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn bdm_names(connection: &Connection) -> Result<HashMap<BdmId, String>, Error> {
    let bdms = get_all_bdms(connection)?;

    Ok(bdms.into_iter().map(|bdm| (bdm.id, bdm.name)).collect())
}

/// Delete a BDM from the database.
///
/// # Errors
/// This function will return an error if the BDM doesn't exist or if there is
/// an SQL error.
pub fn delete_bdm(bdm_id: BdmId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM bdm WHERE id = ?1", [bdm_id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingEntry);
    }

    Ok(())
}

pub fn create_bdm_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS bdm (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Bdm, rusqlite::Error> {
    Ok(Bdm {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

#[cfg(test)]
mod bdm_query_tests {
    use rusqlite::Connection;

    use crate::Error;

    use super::{create_bdm, create_bdm_table, delete_bdm, get_all_bdms};

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        create_bdm_table(&connection).expect("Could not create bdm table");
        connection
    }

    #[test]
    fn create_bdm_succeeds() {
        let connection = get_test_db_connection();

        let bdm = create_bdm("Anna Lindqvist", &connection).expect("Could not create BDM");

        assert!(bdm.id > 0);
        assert_eq!(bdm.name, "Anna Lindqvist");
    }

    #[test]
    fn create_bdm_sets_timestamps_that_round_trip() {
        let connection = get_test_db_connection();

        let bdm = create_bdm("Maria Bergström", &connection).expect("Could not create BDM");

        assert_eq!(bdm.created_at, bdm.updated_at);

        let stored = get_all_bdms(&connection).expect("Could not get BDMs");
        assert_eq!(stored, vec![bdm]);
    }

    #[test]
    fn delete_bdm_removes_row() {
        let connection = get_test_db_connection();
        let bdm = create_bdm("Erik Johansson", &connection).expect("Could not create BDM");

        delete_bdm(bdm.id, &connection).expect("Could not delete BDM");

        assert!(
            get_all_bdms(&connection)
                .expect("Could not get BDMs")
                .is_empty()
        );
    }

    #[test]
    fn delete_bdm_with_invalid_id_returns_error() {
        let connection = get_test_db_connection();

        let result = delete_bdm(999999, &connection);

        assert_eq!(result, Err(Error::DeleteMissingEntry));
    }
}
