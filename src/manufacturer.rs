//! This file defines the `Manufacturer` type, its database functions, and the
//! API routes for creating and deleting manufacturers.
//! A manufacturer is the vendor whose products a deal resells, e.g., 'F5' or
//! 'Palo Alto Networks'.

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

use crate::{AppState, Error, alert::Alert, endpoints};

pub type ManufacturerId = i64;

/// A vendor whose products are resold, e.g., 'F5', 'Zscaler'.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manufacturer {
    /// The ID of the manufacturer.
    pub id: ManufacturerId,

    /// The display name of the manufacturer.
    pub name: String,

    /// When the manufacturer was created.
    pub created_at: OffsetDateTime,

    /// When the manufacturer was last updated.
    pub updated_at: OffsetDateTime,
}

/// Validate and normalize an entity name from a form.
///
/// # Errors
/// This function will return an [Error::EmptyName] if `name` is empty or only
/// whitespace.
pub(crate) fn validate_name(name: &str) -> Result<String, Error> {
    let name = name.trim();

    if name.is_empty() {
        Err(Error::EmptyName)
    } else {
        Ok(name.to_string())
    }
}

/// The state needed for creating a manufacturer.
#[derive(Debug, Clone)]
pub struct CreateManufacturerEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateManufacturerEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a manufacturer.
#[derive(Debug, Clone)]
pub struct DeleteManufacturerEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteManufacturerEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManufacturerFormData {
    pub name: String,
}

/// A route handler for creating a new manufacturer.
pub async fn create_manufacturer_endpoint(
    State(state): State<CreateManufacturerEndpointState>,
    Form(form_data): Form<ManufacturerFormData>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match create_manufacturer(&form_data.name, &connection) {
        Ok(_) => (
            HxRedirect(endpoints::DIRECTORY_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error @ Error::EmptyName) => error.into_alert_response(),
        Err(error) => {
            tracing::error!("An unexpected error occurred while creating a manufacturer: {error}");
            error.into_alert_response()
        }
    }
}

/// A route handler for deleting a manufacturer.
pub async fn delete_manufacturer_endpoint(
    Path(manufacturer_id): Path<ManufacturerId>,
    State(state): State<DeleteManufacturerEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match delete_manufacturer(manufacturer_id, &connection) {
        Ok(_) => Alert::success("Manufacturer deleted successfully").into_response(),
        Err(Error::InvalidReference) => Alert::error(
            "Could not delete manufacturer",
            "One or more deals still reference this manufacturer. \
            Delete or reassign those deals first.",
        )
        .into_response_with_status(StatusCode::CONFLICT),
        Err(Error::DeleteMissingEntry) => Error::DeleteMissingEntry.into_alert_response(),
        Err(error) => {
            tracing::error!(
                "An unexpected error occurred while deleting manufacturer {manufacturer_id}: {error}"
            );
            error.into_alert_response()
        }
    }
}

/// Create a manufacturer in the database.
///
/// # Errors
/// This function will return an [Error::EmptyName] if `name` is empty, or an
/// error if there is an SQL error.
pub fn create_manufacturer(name: &str, connection: &Connection) -> Result<Manufacturer, Error> {
    let name = validate_name(name)?;
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO manufacturer (name, created_at, updated_at) VALUES (?1, ?2, ?3);",
        (name.as_str(), now, now),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Manufacturer {
        id,
        name,
        created_at: now,
        updated_at: now,
    })
}

/// Retrieve all manufacturers in the database, sorted by name.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_manufacturers(connection: &Connection) -> Result<Vec<Manufacturer>, Error> {
    connection
        .prepare("SELECT id, name, created_at, updated_at FROM manufacturer ORDER BY name ASC;")?
        .query_map([], map_row)?
        .map(|maybe_manufacturer| maybe_manufacturer.map_err(|error| error.into()))
        .collect()
}

/// Build a lookup from manufacturer ID to name.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn manufacturer_names(
    connection: &Connection,
) -> Result<HashMap<ManufacturerId, String>, Error> {
    let manufacturers = get_all_manufacturers(connection)?;

    Ok(manufacturers
        .into_iter()
        .map(|manufacturer| (manufacturer.id, manufacturer.name))
        .collect())
}

/// Delete a manufacturer from the database.
///
/// # Errors
/// This function will return an error if the manufacturer doesn't exist, if
/// it is still referenced by a deal, or if there is an SQL error.
pub fn delete_manufacturer(
    manufacturer_id: ManufacturerId,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "DELETE FROM manufacturer WHERE id = ?1",
        [manufacturer_id],
    )?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingEntry);
    }

    Ok(())
}

pub fn create_manufacturer_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS manufacturer (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;

    Ok(())
}

fn map_row(row: &Row) -> Result<Manufacturer, rusqlite::Error> {
    Ok(Manufacturer {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

#[cfg(test)]
mod manufacturer_query_tests {
    use rusqlite::Connection;

    use crate::Error;

    use super::{
        create_manufacturer, create_manufacturer_table, delete_manufacturer,
        get_all_manufacturers, manufacturer_names,
    };

    fn get_test_db_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        create_manufacturer_table(&connection).expect("Could not create manufacturer table");
        connection
    }

    #[test]
    fn create_manufacturer_succeeds() {
        let connection = get_test_db_connection();

        let manufacturer = create_manufacturer("Palo Alto Networks", &connection)
            .expect("Could not create manufacturer");

        assert!(manufacturer.id > 0);
        assert_eq!(manufacturer.name, "Palo Alto Networks");
    }

    #[test]
    fn create_manufacturer_trims_whitespace() {
        let connection = get_test_db_connection();

        let manufacturer =
            create_manufacturer("  F5  ", &connection).expect("Could not create manufacturer");

        assert_eq!(manufacturer.name, "F5");
    }

    #[test]
    fn create_manufacturer_fails_on_empty_name() {
        let connection = get_test_db_connection();

        let result = create_manufacturer("\n\t \r", &connection);

        assert_eq!(result, Err(Error::EmptyName));
    }

    #[test]
    fn create_manufacturer_sets_timestamps_that_round_trip() {
        let connection = get_test_db_connection();

        let manufacturer =
            create_manufacturer("F5", &connection).expect("Could not create manufacturer");

        assert_eq!(manufacturer.created_at, manufacturer.updated_at);

        let stored = get_all_manufacturers(&connection).expect("Could not get manufacturers");
        assert_eq!(stored, vec![manufacturer]);
    }

    #[test]
    fn get_all_manufacturers_sorts_by_name() {
        let connection = get_test_db_connection();
        create_manufacturer("Zscaler", &connection).expect("Could not create manufacturer");
        create_manufacturer("Infoblox", &connection).expect("Could not create manufacturer");

        let manufacturers =
            get_all_manufacturers(&connection).expect("Could not get manufacturers");

        let names: Vec<&str> = manufacturers
            .iter()
            .map(|manufacturer| manufacturer.name.as_str())
            .collect();
        assert_eq!(names, vec!["Infoblox", "Zscaler"]);
    }

    #[test]
    fn manufacturer_names_maps_id_to_name() {
        let connection = get_test_db_connection();
        let manufacturer = create_manufacturer("Extreme Networks", &connection)
            .expect("Could not create manufacturer");

        let names = manufacturer_names(&connection).expect("Could not get name lookup");

        assert_eq!(
            names.get(&manufacturer.id),
            Some(&"Extreme Networks".to_owned())
        );
    }

    #[test]
    fn delete_manufacturer_succeeds() {
        let connection = get_test_db_connection();
        let manufacturer =
            create_manufacturer("Vectra AI", &connection).expect("Could not create manufacturer");

        let result = delete_manufacturer(manufacturer.id, &connection);

        assert!(result.is_ok());
        assert!(
            get_all_manufacturers(&connection)
                .expect("Could not get manufacturers")
                .is_empty()
        );
    }

    #[test]
    fn delete_manufacturer_with_invalid_id_returns_error() {
        let connection = get_test_db_connection();
        let invalid_id = 999999;

        let result = delete_manufacturer(invalid_id, &connection);

        assert_eq!(result, Err(Error::DeleteMissingEntry));
    }
}

#[cfg(test)]
mod manufacturer_endpoint_tests {
    use std::sync::{Arc, Mutex};

    use axum::{
        Form,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use rusqlite::Connection;

    use crate::endpoints;

    use super::{
        CreateManufacturerEndpointState, DeleteManufacturerEndpointState, ManufacturerFormData,
        create_manufacturer, create_manufacturer_endpoint, create_manufacturer_table,
        delete_manufacturer_endpoint, get_all_manufacturers,
    };

    fn get_test_db_connection() -> Arc<Mutex<Connection>> {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        create_manufacturer_table(&connection).expect("Could not create manufacturer table");

        Arc::new(Mutex::new(connection))
    }

    #[tokio::test]
    async fn create_manufacturer_endpoint_redirects_to_directory() {
        let db_connection = get_test_db_connection();
        let state = CreateManufacturerEndpointState {
            db_connection: db_connection.clone(),
        };
        let form = ManufacturerFormData {
            name: "Ingram Micro".to_string(),
        };

        let response = create_manufacturer_endpoint(State(state), Form(form))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            get_header(&response, "hx-redirect"),
            endpoints::DIRECTORY_VIEW
        );

        let manufacturers = get_all_manufacturers(&db_connection.lock().unwrap())
            .expect("Could not get manufacturers");
        assert_eq!(manufacturers.len(), 1);
        assert_eq!(manufacturers[0].name, "Ingram Micro");
    }

    #[tokio::test]
    async fn create_manufacturer_endpoint_with_empty_name_returns_error() {
        let state = CreateManufacturerEndpointState {
            db_connection: get_test_db_connection(),
        };
        let form = ManufacturerFormData {
            name: "".to_string(),
        };

        let response = create_manufacturer_endpoint(State(state), Form(form))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_manufacturer_endpoint_succeeds() {
        let db_connection = get_test_db_connection();
        let manufacturer = create_manufacturer("F5", &db_connection.lock().unwrap())
            .expect("Could not create test manufacturer");
        let state = DeleteManufacturerEndpointState { db_connection };

        let response = delete_manufacturer_endpoint(Path(manufacturer.id), State(state))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn delete_manufacturer_endpoint_with_invalid_id_returns_not_found() {
        let state = DeleteManufacturerEndpointState {
            db_connection: get_test_db_connection(),
        };
        let invalid_id = 999999;

        let response = delete_manufacturer_endpoint(Path(invalid_id), State(state))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[track_caller]
    fn get_header(response: &Response, header_name: &str) -> String {
        let header_error_message = format!("Headers missing {header_name}");

        response
            .headers()
            .get(header_name)
            .expect(&header_error_message)
            .to_str()
            .expect("Could not convert to str")
            .to_string()
    }
}
