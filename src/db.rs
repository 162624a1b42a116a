//! Database initialization for the application's domain models.

use rusqlite::Connection;

use crate::{
    Error, bdm::create_bdm_table, deal::create_deal_table,
    manufacturer::create_manufacturer_table, reseller::create_reseller_table,
};

/// Create the tables for the application's domain models if they do not
/// already exist, and enable foreign key enforcement for the connection.
///
/// The deal table references the manufacturer, reseller, and BDM tables, so
/// those are created first.
///
/// # Errors
/// Returns an [Error::SqlError] if any table could not be created.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;

    create_manufacturer_table(connection)?;
    create_reseller_table(connection)?;
    create_bdm_table(connection)?;
    create_deal_table(connection)?;

    Ok(())
}

#[cfg(test)]
mod initialize_tests {
    use rusqlite::Connection;

    use super::initialize;

    #[test]
    fn creates_all_tables() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");

        let mut statement = connection
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        let table_names: Vec<String> = statement
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|name| name.unwrap())
            .collect();

        for want in ["bdm", "deal", "manufacturer", "reseller"] {
            assert!(
                table_names.iter().any(|name| name == want),
                "want table {want} in {table_names:?}"
            );
        }
    }

    #[test]
    fn is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        initialize(&connection).expect("Could not initialize database");
        initialize(&connection).expect("Second initialize failed");
    }
}
