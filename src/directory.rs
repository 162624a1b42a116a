//! The directory page for managing manufacturers, resellers, and BDMs.

use std::collections::HashMap;

use axum::{
    extract::{FromRef, State},
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::{
    AppState, Error,
    bdm::{Bdm, get_all_bdms},
    endpoints,
    html::{
        BUTTON_DELETE_STYLE, BUTTON_PRIMARY_STYLE, FORM_TEXT_INPUT_STYLE, PAGE_CONTAINER_STYLE,
        TABLE_CELL_STYLE, TABLE_HEADER_STYLE, TABLE_ROW_STYLE, base,
    },
    manufacturer::{Manufacturer, ManufacturerId, get_all_manufacturers},
    navigation::NavBar,
    reseller::{Reseller, ResellerId, get_all_resellers},
};

/// The state needed for the directory page.
#[derive(Debug, Clone)]
pub struct DirectoryPageState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DirectoryPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A directory entry with everything the table row template needs.
struct EntryRow {
    name: String,
    delete_url: String,
    deal_count: u64,
}

fn quick_add_form(post_endpoint: &str, placeholder: &str) -> Markup {
    html! {
        form
            hx-post=(post_endpoint)
            hx-target-error="#alert-container"
            class="flex gap-2 items-end mb-4"
        {
            input
                type="text"
                name="name"
                placeholder=(placeholder)
                required
                class=(FORM_TEXT_INPUT_STYLE);

            button type="submit" class=(BUTTON_PRIMARY_STYLE) { "Add" }
        }
    }
}

fn entry_table(title: &str, post_endpoint: &str, entries: &[EntryRow]) -> Markup {
    let table_row = |entry: &EntryRow| {
        html!(
            tr class=(TABLE_ROW_STYLE)
            {
                td class=(TABLE_CELL_STYLE) { (entry.name) }

                td class=(TABLE_CELL_STYLE) { (entry.deal_count) }

                td class=(TABLE_CELL_STYLE)
                {
                    button
                        hx-delete=(entry.delete_url)
                        hx-confirm={
                            "Are you sure you want to delete '" (entry.name) "'?"
                        }
                        hx-target="closest tr"
                        hx-target-error="#alert-container"
                        hx-swap="delete"
                        class=(BUTTON_DELETE_STYLE)
                    {
                        "Delete"
                    }
                }
            }
        )
    };

    html!(
        div class="w-full max-w-xl mb-8"
        {
            h2 class="text-xl font-bold mb-2" { (title) }

            (quick_add_form(post_endpoint, &format!("{title} name")))

            table class="w-full text-sm text-left rtl:text-right
                text-gray-500 dark:text-gray-400"
            {
                thead class=(TABLE_HEADER_STYLE)
                {
                    tr
                    {
                        th scope="col" class=(TABLE_CELL_STYLE) { "Name" }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Deals" }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Actions" }
                    }
                }

                tbody
                {
                    @for entry in entries {
                        (table_row(entry))
                    }

                    @if entries.is_empty() {
                        tr
                        {
                            td
                                colspan="3"
                                class="px-6 py-4 text-center
                                    text-gray-500 dark:text-gray-400"
                            {
                                "Nothing here yet."
                            }
                        }
                    }
                }
            }
        }
    )
}

fn directory_view(
    manufacturers: &[EntryRow],
    resellers: &[EntryRow],
    bdms: &[EntryRow],
) -> Markup {
    let nav_bar = NavBar::new(endpoints::DIRECTORY_VIEW).into_html();

    let content = html!(
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            h1 class="text-2xl font-bold mb-6" { "Directory" }

            (entry_table("Manufacturer", endpoints::POST_MANUFACTURER, manufacturers))
            (entry_table("Reseller", endpoints::POST_RESELLER, resellers))
            (entry_table("BDM", endpoints::POST_BDM, bdms))
        }
    );

    base("Directory", &[], &content)
}

/// Route handler for the directory page.
pub async fn get_directory_page(State(state): State<DirectoryPageState>) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let manufacturers = get_all_manufacturers(&connection)
        .inspect_err(|error| tracing::error!("Failed to retrieve manufacturers: {error}"))?;
    let resellers = get_all_resellers(&connection)
        .inspect_err(|error| tracing::error!("Failed to retrieve resellers: {error}"))?;
    let bdms = get_all_bdms(&connection)
        .inspect_err(|error| tracing::error!("Failed to retrieve BDMs: {error}"))?;

    let deals_per_manufacturer = count_deals_per_manufacturer(&connection)
        .inspect_err(|error| tracing::error!("Could not count deals per manufacturer: {error}"))?;
    let deals_per_reseller = count_deals_per_reseller(&connection)
        .inspect_err(|error| tracing::error!("Could not count deals per reseller: {error}"))?;
    let deals_per_bdm = count_deals_per_bdm(&connection)
        .inspect_err(|error| tracing::error!("Could not count deals per BDM: {error}"))?;

    let manufacturer_rows: Vec<EntryRow> = manufacturers
        .into_iter()
        .map(|Manufacturer { id, name, .. }| EntryRow {
            name,
            delete_url: endpoints::format_endpoint(endpoints::DELETE_MANUFACTURER, id),
            deal_count: *deals_per_manufacturer.get(&id).unwrap_or(&0),
        })
        .collect();

    let reseller_rows: Vec<EntryRow> = resellers
        .into_iter()
        .map(|Reseller { id, name, .. }| EntryRow {
            name,
            delete_url: endpoints::format_endpoint(endpoints::DELETE_RESELLER, id),
            deal_count: *deals_per_reseller.get(&id).unwrap_or(&0),
        })
        .collect();

    let bdm_rows: Vec<EntryRow> = bdms
        .into_iter()
        .map(|Bdm { id, name, .. }| EntryRow {
            name,
            delete_url: endpoints::format_endpoint(endpoints::DELETE_BDM, id),
            deal_count: *deals_per_bdm.get(&id).unwrap_or(&0),
        })
        .collect();

    Ok(directory_view(&manufacturer_rows, &reseller_rows, &bdm_rows).into_response())
}

fn count_deals_per_manufacturer(
    connection: &Connection,
) -> Result<HashMap<ManufacturerId, u64>, Error> {
    count_deals_by_column(connection, "manufacturer_id")
}

fn count_deals_per_reseller(connection: &Connection) -> Result<HashMap<ResellerId, u64>, Error> {
    count_deals_by_column(connection, "reseller_id")
}

fn count_deals_per_bdm(connection: &Connection) -> Result<HashMap<i64, u64>, Error> {
    count_deals_by_column(connection, "bdm_id")
}

fn count_deals_by_column(
    connection: &Connection,
    column: &str,
) -> Result<HashMap<i64, u64>, Error> {
    let result: Result<HashMap<i64, u64>, rusqlite::Error> = connection
        .prepare(&format!(
            "SELECT {column}, COUNT(1) FROM deal WHERE {column} IS NOT NULL GROUP BY {column}"
        ))?
        .query_map((), |row| {
            let id = row.get(0)?;
            let count: i64 = row.get(1)?;

            Ok((id, count as u64))
        })?
        .collect();

    result.map_err(Error::from)
}

#[cfg(test)]
mod directory_page_tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use rusqlite::Connection;
    use scraper::{Html, Selector};

    use crate::{
        bdm::create_bdm, db::initialize, endpoints, manufacturer::create_manufacturer,
        reseller::create_reseller,
    };

    use super::{DirectoryPageState, get_directory_page};

    fn get_directory_page_state() -> DirectoryPageState {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize(&connection).expect("Could not initialize database");

        DirectoryPageState {
            db_connection: Arc::new(Mutex::new(connection)),
        }
    }

    #[tokio::test]
    async fn renders_all_entries() {
        let state = get_directory_page_state();
        {
            let connection = state.db_connection.lock().unwrap();
            create_manufacturer("F5", &connection).unwrap();
            create_reseller("ATEA", &connection).unwrap();
            create_bdm("Anna Lindqvist", &connection).unwrap();
        }

        let response = get_directory_page(State(state)).await.unwrap();

        let body = response.into_body();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body).to_string();
        let html = Html::parse_document(&text);

        assert!(
            html.errors.is_empty(),
            "Got HTML parsing errors: {:?}",
            html.errors
        );

        for name in ["F5", "ATEA", "Anna Lindqvist"] {
            assert!(text.contains(name), "want page to contain {name}");
        }
    }

    #[tokio::test]
    async fn renders_quick_add_forms() {
        let state = get_directory_page_state();

        let response = get_directory_page(State(state)).await.unwrap();

        let body = response.into_body();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body).to_string();
        let html = Html::parse_document(&text);

        let form_selector = Selector::parse("form").unwrap();
        let post_endpoints: Vec<&str> = html
            .select(&form_selector)
            .filter_map(|form| form.value().attr("hx-post"))
            .collect();

        for endpoint in [
            endpoints::POST_MANUFACTURER,
            endpoints::POST_RESELLER,
            endpoints::POST_BDM,
        ] {
            assert!(
                post_endpoints.contains(&endpoint),
                "want quick-add form posting to {endpoint}, got {post_endpoints:?}"
            );
        }
    }
}
