//! This file defines the `Deal` type, the types needed to create and edit
//! deals, and the API routes for the deal type.
//! A deal is a pipeline opportunity: a manufacturer's product sold to an end
//! customer through a reseller, with a win probability and an expected close
//! month.

use std::{
    fmt::Display,
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
// Must use axum_extra's Form since that parses an empty string as None instead
// of crashing like axum::Form.
use axum_extra::extract::Form;
use axum_htmx::HxRedirect;
use maud::{Markup, html};
use rusqlite::{
    Connection, Row,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    alert::Alert,
    bdm::{Bdm, BdmId, get_all_bdms},
    endpoints,
    html::{
        BUTTON_DELETE_STYLE, BUTTON_PRIMARY_STYLE, FORM_CONTAINER_STYLE, FORM_LABEL_STYLE,
        FORM_SELECT_STYLE, FORM_TEXT_INPUT_STYLE, LINK_STYLE, PAGE_CONTAINER_STYLE,
        TABLE_CELL_STYLE, TABLE_HEADER_STYLE, TABLE_ROW_STYLE, base, format_currency,
        format_percent,
    },
    manufacturer::{Manufacturer, ManufacturerId, get_all_manufacturers, manufacturer_names},
    month::Month,
    navigation::NavBar,
    reseller::{Reseller, ResellerId, get_all_resellers, reseller_names},
};

pub type DealId = i64;

/// The stage a deal is at in the sales pipeline.
///
/// `Won` and `Lost` are terminal: such deals no longer contribute to the
/// pipeline forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Prospect,
    Qualified,
    Proposal,
    Verbal,
    Won,
    Lost,
}

impl DealStatus {
    /// All statuses, in pipeline order. Used to render select inputs.
    pub const ALL: [DealStatus; 6] = [
        DealStatus::Prospect,
        DealStatus::Qualified,
        DealStatus::Proposal,
        DealStatus::Verbal,
        DealStatus::Won,
        DealStatus::Lost,
    ];

    /// Whether the deal is still in play, i.e., neither won nor lost.
    pub fn is_open(self) -> bool {
        !matches!(self, DealStatus::Won | DealStatus::Lost)
    }

    /// The status as the lowercase string used in the database and forms.
    pub fn as_str(self) -> &'static str {
        match self {
            DealStatus::Prospect => "prospect",
            DealStatus::Qualified => "qualified",
            DealStatus::Proposal => "proposal",
            DealStatus::Verbal => "verbal",
            DealStatus::Won => "won",
            DealStatus::Lost => "lost",
        }
    }
}

impl Display for DealStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prospect" => Ok(DealStatus::Prospect),
            "qualified" => Ok(DealStatus::Qualified),
            "proposal" => Ok(DealStatus::Proposal),
            "verbal" => Ok(DealStatus::Verbal),
            "won" => Ok(DealStatus::Won),
            "lost" => Ok(DealStatus::Lost),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

impl ToSql for DealStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for DealStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;

        DealStatus::from_str(text).map_err(|error| FromSqlError::Other(Box::new(error)))
    }
}

/// A pipeline opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    /// The ID of the deal.
    pub id: DealId,

    /// The manufacturer whose product is being sold.
    pub manufacturer_id: ManufacturerId,

    /// The reseller the deal is sold through.
    pub reseller_id: ResellerId,

    /// The end customer buying the product.
    pub end_customer: String,

    /// The BDM who owns the deal, if any.
    pub bdm_id: Option<BdmId>,

    /// The sell price in US dollars.
    pub sell_usd: f64,

    /// The margin as a fraction of the sell price, in [0, 1].
    pub margin_pct: f64,

    /// The margin in US dollars. Always equals `sell_usd * margin_pct`,
    /// recomputed on every write.
    pub margin_usd: f64,

    /// The probability of winning the deal, in [0, 1].
    pub probability: f64,

    /// The pipeline stage of the deal.
    pub status: DealStatus,

    /// The month the deal is expected to close in.
    pub expected_close_month: Month,

    /// Free-text notes about the deal.
    pub notes: Option<String>,

    /// When the deal was created.
    pub created_at: OffsetDateTime,

    /// When the deal was last updated.
    pub updated_at: OffsetDateTime,
}

/// The editable fields of a deal, used for both creation and full-replacement
/// updates.
#[derive(Debug, Clone, PartialEq)]
pub struct DealDraft {
    pub manufacturer_id: ManufacturerId,
    pub reseller_id: ResellerId,
    pub end_customer: String,
    pub bdm_id: Option<BdmId>,
    pub sell_usd: f64,
    pub margin_pct: f64,
    pub probability: f64,
    pub status: DealStatus,
    pub expected_close_month: Month,
    pub notes: Option<String>,
}

impl DealDraft {
    /// Check the draft's fields against the deal invariants.
    ///
    /// # Errors
    /// Returns an [Error::EmptyEndCustomer] if the end customer is empty, an
    /// [Error::NegativeSellPrice] if the sell price is negative, or an
    /// [Error::RatioOutOfRange] if the margin or probability is outside
    /// [0, 1].
    pub fn validate(&self) -> Result<(), Error> {
        if self.end_customer.trim().is_empty() {
            return Err(Error::EmptyEndCustomer);
        }

        if self.sell_usd < 0.0 {
            return Err(Error::NegativeSellPrice(self.sell_usd));
        }

        if !(0.0..=1.0).contains(&self.margin_pct) {
            return Err(Error::RatioOutOfRange {
                field: "margin",
                value: self.margin_pct,
            });
        }

        if !(0.0..=1.0).contains(&self.probability) {
            return Err(Error::RatioOutOfRange {
                field: "probability",
                value: self.probability,
            });
        }

        Ok(())
    }

    /// The margin in US dollars derived from the draft's sell price and
    /// margin fraction.
    pub fn margin_usd(&self) -> f64 {
        self.sell_usd * self.margin_pct
    }
}

/// Create a deal in the database.
///
/// The deal's margin in dollars is derived from the draft, never taken from
/// the caller.
///
/// # Errors
/// This function will return an error if the draft is invalid, if it
/// references a manufacturer, reseller, or BDM that does not exist, or if
/// there is an SQL error.
pub fn create_deal(draft: DealDraft, connection: &Connection) -> Result<Deal, Error> {
    draft.validate()?;

    let now = OffsetDateTime::now_utc();
    let margin_usd = draft.margin_usd();

    connection.execute(
        "INSERT INTO deal (
            manufacturer_id, reseller_id, end_customer, bdm_id, sell_usd,
            margin_pct, margin_usd, probability, status, expected_close_month,
            notes, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
        (
            draft.manufacturer_id,
            draft.reseller_id,
            &draft.end_customer,
            draft.bdm_id,
            draft.sell_usd,
            draft.margin_pct,
            margin_usd,
            draft.probability,
            draft.status,
            draft.expected_close_month,
            &draft.notes,
            now,
            now,
        ),
    )?;

    let id = connection.last_insert_rowid();

    Ok(Deal {
        id,
        manufacturer_id: draft.manufacturer_id,
        reseller_id: draft.reseller_id,
        end_customer: draft.end_customer,
        bdm_id: draft.bdm_id,
        sell_usd: draft.sell_usd,
        margin_pct: draft.margin_pct,
        margin_usd,
        probability: draft.probability,
        status: draft.status,
        expected_close_month: draft.expected_close_month,
        notes: draft.notes,
        created_at: now,
        updated_at: now,
    })
}

/// Retrieve the deal with `deal_id` from the database.
///
/// # Errors
/// This function will return an [Error::NotFound] if there is no such deal,
/// or an error if there is an SQL error.
pub fn get_deal(deal_id: DealId, connection: &Connection) -> Result<Deal, Error> {
    connection
        .prepare(&format!(
            "SELECT {DEAL_COLUMNS} FROM deal WHERE id = :id;"
        ))?
        .query_row(&[(":id", &deal_id)], map_row)
        .map_err(|error| error.into())
}

/// Retrieve all deals in the database, most recently updated first.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_all_deals(connection: &Connection) -> Result<Vec<Deal>, Error> {
    connection
        .prepare(&format!(
            "SELECT {DEAL_COLUMNS} FROM deal ORDER BY updated_at DESC, id DESC;"
        ))?
        .query_map([], map_row)?
        .map(|maybe_deal| maybe_deal.map_err(|error| error.into()))
        .collect()
}

/// Replace the editable fields of the deal with `deal_id`.
///
/// The deal's margin in dollars is recomputed from the draft.
///
/// # Errors
/// This function will return an error if the draft is invalid, if the deal
/// doesn't exist, or if there is an SQL error.
pub fn update_deal(
    deal_id: DealId,
    draft: DealDraft,
    connection: &Connection,
) -> Result<(), Error> {
    draft.validate()?;

    let rows_affected = connection.execute(
        "UPDATE deal SET
            manufacturer_id = ?1, reseller_id = ?2, end_customer = ?3,
            bdm_id = ?4, sell_usd = ?5, margin_pct = ?6, margin_usd = ?7,
            probability = ?8, status = ?9, expected_close_month = ?10,
            notes = ?11, updated_at = ?12
        WHERE id = ?13;",
        (
            draft.manufacturer_id,
            draft.reseller_id,
            &draft.end_customer,
            draft.bdm_id,
            draft.sell_usd,
            draft.margin_pct,
            draft.margin_usd(),
            draft.probability,
            draft.status,
            draft.expected_close_month,
            &draft.notes,
            OffsetDateTime::now_utc(),
            deal_id,
        ),
    )?;

    if rows_affected == 0 {
        return Err(Error::UpdateMissingDeal);
    }

    Ok(())
}

/// Delete a deal from the database.
///
/// # Errors
/// This function will return an error if there is an SQL error or if the deal
/// doesn't exist.
pub fn delete_deal(deal_id: DealId, connection: &Connection) -> Result<(), Error> {
    let rows_affected = connection.execute("DELETE FROM deal WHERE id = ?1", [deal_id])?;

    if rows_affected == 0 {
        return Err(Error::DeleteMissingDeal);
    }

    Ok(())
}

pub fn create_deal_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS deal (
            id INTEGER PRIMARY KEY,
            manufacturer_id INTEGER NOT NULL REFERENCES manufacturer(id),
            reseller_id INTEGER NOT NULL REFERENCES reseller(id),
            end_customer TEXT NOT NULL,
            bdm_id INTEGER REFERENCES bdm(id) ON DELETE SET NULL,
            sell_usd REAL NOT NULL,
            margin_pct REAL NOT NULL,
            margin_usd REAL NOT NULL,
            probability REAL NOT NULL,
            status TEXT NOT NULL,
            expected_close_month TEXT NOT NULL,
            notes TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_deal_close_month ON deal(expected_close_month);",
    )?;

    Ok(())
}

const DEAL_COLUMNS: &str = "id, manufacturer_id, reseller_id, end_customer, bdm_id, \
    sell_usd, margin_pct, margin_usd, probability, status, \
    expected_close_month, notes, created_at, updated_at";

fn map_row(row: &Row) -> Result<Deal, rusqlite::Error> {
    Ok(Deal {
        id: row.get(0)?,
        manufacturer_id: row.get(1)?,
        reseller_id: row.get(2)?,
        end_customer: row.get(3)?,
        bdm_id: row.get(4)?,
        sell_usd: row.get(5)?,
        margin_pct: row.get(6)?,
        margin_usd: row.get(7)?,
        probability: row.get(8)?,
        status: row.get(9)?,
        expected_close_month: row.get(10)?,
        notes: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// The form data for creating or updating a deal.
#[derive(Debug, Serialize, Deserialize)]
pub struct DealForm {
    pub manufacturer_id: ManufacturerId,
    pub reseller_id: ResellerId,
    pub end_customer: String,
    #[serde(default)]
    pub bdm_id: Option<BdmId>,
    pub sell_usd: f64,
    pub margin_pct: f64,
    pub probability: f64,
    pub status: DealStatus,
    pub expected_close_month: Month,
    #[serde(default)]
    pub notes: String,
}

impl From<DealForm> for DealDraft {
    fn from(form: DealForm) -> Self {
        let notes = form.notes.trim();
        let notes = (!notes.is_empty()).then(|| notes.to_string());

        DealDraft {
            manufacturer_id: form.manufacturer_id,
            reseller_id: form.reseller_id,
            end_customer: form.end_customer.trim().to_string(),
            bdm_id: form.bdm_id,
            sell_usd: form.sell_usd,
            margin_pct: form.margin_pct,
            probability: form.probability,
            status: form.status,
            expected_close_month: form.expected_close_month,
            notes,
        }
    }
}

/// The reference entities needed to render the deal form's select inputs.
struct FormChoices {
    manufacturers: Vec<Manufacturer>,
    resellers: Vec<Reseller>,
    bdms: Vec<Bdm>,
}

impl FormChoices {
    fn load(connection: &Connection) -> Result<Self, Error> {
        Ok(Self {
            manufacturers: get_all_manufacturers(connection)?,
            resellers: get_all_resellers(connection)?,
            bdms: get_all_bdms(connection)?,
        })
    }
}

fn select_view(
    label: &str,
    name: &str,
    options: &[(String, String)],
    selected: Option<&str>,
    allow_empty: bool,
) -> Markup {
    html! {
        div
        {
            label for=(name) class=(FORM_LABEL_STYLE) { (label) }

            select id=(name) name=(name) class=(FORM_SELECT_STYLE)
            {
                @if allow_empty {
                    option value="" selected[selected.is_none()] { "None" }
                }

                @for (value, text) in options {
                    option
                        value=(value)
                        selected[selected == Some(value.as_str())]
                    {
                        (text)
                    }
                }
            }
        }
    }
}

fn number_input_view(label: &str, name: &str, step: &str, min: &str, value: &str) -> Markup {
    html! {
        div
        {
            label for=(name) class=(FORM_LABEL_STYLE) { (label) }

            input
                id=(name)
                type="number"
                name=(name)
                step=(step)
                min=(min)
                value=(value)
                required
                class=(FORM_TEXT_INPUT_STYLE);
        }
    }
}

/// Render the form shared between the new deal and edit deal pages.
///
/// `draft` is `None` for the new deal form and the current field values when
/// editing.
fn deal_form_view(
    hx_method_attribute: (&str, &str),
    choices: &FormChoices,
    draft: Option<&DealDraft>,
    error_message: &str,
) -> Markup {
    let (hx_method, endpoint) = hx_method_attribute;

    let manufacturer_options: Vec<(String, String)> = choices
        .manufacturers
        .iter()
        .map(|manufacturer| (manufacturer.id.to_string(), manufacturer.name.clone()))
        .collect();
    let reseller_options: Vec<(String, String)> = choices
        .resellers
        .iter()
        .map(|reseller| (reseller.id.to_string(), reseller.name.clone()))
        .collect();
    let bdm_options: Vec<(String, String)> = choices
        .bdms
        .iter()
        .map(|bdm| (bdm.id.to_string(), bdm.name.clone()))
        .collect();
    let status_options: Vec<(String, String)> = DealStatus::ALL
        .iter()
        .map(|status| (status.as_str().to_string(), status.as_str().to_string()))
        .collect();

    let selected_manufacturer = draft.map(|draft| draft.manufacturer_id.to_string());
    let selected_reseller = draft.map(|draft| draft.reseller_id.to_string());
    let selected_bdm = draft.and_then(|draft| draft.bdm_id.map(|id| id.to_string()));
    let selected_status = draft.map(|draft| draft.status.as_str().to_string());

    let end_customer = draft.map(|draft| draft.end_customer.as_str()).unwrap_or("");
    let sell_usd = draft
        .map(|draft| draft.sell_usd.to_string())
        .unwrap_or_default();
    let margin_pct = draft
        .map(|draft| draft.margin_pct.to_string())
        .unwrap_or_default();
    let probability = draft
        .map(|draft| draft.probability.to_string())
        .unwrap_or_default();
    let close_month = draft
        .map(|draft| draft.expected_close_month.to_string())
        .unwrap_or_default();
    let notes = draft
        .and_then(|draft| draft.notes.as_deref())
        .unwrap_or("");

    html! {
        form
            hx-post=[(hx_method == "post").then_some(endpoint)]
            hx-put=[(hx_method == "put").then_some(endpoint)]
            hx-target-error="#alert-container"
            class="w-full space-y-4 md:space-y-6"
        {
            div
            {
                label for="end_customer" class=(FORM_LABEL_STYLE) { "End Customer" }

                input
                    id="end_customer"
                    type="text"
                    name="end_customer"
                    placeholder="End Customer"
                    value=(end_customer)
                    required
                    autofocus
                    class=(FORM_TEXT_INPUT_STYLE);
            }

            (select_view(
                "Manufacturer",
                "manufacturer_id",
                &manufacturer_options,
                selected_manufacturer.as_deref(),
                false,
            ))

            (select_view(
                "Reseller",
                "reseller_id",
                &reseller_options,
                selected_reseller.as_deref(),
                false,
            ))

            (select_view("BDM", "bdm_id", &bdm_options, selected_bdm.as_deref(), true))

            (number_input_view("Sell Price (USD)", "sell_usd", "0.01", "0", &sell_usd))
            (number_input_view("Margin (fraction)", "margin_pct", "0.01", "0", &margin_pct))
            (number_input_view("Probability (fraction)", "probability", "0.01", "0", &probability))

            (select_view("Status", "status", &status_options, selected_status.as_deref(), false))

            div
            {
                label for="expected_close_month" class=(FORM_LABEL_STYLE)
                {
                    "Expected Close Month"
                }

                input
                    id="expected_close_month"
                    type="month"
                    name="expected_close_month"
                    value=(close_month)
                    required
                    class=(FORM_TEXT_INPUT_STYLE);
            }

            div
            {
                label for="notes" class=(FORM_LABEL_STYLE) { "Notes" }

                textarea id="notes" name="notes" rows="3" class=(FORM_TEXT_INPUT_STYLE)
                {
                    (notes)
                }
            }

            @if !error_message.is_empty() {
                p class="text-red-600 dark:text-red-400"
                {
                    (error_message)
                }
            }

            button type="submit" class=(BUTTON_PRIMARY_STYLE) { "Save Deal" }
        }
    }
}

fn new_deal_view(choices: &FormChoices) -> Markup {
    let nav_bar = NavBar::new(endpoints::NEW_DEAL_VIEW).into_html();
    let form = deal_form_view(("post", endpoints::POST_DEAL), choices, None, "");

    let content = html! {
        (nav_bar)
        div class=(FORM_CONTAINER_STYLE)
        {
            h1 class="text-xl font-bold mb-4" { "New Deal" }
            (form)
        }
    };

    base("New Deal", &[], &content)
}

fn edit_deal_view(
    update_endpoint: &str,
    choices: &FormChoices,
    draft: Option<&DealDraft>,
    error_message: &str,
) -> Markup {
    let nav_bar = NavBar::new(endpoints::DEALS_VIEW).into_html();
    let form = deal_form_view(("put", update_endpoint), choices, draft, error_message);

    let content = html! {
        (nav_bar)
        div class=(FORM_CONTAINER_STYLE)
        {
            h1 class="text-xl font-bold mb-4" { "Edit Deal" }
            (form)
        }
    };

    base("Edit Deal", &[], &content)
}

/// A deal with its reference names resolved, ready for the deals table.
struct DealRow {
    deal: Deal,
    manufacturer_name: String,
    reseller_name: String,
    edit_url: String,
    delete_url: String,
}

fn deals_view(rows: &[DealRow]) -> Markup {
    let nav_bar = NavBar::new(endpoints::DEALS_VIEW).into_html();

    let table_row = |row: &DealRow| {
        html!(
            tr class=(TABLE_ROW_STYLE)
            {
                td class=(TABLE_CELL_STYLE) { (row.deal.end_customer) }
                td class=(TABLE_CELL_STYLE) { (row.manufacturer_name) }
                td class=(TABLE_CELL_STYLE) { (row.reseller_name) }
                td class=(TABLE_CELL_STYLE) { (format_currency(row.deal.sell_usd)) }
                td class=(TABLE_CELL_STYLE) { (format_percent(row.deal.margin_pct)) }
                td class=(TABLE_CELL_STYLE) { (format_percent(row.deal.probability)) }
                td class=(TABLE_CELL_STYLE) { (row.deal.status) }
                td class=(TABLE_CELL_STYLE) { (row.deal.expected_close_month) }

                td class=(TABLE_CELL_STYLE)
                {
                    div class="flex gap-4"
                    {
                        a href=(row.edit_url) class=(LINK_STYLE) { "Edit" }

                        button
                            hx-delete=(row.delete_url)
                            hx-confirm={
                                "Are you sure you want to delete the deal for '"
                                (row.deal.end_customer) "'?"
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
            }
        )
    };

    let content = html!(
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            div class="relative w-full"
            {
                div class="flex justify-between flex-wrap items-end"
                {
                    h1 class="text-xl font-bold" { "Deals" }

                    a href=(endpoints::NEW_DEAL_VIEW) class=(LINK_STYLE)
                    {
                        "Create Deal"
                    }
                }

                div class="dark:bg-gray-800 overflow-x-auto"
                {
                    table class="w-full text-sm text-left rtl:text-right
                        text-gray-500 dark:text-gray-400"
                    {
                        thead class=(TABLE_HEADER_STYLE)
                        {
                            tr
                            {
                                th scope="col" class=(TABLE_CELL_STYLE) { "End Customer" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Manufacturer" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Reseller" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Sell (USD)" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Margin" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Probability" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Status" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Close Month" }
                                th scope="col" class=(TABLE_CELL_STYLE) { "Actions" }
                            }
                        }

                        tbody
                        {
                            @for row in rows {
                                (table_row(row))
                            }

                            @if rows.is_empty() {
                                tr
                                {
                                    td
                                        colspan="9"
                                        class="px-6 py-4 text-center
                                            text-gray-500 dark:text-gray-400"
                                    {
                                        "No deals recorded yet. "
                                        a href=(endpoints::NEW_DEAL_VIEW) class=(LINK_STYLE)
                                        {
                                            "Create your first deal"
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    );

    base("Deals", &[], &content)
}

/// The state needed for the deals listing page.
#[derive(Debug, Clone)]
pub struct DealsPageState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DealsPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for the new deal page.
#[derive(Debug, Clone)]
pub struct NewDealPageState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for NewDealPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for the edit deal page.
#[derive(Debug, Clone)]
pub struct EditDealPageState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for EditDealPageState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for creating a deal.
#[derive(Debug, Clone)]
pub struct CreateDealEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateDealEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for updating a deal.
#[derive(Debug, Clone)]
pub struct UpdateDealEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for UpdateDealEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The state needed for deleting a deal.
#[derive(Debug, Clone)]
pub struct DeleteDealEndpointState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DeleteDealEndpointState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Route handler for the deals listing page.
pub async fn get_deals_page(State(state): State<DealsPageState>) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let deals = get_all_deals(&connection)
        .inspect_err(|error| tracing::error!("Failed to retrieve deals: {error}"))?;
    let manufacturers = manufacturer_names(&connection)?;
    let resellers = reseller_names(&connection)?;

    let unknown = || "Unknown".to_string();

    let rows: Vec<DealRow> = deals
        .into_iter()
        .map(|deal| DealRow {
            manufacturer_name: manufacturers
                .get(&deal.manufacturer_id)
                .cloned()
                .unwrap_or_else(unknown),
            reseller_name: resellers
                .get(&deal.reseller_id)
                .cloned()
                .unwrap_or_else(unknown),
            edit_url: endpoints::format_endpoint(endpoints::EDIT_DEAL_VIEW, deal.id),
            delete_url: endpoints::format_endpoint(endpoints::DELETE_DEAL, deal.id),
            deal,
        })
        .collect();

    Ok(deals_view(&rows).into_response())
}

/// Route handler for the new deal page.
pub async fn get_new_deal_page(State(state): State<NewDealPageState>) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let choices = FormChoices::load(&connection)
        .inspect_err(|error| tracing::error!("Failed to load form choices: {error}"))?;

    Ok(new_deal_view(&choices).into_response())
}

/// Route handler for the edit deal page.
pub async fn get_edit_deal_page(
    Path(deal_id): Path<DealId>,
    State(state): State<EditDealPageState>,
) -> Result<Response, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let choices = FormChoices::load(&connection)
        .inspect_err(|error| tracing::error!("Failed to load form choices: {error}"))?;

    let update_endpoint = endpoints::format_endpoint(endpoints::PUT_DEAL, deal_id);

    match get_deal(deal_id, &connection) {
        Ok(deal) => {
            let draft = DealDraft {
                manufacturer_id: deal.manufacturer_id,
                reseller_id: deal.reseller_id,
                end_customer: deal.end_customer,
                bdm_id: deal.bdm_id,
                sell_usd: deal.sell_usd,
                margin_pct: deal.margin_pct,
                probability: deal.probability,
                status: deal.status,
                expected_close_month: deal.expected_close_month,
                notes: deal.notes,
            };

            Ok(edit_deal_view(&update_endpoint, &choices, Some(&draft), "").into_response())
        }
        Err(Error::NotFound) => {
            Ok(edit_deal_view(&update_endpoint, &choices, None, "Deal not found").into_response())
        }
        Err(error) => {
            tracing::error!("Failed to retrieve deal {deal_id}: {error}");
            Ok(
                edit_deal_view(&update_endpoint, &choices, None, "Failed to load deal")
                    .into_response(),
            )
        }
    }
}

/// A route handler for creating a new deal.
pub async fn create_deal_endpoint(
    State(state): State<CreateDealEndpointState>,
    Form(form): Form<DealForm>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match create_deal(form.into(), &connection) {
        Ok(_) => (
            HxRedirect(endpoints::DEALS_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => {
            tracing::error!("Could not create deal: {error}");
            error.into_alert_response()
        }
    }
}

/// A route handler for updating a deal.
pub async fn update_deal_endpoint(
    Path(deal_id): Path<DealId>,
    State(state): State<UpdateDealEndpointState>,
    Form(form): Form<DealForm>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match update_deal(deal_id, form.into(), &connection) {
        Ok(_) => (
            HxRedirect(endpoints::DEALS_VIEW.to_owned()),
            StatusCode::SEE_OTHER,
        )
            .into_response(),
        Err(error) => {
            tracing::error!("Could not update deal {deal_id}: {error}");
            error.into_alert_response()
        }
    }
}

/// A route handler for deleting a deal.
pub async fn delete_deal_endpoint(
    Path(deal_id): Path<DealId>,
    State(state): State<DeleteDealEndpointState>,
) -> Response {
    let connection = match state.db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return Error::DatabaseLockError.into_alert_response();
        }
    };

    match delete_deal(deal_id, &connection) {
        Ok(_) => Alert::success("Deal deleted successfully").into_response(),
        Err(Error::DeleteMissingDeal) => Error::DeleteMissingDeal.into_alert_response(),
        Err(error) => {
            tracing::error!("An unexpected error occurred while deleting deal {deal_id}: {error}");
            error.into_alert_response()
        }
    }
}
