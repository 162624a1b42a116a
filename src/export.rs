//! CSV downloads: the weighted forecast matrix, the committed (full-value)
//! matrix, and the raw deal list.

use axum::{
    extract::{FromRef, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use maud::{Markup, html};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{
    AppState, Error,
    bdm::bdm_names,
    deal::{Deal, DealStatus, get_all_deals},
    endpoints,
    forecast::{
        DimensionalForecast, ForecastCategory, MonthlyForecast, categorize_deal,
        forecast_by_manufacturer, forecast_by_reseller, monthly_forecast, weighted_margin,
    },
    html::{LINK_STYLE, PAGE_CONTAINER_STYLE, base},
    manufacturer::manufacturer_names,
    matrix::{Contribution, ForecastMatrix, MatrixCell, manufacturer_month_matrix},
    month::Month,
    navigation::NavBar,
    reseller::reseller_names,
};

/// The state needed for the CSV export endpoints.
#[derive(Debug, Clone)]
pub struct ExportState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for ExportState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

fn exports_view() -> Markup {
    let nav_bar = NavBar::new(endpoints::EXPORTS_VIEW).into_html();

    let download_link = |url: &str, title: &str, description: &str| {
        html!(
            li class="mb-4"
            {
                a href=(url) download class=(LINK_STYLE) { (title) }
                p class="text-sm text-gray-500 dark:text-gray-400" { (description) }
            }
        )
    };

    let content = html!(
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            h1 class="text-2xl font-bold mb-6" { "Exports" }

            ul class="w-full max-w-xl"
            {
                (download_link(
                    endpoints::EXPORT_FORECAST_CSV,
                    "Forecast matrix (weighted)",
                    "Manufacturer by month, revenue and margin weighted by \
                    win probability. Lost deals are excluded.",
                ))
                (download_link(
                    endpoints::EXPORT_COMMITTED_CSV,
                    "Committed forecast (full value)",
                    "Manufacturer by month at full deal value, limited to \
                    deals with a win probability of at least 70%.",
                ))
                (download_link(
                    endpoints::EXPORT_PIPELINE_BY_MANUFACTURER_CSV,
                    "Pipeline by manufacturer",
                    "Open pipeline per manufacturer, ranked by weighted margin.",
                ))
                (download_link(
                    endpoints::EXPORT_PIPELINE_BY_RESELLER_CSV,
                    "Pipeline by reseller",
                    "Open pipeline per reseller, ranked by weighted margin.",
                ))
                (download_link(
                    endpoints::EXPORT_MONTHLY_FORECAST_CSV,
                    "Monthly forecast",
                    "Weighted pipeline per expected close month, with the \
                    committed, best case, and worst case margin split out.",
                ))
                (download_link(
                    endpoints::EXPORT_DEALS_CSV,
                    "All deals",
                    "Every deal on record, including won and lost ones.",
                ))
            }
        }
    );

    base("Exports", &[], &content)
}

/// Route handler for the exports page.
pub async fn get_exports_page() -> Response {
    exports_view().into_response()
}

/// Build an HTTP response that downloads `bytes` as a CSV attachment.
fn csv_response(file_name: &str, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

fn cell_fields(cell: &MatrixCell) -> [String; 3] {
    [
        format!("{:.2}", cell.revenue_usd),
        format!("{:.2}", cell.margin_usd),
        format!("{:.4}", cell.margin_pct()),
    ]
}

/// Serialize a manufacturer by month matrix as CSV.
///
/// One row per manufacturer with three columns (revenue, margin, margin
/// fraction) per month plus a row total, and a final totals row.
fn matrix_to_csv(matrix: &ForecastMatrix) -> Result<Vec<u8>, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Manufacturer".to_string()];
    for month in &matrix.months {
        header.push(format!("{month} Revenue USD"));
        header.push(format!("{month} Margin USD"));
        header.push(format!("{month} Margin Fraction"));
    }
    header.push("Total Revenue USD".to_string());
    header.push("Total Margin USD".to_string());
    header.push("Total Margin Fraction".to_string());

    writer
        .write_record(&header)
        .map_err(|error| Error::CsvError(error.to_string()))?;

    for row in &matrix.rows {
        let mut record = vec![row.manufacturer_name.clone()];
        for cell in &row.cells {
            record.extend(cell_fields(cell));
        }
        record.extend(cell_fields(&row.total));

        writer
            .write_record(&record)
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    let mut totals = vec!["Total".to_string()];
    for cell in &matrix.month_totals {
        totals.extend(cell_fields(cell));
    }
    totals.extend(cell_fields(&matrix.grand_total));

    writer
        .write_record(&totals)
        .map_err(|error| Error::CsvError(error.to_string()))?;

    writer
        .into_inner()
        .map_err(|error| Error::CsvError(error.to_string()))
}

/// Serialize the raw deal list as CSV, resolving reference IDs to names.
fn deals_to_csv(
    deals: &[Deal],
    manufacturers: &HashMap<i64, String>,
    resellers: &HashMap<i64, String>,
    bdms: &HashMap<i64, String>,
) -> Result<Vec<u8>, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "ID",
            "Manufacturer",
            "Reseller",
            "End Customer",
            "BDM",
            "Sell Price USD",
            "Margin Fraction",
            "Margin USD",
            "Probability",
            "Status",
            "Expected Close Month",
            "Notes",
        ])
        .map_err(|error| Error::CsvError(error.to_string()))?;

    let resolve = |names: &HashMap<i64, String>, id: i64| {
        names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string())
    };

    for deal in deals {
        writer
            .write_record([
                deal.id.to_string(),
                resolve(manufacturers, deal.manufacturer_id),
                resolve(resellers, deal.reseller_id),
                deal.end_customer.clone(),
                deal.bdm_id.map(|id| resolve(bdms, id)).unwrap_or_default(),
                format!("{:.2}", deal.sell_usd),
                format!("{:.4}", deal.margin_pct),
                format!("{:.2}", deal.margin_usd),
                format!("{:.4}", deal.probability),
                deal.status.to_string(),
                deal.expected_close_month.to_string(),
                deal.notes.clone().unwrap_or_default(),
            ])
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|error| Error::CsvError(error.to_string()))
}

/// Serialize a dimensional pipeline summary as CSV, one row per dimension
/// value in the ranking order the aggregation produced.
fn dimensional_to_csv(rows: &[DimensionalForecast], label: &str) -> Result<Vec<u8>, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            label,
            "Deals",
            "Weighted Revenue USD",
            "Weighted Margin USD",
        ])
        .map_err(|error| Error::CsvError(error.to_string()))?;

    for row in rows {
        writer
            .write_record([
                row.name.clone(),
                row.deal_count.to_string(),
                format!("{:.2}", row.weighted_revenue_usd),
                format!("{:.2}", row.weighted_margin_usd),
            ])
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|error| Error::CsvError(error.to_string()))
}

/// The weighted margin of each month's open deals, split by forecast category
/// in the order committed, best case, worst case.
fn monthly_category_margins(deals: &[Deal]) -> HashMap<Month, [f64; 3]> {
    let mut margins: HashMap<Month, [f64; 3]> = HashMap::new();

    for deal in deals.iter().filter(|deal| deal.status.is_open()) {
        let index = match categorize_deal(deal.status, deal.probability) {
            ForecastCategory::Committed => 0,
            ForecastCategory::BestCase => 1,
            ForecastCategory::WorstCase => 2,
        };

        margins.entry(deal.expected_close_month).or_default()[index] +=
            weighted_margin(deal.margin_usd, deal.probability);
    }

    margins
}

/// Serialize the monthly forecast as CSV with the weighted margin broken out
/// by forecast category.
fn monthly_forecast_to_csv(
    rows: &[MonthlyForecast],
    category_margins: &HashMap<Month, [f64; 3]>,
) -> Result<Vec<u8>, Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record([
            "Month",
            "Deals",
            "Weighted Revenue USD",
            "Weighted Margin USD",
            "Committed Margin USD",
            "Best Case Margin USD",
            "Worst Case Margin USD",
        ])
        .map_err(|error| Error::CsvError(error.to_string()))?;

    for row in rows {
        let [committed, best_case, worst_case] = category_margins
            .get(&row.month)
            .copied()
            .unwrap_or_default();

        writer
            .write_record([
                row.month.to_string(),
                row.deal_count.to_string(),
                format!("{:.2}", row.weighted_revenue_usd),
                format!("{:.2}", row.weighted_margin_usd),
                format!("{committed:.2}"),
                format!("{best_case:.2}"),
                format!("{worst_case:.2}"),
            ])
            .map_err(|error| Error::CsvError(error.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|error| Error::CsvError(error.to_string()))
}

struct ExportData {
    deals: Vec<Deal>,
    manufacturers: HashMap<i64, String>,
    resellers: HashMap<i64, String>,
    bdms: HashMap<i64, String>,
}

fn load_export_data(state: &ExportState) -> Result<ExportData, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    Ok(ExportData {
        deals: get_all_deals(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve deals: {error}"))?,
        manufacturers: manufacturer_names(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve manufacturers: {error}"))?,
        resellers: reseller_names(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve resellers: {error}"))?,
        bdms: bdm_names(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve BDMs: {error}"))?,
    })
}

/// Route handler for the weighted forecast matrix download.
///
/// Includes every deal that is not lost, weighted by win probability.
pub async fn get_forecast_csv(State(state): State<ExportState>) -> Result<Response, Error> {
    let mut data = load_export_data(&state)?;
    data.deals.retain(|deal| deal.status != DealStatus::Lost);

    let matrix =
        manufacturer_month_matrix(&data.deals, &data.manufacturers, Contribution::Weighted);
    let bytes = matrix_to_csv(&matrix)?;

    Ok(csv_response("forecast.csv", bytes))
}

/// Route handler for the committed forecast download.
///
/// Includes deals that are not lost and have a win probability of at least
/// 70%, at full (unweighted) value.
pub async fn get_committed_csv(State(state): State<ExportState>) -> Result<Response, Error> {
    let mut data = load_export_data(&state)?;
    data.deals
        .retain(|deal| deal.status != DealStatus::Lost && deal.probability >= 0.7);

    let matrix =
        manufacturer_month_matrix(&data.deals, &data.manufacturers, Contribution::FullValue);
    let bytes = matrix_to_csv(&matrix)?;

    Ok(csv_response("committed.csv", bytes))
}

/// Route handler for the raw deal list download. Includes every deal,
/// terminal ones too.
pub async fn get_deals_csv(State(state): State<ExportState>) -> Result<Response, Error> {
    let data = load_export_data(&state)?;

    let bytes = deals_to_csv(&data.deals, &data.manufacturers, &data.resellers, &data.bdms)?;

    Ok(csv_response("deals.csv", bytes))
}

/// Route handler for the per-manufacturer pipeline summary download.
///
/// One row per manufacturer with open deals, ranked by weighted margin.
pub async fn get_pipeline_by_manufacturer_csv(
    State(state): State<ExportState>,
) -> Result<Response, Error> {
    let data = load_export_data(&state)?;

    let rows = forecast_by_manufacturer(&data.deals, &data.manufacturers);
    let bytes = dimensional_to_csv(&rows, "Manufacturer")?;

    Ok(csv_response("pipeline-by-manufacturer.csv", bytes))
}

/// Route handler for the per-reseller pipeline summary download.
///
/// One row per reseller with open deals, ranked by weighted margin.
pub async fn get_pipeline_by_reseller_csv(
    State(state): State<ExportState>,
) -> Result<Response, Error> {
    let data = load_export_data(&state)?;

    let rows = forecast_by_reseller(&data.deals, &data.resellers);
    let bytes = dimensional_to_csv(&rows, "Reseller")?;

    Ok(csv_response("pipeline-by-reseller.csv", bytes))
}

/// Route handler for the monthly forecast summary download.
///
/// One row per month with open deals, earliest month first, with the weighted
/// margin split into committed, best case, and worst case columns.
pub async fn get_monthly_forecast_csv(State(state): State<ExportState>) -> Result<Response, Error> {
    let data = load_export_data(&state)?;

    let rows = monthly_forecast(&data.deals);
    let category_margins = monthly_category_margins(&data.deals);
    let bytes = monthly_forecast_to_csv(&rows, &category_margins)?;

    Ok(csv_response("monthly-forecast.csv", bytes))
}

#[cfg(test)]
mod exports_page_tests {
    use scraper::{Html, Selector};

    use crate::endpoints;

    use super::get_exports_page;

    #[tokio::test]
    async fn renders_all_download_links() {
        let response = get_exports_page().await;

        let body = response.into_body();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body).to_string();
        let html = Html::parse_document(&text);

        let link_selector = Selector::parse("a[download]").unwrap();
        let hrefs: Vec<&str> = html
            .select(&link_selector)
            .filter_map(|link| link.value().attr("href"))
            .collect();

        for endpoint in [
            endpoints::EXPORT_FORECAST_CSV,
            endpoints::EXPORT_COMMITTED_CSV,
            endpoints::EXPORT_PIPELINE_BY_MANUFACTURER_CSV,
            endpoints::EXPORT_PIPELINE_BY_RESELLER_CSV,
            endpoints::EXPORT_MONTHLY_FORECAST_CSV,
            endpoints::EXPORT_DEALS_CSV,
        ] {
            assert!(
                hrefs.contains(&endpoint),
                "want a download link to {endpoint}, got {hrefs:?}"
            );
        }
    }
}

#[cfg(test)]
mod export_csv_tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::header;
    use axum::response::Response;

    use crate::deal::{
        DealStatus, create_deal,
        test_utils::{get_test_db_connection, sample_draft},
    };

    use super::{
        ExportState, get_committed_csv, get_deals_csv, get_forecast_csv, get_monthly_forecast_csv,
        get_pipeline_by_manufacturer_csv, get_pipeline_by_reseller_csv,
    };

    fn get_export_state() -> ExportState {
        ExportState {
            db_connection: Arc::new(Mutex::new(get_test_db_connection())),
        }
    }

    async fn body_text(response: Response) -> String {
        let body = response.into_body();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();

        String::from_utf8_lossy(&body).to_string()
    }

    #[tokio::test]
    async fn forecast_csv_weights_and_excludes_lost_deals() {
        let state = get_export_state();
        {
            let connection = state.db_connection.lock().unwrap();

            // 100k at 50% probability.
            create_deal(sample_draft(), &connection).unwrap();

            let mut lost = sample_draft();
            lost.status = DealStatus::Lost;
            lost.end_customer = "Lost Customer AB".to_string();
            create_deal(lost, &connection).unwrap();
        }

        let response = get_forecast_csv(State(state)).await.unwrap();

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/csv"));

        let disposition = response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("forecast.csv"));

        let text = body_text(response).await;

        assert!(text.contains("F5"), "want manufacturer row: {text}");
        assert!(
            text.contains("50000.00"),
            "want weighted revenue of the open deal: {text}"
        );
        // Only the open deal contributes, so the weighted full total is the
        // same as the single cell.
        assert!(
            !text.contains("100000.00"),
            "want no unweighted or lost figures: {text}"
        );
    }

    #[tokio::test]
    async fn committed_csv_uses_full_value_above_seventy_percent() {
        let state = get_export_state();
        {
            let connection = state.db_connection.lock().unwrap();

            let mut committed = sample_draft();
            committed.probability = 0.9;
            create_deal(committed, &connection).unwrap();

            // Below the 70% cutoff, must not appear.
            let mut long_shot = sample_draft();
            long_shot.probability = 0.5;
            long_shot.end_customer = "Long Shot AB".to_string();
            create_deal(long_shot, &connection).unwrap();
        }

        let response = get_committed_csv(State(state)).await.unwrap();
        let text = body_text(response).await;

        assert!(
            text.contains("100000.00"),
            "want the full unweighted value: {text}"
        );
        assert!(
            !text.contains("90000.00"),
            "want no probability weighting: {text}"
        );
    }

    #[tokio::test]
    async fn pipeline_by_manufacturer_csv_summarizes_open_deals() {
        let state = get_export_state();
        {
            let connection = state.db_connection.lock().unwrap();

            // 100k at 50% probability and 20% margin.
            create_deal(sample_draft(), &connection).unwrap();

            // Won deals are not part of the pipeline.
            let mut won = sample_draft();
            won.status = DealStatus::Won;
            won.probability = 1.0;
            won.sell_usd = 999_999.0;
            create_deal(won, &connection).unwrap();
        }

        let response = get_pipeline_by_manufacturer_csv(State(state)).await.unwrap();
        let text = body_text(response).await;

        assert!(
            text.contains("Manufacturer,Deals,Weighted Revenue USD,Weighted Margin USD"),
            "want the summary header: {text}"
        );
        assert!(
            text.contains("F5,1,50000.00,10000.00"),
            "want one open deal summarized for F5: {text}"
        );
    }

    #[tokio::test]
    async fn pipeline_by_reseller_csv_summarizes_open_deals() {
        let state = get_export_state();
        {
            let connection = state.db_connection.lock().unwrap();
            create_deal(sample_draft(), &connection).unwrap();
        }

        let response = get_pipeline_by_reseller_csv(State(state)).await.unwrap();
        let text = body_text(response).await;

        assert!(
            text.contains("ATEA,1,50000.00,10000.00"),
            "want one open deal summarized for ATEA: {text}"
        );
    }

    #[tokio::test]
    async fn monthly_forecast_csv_breaks_out_category_margins() {
        let state = get_export_state();
        {
            let connection = state.db_connection.lock().unwrap();

            // A proposal at 50%, best case, closing 2025-06.
            create_deal(sample_draft(), &connection).unwrap();

            // A committed deal closing the following month.
            let mut committed = sample_draft();
            committed.probability = 0.95;
            committed.sell_usd = 20_000.0;
            committed.expected_close_month = "2025-07".parse().unwrap();
            create_deal(committed, &connection).unwrap();
        }

        let response = get_monthly_forecast_csv(State(state)).await.unwrap();
        let text = body_text(response).await;

        assert!(
            text.contains(
                "Month,Deals,Weighted Revenue USD,Weighted Margin USD,\
                Committed Margin USD,Best Case Margin USD,Worst Case Margin USD"
            ),
            "want the monthly forecast header: {text}"
        );
        assert!(
            text.contains("2025-06,1,50000.00,10000.00,0.00,10000.00,0.00"),
            "want the best case margin broken out for June: {text}"
        );
        assert!(
            text.contains("2025-07,1,19000.00,3800.00,3800.00,0.00,0.00"),
            "want the committed margin broken out for July: {text}"
        );
    }

    #[tokio::test]
    async fn deals_csv_includes_lost_deals_and_resolves_names() {
        let state = get_export_state();
        {
            let connection = state.db_connection.lock().unwrap();

            let mut lost = sample_draft();
            lost.status = DealStatus::Lost;
            create_deal(lost, &connection).unwrap();
        }

        let response = get_deals_csv(State(state)).await.unwrap();
        let text = body_text(response).await;

        assert!(text.contains("lost"), "want the lost deal included: {text}");
        assert!(text.contains("F5"), "want manufacturer name: {text}");
        assert!(text.contains("ATEA"), "want reseller name: {text}");
        assert!(text.contains("Volvo AB"), "want end customer: {text}");
    }
}
