//! The dashboard: KPI cards, the monthly weighted forecast chart, and the
//! forecast breakdown tables.

use axum::{
    extract::{FromRef, Query, State},
    response::{IntoResponse, Response},
};
use charming::{
    Chart,
    component::{Axis, Grid, Legend, Title},
    element::{
        AxisLabel, AxisPointer, AxisPointerType, AxisType, JsFunction, Tooltip, Trigger,
    },
    series::bar::Bar,
};
use maud::{Markup, PreEscaped, html};
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    deal::{Deal, get_all_deals},
    endpoints,
    forecast::{
        CategorizedForecast, DimensionalForecast, ForecastCategory, Kpis, MonthlyForecast,
        QuarterlyForecast, calculate_kpis, categorized_forecast, deals_closing_from,
        forecast_by_manufacturer, forecast_by_reseller, monthly_forecast, quarterly_forecast,
    },
    html::{
        BADGE_BEST_CASE_STYLE, BADGE_COMMITTED_STYLE, BADGE_WORST_CASE_STYLE, HeadElement,
        PAGE_CONTAINER_STYLE, TABLE_CELL_STYLE, TABLE_HEADER_STYLE, TABLE_ROW_STYLE,
        TOGGLE_ACTIVE_STYLE, TOGGLE_INACTIVE_STYLE, base, format_currency, format_percent,
    },
    manufacturer::manufacturer_names,
    month::Month,
    navigation::NavBar,
    reseller::reseller_names,
};

/// The state needed for the dashboard page.
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for DashboardState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// Which weighted figure the monthly chart plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartView {
    #[default]
    Revenue,
    Margin,
}

/// Presentation toggles for the dashboard, carried as query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DashboardQuery {
    /// Drop deals whose expected close month is in the past. On by default.
    #[serde(default = "default_exclude_past")]
    pub exclude_past: bool,
    #[serde(default)]
    pub view: ChartView,
}

fn default_exclude_past() -> bool {
    true
}

impl Default for DashboardQuery {
    fn default() -> Self {
        Self {
            exclude_past: default_exclude_past(),
            view: ChartView::default(),
        }
    }
}

/// A dashboard chart with its HTML container ID and ECharts configuration.
struct DashboardChart {
    id: &'static str,
    /// The ECharts configuration as a JSON string.
    options: String,
}

fn charts_view(charts: &[DashboardChart]) -> Markup {
    html!(
        section id="charts" class="w-full mx-auto mb-4"
        {
            @for chart in charts {
                div
                    id=(chart.id)
                    class="min-h-[380px] rounded dark:bg-gray-100"
                {}
            }
        }
    )
}

/// JavaScript that initializes the ECharts instances with dark mode support
/// and responsive resizing.
fn charts_script(charts: &[DashboardChart]) -> HeadElement {
    let script_content = charts
        .iter()
        .map(|chart| {
            format!(
                r#"(function() {{
                    const chartDom = document.getElementById("{}");
                    const chart = echarts.init(chartDom);
                    const option = {};
                    chart.setOption(option);

                    window.addEventListener('resize', chart.resize);

                    const darkModeMediaQuery = window.matchMedia('(prefers-color-scheme: dark)');
                    const updateTheme = () => {{
                        const isDarkMode = darkModeMediaQuery.matches;
                        chart.setTheme(isDarkMode ? 'dark' : 'default');
                    }}
                    darkModeMediaQuery.addEventListener('change', updateTheme);
                    updateTheme();
                }})();"#,
                chart.id, chart.options
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let wrapped_script = format!(
        "document.addEventListener('DOMContentLoaded', function() {{\n{}\n}});",
        script_content
    );

    HeadElement::ScriptSource(PreEscaped(wrapped_script))
}

fn monthly_forecast_chart(forecasts: &[MonthlyForecast], view: ChartView) -> Chart {
    let labels: Vec<String> = forecasts
        .iter()
        .map(|forecast| forecast.month.to_string())
        .collect();
    let (series_name, values): (&str, Vec<f64>) = match view {
        ChartView::Revenue => (
            "Weighted Revenue",
            forecasts
                .iter()
                .map(|forecast| forecast.weighted_revenue_usd)
                .collect(),
        ),
        ChartView::Margin => (
            "Weighted Margin",
            forecasts
                .iter()
                .map(|forecast| forecast.weighted_margin_usd)
                .collect(),
        ),
    };

    Chart::new()
        .title(
            Title::new()
                .text("Monthly Forecast")
                .subtext("Weighted pipeline by expected close month"),
        )
        .tooltip(currency_tooltip())
        .legend(Legend::new().top("1%").right("4%"))
        .grid(
            Grid::new()
                .left("3%")
                .right("4%")
                .bottom("3%")
                .contain_label(true),
        )
        .x_axis(Axis::new().type_(AxisType::Category).data(labels))
        .y_axis(
            Axis::new()
                .type_(AxisType::Value)
                .axis_label(AxisLabel::new().formatter(currency_formatter())),
        )
        .series(Bar::new().name(series_name).data(values))
}

#[inline]
fn currency_formatter() -> JsFunction {
    JsFunction::new_with_args(
        "number",
        "const currencyFormatter = new Intl.NumberFormat('en-US', {
              style: 'currency',
              currency: 'USD',
              maximumFractionDigits: 0
            });
            return (number) ? currencyFormatter.format(number) : \"-\";",
    )
}

fn currency_tooltip() -> Tooltip {
    Tooltip::new()
        .trigger(Trigger::Axis)
        .value_formatter(currency_formatter())
        .axis_pointer(AxisPointer::new().type_(AxisPointerType::Shadow))
}

fn kpi_card(label: &str, value: &str) -> Markup {
    html!(
        div class="p-4 bg-gray-50 dark:bg-gray-800 rounded"
        {
            p class="text-sm text-gray-500 dark:text-gray-400" { (label) }
            p class="text-2xl font-bold" { (value) }
        }
    )
}

fn kpi_cards_view(kpis: &Kpis) -> Markup {
    html!(
        section class="grid grid-cols-2 lg:grid-cols-4 gap-4 w-full mb-8"
        {
            (kpi_card("Won Revenue", &format_currency(kpis.total_revenue)))
            (kpi_card(
                "Gross Margin",
                &format!(
                    "{} ({})",
                    format_currency(kpis.gross_margin_usd),
                    format_percent(kpis.gross_margin_pct)
                ),
            ))
            (kpi_card(
                "Weighted Pipeline",
                &format_currency(kpis.weighted_revenue_usd),
            ))
            (kpi_card(
                "Best Case",
                &format_currency(kpis.best_case_revenue_usd),
            ))
        }
    )
}

fn forecast_table(title: &str, header: &str, rows: &[[String; 4]]) -> Markup {
    html!(
        div class="w-full mb-8"
        {
            h2 class="text-xl font-bold mb-2" { (title) }

            table class="w-full text-sm text-left rtl:text-right
                text-gray-500 dark:text-gray-400"
            {
                thead class=(TABLE_HEADER_STYLE)
                {
                    tr
                    {
                        th scope="col" class=(TABLE_CELL_STYLE) { (header) }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Weighted Revenue" }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Weighted Margin" }
                        th scope="col" class=(TABLE_CELL_STYLE) { "Deals" }
                    }
                }

                tbody
                {
                    @for row in rows {
                        tr class=(TABLE_ROW_STYLE)
                        {
                            @for cell in row {
                                td class=(TABLE_CELL_STYLE) { (cell) }
                            }
                        }
                    }

                    @if rows.is_empty() {
                        tr
                        {
                            td
                                colspan="4"
                                class="px-6 py-4 text-center
                                    text-gray-500 dark:text-gray-400"
                            {
                                "No open deals."
                            }
                        }
                    }
                }
            }
        }
    )
}

fn monthly_rows(forecasts: &[MonthlyForecast]) -> Vec<[String; 4]> {
    forecasts
        .iter()
        .map(|forecast| {
            [
                forecast.month.to_string(),
                format_currency(forecast.weighted_revenue_usd),
                format_currency(forecast.weighted_margin_usd),
                forecast.deal_count.to_string(),
            ]
        })
        .collect()
}

fn quarterly_rows(forecasts: &[QuarterlyForecast]) -> Vec<[String; 4]> {
    forecasts
        .iter()
        .map(|forecast| {
            [
                forecast.quarter.to_string(),
                format_currency(forecast.weighted_revenue_usd),
                format_currency(forecast.weighted_margin_usd),
                forecast.deal_count.to_string(),
            ]
        })
        .collect()
}

fn dimensional_rows(forecasts: &[DimensionalForecast]) -> Vec<[String; 4]> {
    forecasts
        .iter()
        .map(|forecast| {
            [
                forecast.name.clone(),
                format_currency(forecast.weighted_revenue_usd),
                format_currency(forecast.weighted_margin_usd),
                forecast.deal_count.to_string(),
            ]
        })
        .collect()
}

fn category_badge(category: ForecastCategory) -> Markup {
    let style = match category {
        ForecastCategory::Committed => BADGE_COMMITTED_STYLE,
        ForecastCategory::BestCase => BADGE_BEST_CASE_STYLE,
        ForecastCategory::WorstCase => BADGE_WORST_CASE_STYLE,
    };

    html!(span class=(style) { (category.label()) })
}

fn categorized_deal_row(deal: &Deal) -> Markup {
    html!(
        tr class=(TABLE_ROW_STYLE)
        {
            td class=(TABLE_CELL_STYLE) { (deal.end_customer) }
            td class=(TABLE_CELL_STYLE) { (deal.status) }
            td class=(TABLE_CELL_STYLE) { (format_percent(deal.probability)) }
            td class=(TABLE_CELL_STYLE) { (deal.expected_close_month) }
            td class=(TABLE_CELL_STYLE) { (format_currency(deal.sell_usd)) }
            td class=(TABLE_CELL_STYLE) { (format_currency(deal.margin_usd)) }
        }
    )
}

fn categorized_view(forecasts: &[CategorizedForecast]) -> Markup {
    html!(
        section class="w-full mb-8"
        {
            h2 class="text-xl font-bold mb-2" { "Forecast Categories" }

            @for forecast in forecasts {
                details class="mb-2 p-4 bg-gray-50 dark:bg-gray-800 rounded"
                {
                    summary class="cursor-pointer flex items-center gap-4"
                    {
                        (category_badge(forecast.category))

                        span
                        {
                            (format_currency(forecast.weighted_revenue_usd))
                            " weighted revenue, "
                            (format_currency(forecast.weighted_margin_usd))
                            " weighted margin ("
                            (forecast.deal_count)
                            " deals)"
                        }
                    }

                    @if forecast.deals.is_empty() {
                        p class="mt-2 text-gray-500 dark:text-gray-400"
                        {
                            "No deals in this category."
                        }
                    } @else {
                        table class="w-full mt-2 text-sm text-left rtl:text-right
                            text-gray-500 dark:text-gray-400"
                        {
                            thead class=(TABLE_HEADER_STYLE)
                            {
                                tr
                                {
                                    th scope="col" class=(TABLE_CELL_STYLE) { "Customer" }
                                    th scope="col" class=(TABLE_CELL_STYLE) { "Status" }
                                    th scope="col" class=(TABLE_CELL_STYLE) { "Probability" }
                                    th scope="col" class=(TABLE_CELL_STYLE) { "Close Month" }
                                    th scope="col" class=(TABLE_CELL_STYLE) { "Sell Price" }
                                    th scope="col" class=(TABLE_CELL_STYLE) { "Margin" }
                                }
                            }

                            tbody
                            {
                                @for deal in &forecast.deals {
                                    (categorized_deal_row(deal))
                                }
                            }
                        }
                    }
                }
            }
        }
    )
}

fn toggle_pill(label: &str, url: &str, is_active: bool) -> Markup {
    let style = if is_active {
        TOGGLE_ACTIVE_STYLE
    } else {
        TOGGLE_INACTIVE_STYLE
    };

    html!(a href=(url) class=(style) { (label) })
}

fn filters_view(query: &DashboardQuery) -> Markup {
    let exclude_past = query.exclude_past;
    let view_param = match query.view {
        ChartView::Revenue => "revenue",
        ChartView::Margin => "margin",
    };
    let url = |exclude_past: bool, view: &str| {
        format!(
            "{}?exclude_past={exclude_past}&view={view}",
            endpoints::DASHBOARD_VIEW
        )
    };

    html!(
        section class="flex flex-wrap gap-2 w-full mb-4"
        {
            (toggle_pill(
                "Exclude past months",
                &url(!exclude_past, view_param),
                exclude_past,
            ))
            (toggle_pill("Revenue", &url(exclude_past, "revenue"),
                query.view == ChartView::Revenue))
            (toggle_pill("Margin", &url(exclude_past, "margin"),
                query.view == ChartView::Margin))
        }
    )
}

struct DashboardData {
    kpis: Kpis,
    monthly: Vec<MonthlyForecast>,
    quarterly: Vec<QuarterlyForecast>,
    by_manufacturer: Vec<DimensionalForecast>,
    by_reseller: Vec<DimensionalForecast>,
    categorized: Vec<CategorizedForecast>,
}

fn dashboard_view(data: &DashboardData, query: &DashboardQuery) -> Markup {
    let nav_bar = NavBar::new(endpoints::DASHBOARD_VIEW).into_html();

    let charts = [DashboardChart {
        id: "monthly-forecast-chart",
        options: monthly_forecast_chart(&data.monthly, query.view)
            .to_string(),
    }];

    let content = html!(
        (nav_bar)

        div class=(PAGE_CONTAINER_STYLE)
        {
            h1 class="text-2xl font-bold mb-6" { "Dashboard" }

            (filters_view(query))
            (kpi_cards_view(&data.kpis))
            (charts_view(&charts))
            (forecast_table("Monthly Forecast", "Month", &monthly_rows(&data.monthly)))
            (forecast_table(
                "Quarterly Forecast",
                "Quarter",
                &quarterly_rows(&data.quarterly),
            ))
            (forecast_table(
                "By Manufacturer",
                "Manufacturer",
                &dimensional_rows(&data.by_manufacturer),
            ))
            (forecast_table(
                "By Reseller",
                "Reseller",
                &dimensional_rows(&data.by_reseller),
            ))
            (categorized_view(&data.categorized))
        }
    );

    let head_elements = [
        HeadElement::ScriptLink("/static/echarts.6.0.0.min.js".to_owned()),
        charts_script(&charts),
    ];

    base("Dashboard", &head_elements, &content)
}

/// Route handler for the dashboard page.
pub async fn get_dashboard_page(
    State(state): State<DashboardState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, Error> {
    let (deals, manufacturers, resellers) = {
        let connection = state
            .db_connection
            .lock()
            .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
            .map_err(|_| Error::DatabaseLockError)?;

        let deals = get_all_deals(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve deals: {error}"))?;
        let manufacturers = manufacturer_names(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve manufacturers: {error}"))?;
        let resellers = reseller_names(&connection)
            .inspect_err(|error| tracing::error!("Failed to retrieve resellers: {error}"))?;

        (deals, manufacturers, resellers)
    };

    let deals = if query.exclude_past {
        let current_month = Month::containing(OffsetDateTime::now_utc().date());
        deals_closing_from(deals, current_month)
    } else {
        deals
    };

    let data = DashboardData {
        kpis: calculate_kpis(&deals),
        monthly: monthly_forecast(&deals),
        quarterly: quarterly_forecast(&deals),
        by_manufacturer: forecast_by_manufacturer(&deals, &manufacturers),
        by_reseller: forecast_by_reseller(&deals, &resellers),
        categorized: categorized_forecast(&deals),
    };

    Ok(dashboard_view(&data, &query).into_response())
}

#[cfg(test)]
mod dashboard_page_tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use rusqlite::Connection;
    use scraper::{Html, Selector};

    use crate::{
        db::initialize,
        deal::{DealDraft, DealStatus, create_deal},
        manufacturer::create_manufacturer,
        month::Month,
        reseller::create_reseller,
    };

    use super::{ChartView, DashboardQuery, DashboardState, get_dashboard_page};

    fn get_dashboard_state() -> DashboardState {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize(&connection).expect("Could not initialize database");

        DashboardState {
            db_connection: Arc::new(Mutex::new(connection)),
        }
    }

    fn seed_deal(state: &DashboardState, sell_usd: f64, status: DealStatus, month: &str) {
        let connection = state.db_connection.lock().unwrap();
        create_manufacturer("F5", &connection).ok();
        create_reseller("ATEA", &connection).ok();

        create_deal(
            DealDraft {
                manufacturer_id: 1,
                reseller_id: 1,
                end_customer: "Volvo AB".to_string(),
                bdm_id: None,
                sell_usd,
                margin_pct: 0.2,
                probability: 0.5,
                status,
                expected_close_month: month.parse::<Month>().unwrap(),
                notes: None,
            },
            &connection,
        )
        .expect("Could not create deal");
    }

    async fn render(state: DashboardState, query: DashboardQuery) -> Html {
        let response = get_dashboard_page(State(state), Query(query))
            .await
            .expect("Could not render dashboard");

        let body = response.into_body();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let text = String::from_utf8_lossy(&body).to_string();

        Html::parse_document(&text)
    }

    #[tokio::test]
    async fn renders_kpi_cards_and_tables() {
        let state = get_dashboard_state();
        seed_deal(&state, 100_000.0, DealStatus::Proposal, "2100-01");

        let html = render(state, DashboardQuery::default()).await;

        assert!(
            html.errors.is_empty(),
            "Got HTML parsing errors: {:?}",
            html.errors
        );

        let text = html.html();

        for heading in [
            "Won Revenue",
            "Weighted Pipeline",
            "Monthly Forecast",
            "Quarterly Forecast",
            "By Manufacturer",
            "By Reseller",
            "Forecast Categories",
        ] {
            assert!(text.contains(heading), "want page to contain {heading}");
        }

        // 100k at 50% probability.
        assert!(text.contains("$50,000"), "want weighted revenue on page");
        assert!(text.contains("F5"), "want manufacturer name on page");
    }

    #[tokio::test]
    async fn excludes_past_months_by_default() {
        let state = get_dashboard_state();
        seed_deal(&state, 100_000.0, DealStatus::Proposal, "2000-01");

        let html = render(state, DashboardQuery::default()).await;
        let text = html.html();

        assert!(
            !text.contains("$50,000"),
            "want deal from the distant past to be filtered out"
        );
    }

    #[tokio::test]
    async fn includes_past_months_when_toggled_off() {
        let state = get_dashboard_state();
        seed_deal(&state, 100_000.0, DealStatus::Proposal, "2000-01");

        let html = render(
            state,
            DashboardQuery {
                exclude_past: false,
                view: ChartView::Revenue,
            },
        )
        .await;
        let text = html.html();

        assert!(
            text.contains("$50,000"),
            "want deal from the past to be included"
        );
    }

    #[tokio::test]
    async fn renders_chart_container_and_script() {
        let state = get_dashboard_state();
        seed_deal(&state, 100_000.0, DealStatus::Proposal, "2100-01");

        let html = render(state, DashboardQuery::default()).await;

        let chart_selector = Selector::parse("#monthly-forecast-chart").unwrap();
        assert!(
            html.select(&chart_selector).next().is_some(),
            "want a chart container div"
        );

        let script_selector = Selector::parse("script").unwrap();
        let has_init_script = html
            .select(&script_selector)
            .any(|script| script.inner_html().contains("echarts.init"));
        assert!(has_init_script, "want the chart initialization script");
    }
}
