//! The forecast aggregation engine.
//!
//! Pure functions that turn a snapshot of deals into KPI totals, monthly and
//! quarterly buckets, per-manufacturer/reseller breakdowns, and
//! committed/best-case/worst-case categorizations. Nothing here touches the
//! database or the clock: callers pass in the deal collection, the id-to-name
//! lookups, and the month to forecast from.

use std::collections::HashMap;

use crate::{
    deal::{Deal, DealStatus},
    month::{Month, Quarter},
};

/// The margin in dollars for a deal.
pub fn margin_amount(sell_usd: f64, margin_pct: f64) -> f64 {
    sell_usd * margin_pct
}

/// The cost in dollars for a deal, i.e., the part of the sell price that is
/// not margin.
pub fn cost_amount(sell_usd: f64, margin_pct: f64) -> f64 {
    sell_usd * (1.0 - margin_pct)
}

/// The revenue weighted by the probability of winning the deal.
pub fn weighted_revenue(sell_usd: f64, probability: f64) -> f64 {
    sell_usd * probability
}

/// The margin weighted by the probability of winning the deal.
pub fn weighted_margin(margin_usd: f64, probability: f64) -> f64 {
    margin_usd * probability
}

/// The forecast bucket an open deal falls into.
///
/// Ordered by business priority: committed deals are the most certain,
/// worst-case deals the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForecastCategory {
    Committed,
    BestCase,
    WorstCase,
}

impl ForecastCategory {
    /// All categories in their fixed display order.
    pub const ALL: [ForecastCategory; 3] = [
        ForecastCategory::Committed,
        ForecastCategory::BestCase,
        ForecastCategory::WorstCase,
    ];

    /// The human-readable label for the category.
    pub fn label(self) -> &'static str {
        match self {
            ForecastCategory::Committed => "Committed",
            ForecastCategory::BestCase => "Best Case",
            ForecastCategory::WorstCase => "Worst Case",
        }
    }
}

/// Classify an open deal into a forecast category.
///
/// The rules, first match wins:
/// 1. Committed: probability of at least 90%, or a verbal agreement with a
///    probability of at least 80%.
/// 2. Best case: probability of at least 70%, or a proposal at any
///    probability.
/// 3. Worst case: everything else.
///
/// Callers must filter out won and lost deals first; terminal deals are not
/// part of the forecast and have no meaningful category.
pub fn categorize_deal(status: DealStatus, probability: f64) -> ForecastCategory {
    debug_assert!(status.is_open(), "terminal deals have no forecast category");

    if probability >= 0.9 || (status == DealStatus::Verbal && probability >= 0.8) {
        ForecastCategory::Committed
    } else if probability >= 0.7 || status == DealStatus::Proposal {
        ForecastCategory::BestCase
    } else {
        ForecastCategory::WorstCase
    }
}

/// The headline totals shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Kpis {
    /// Revenue from won deals.
    pub total_revenue: f64,
    /// Cost of won deals.
    pub total_cost: f64,
    /// Margin from won deals in dollars.
    pub gross_margin_usd: f64,
    /// Margin from won deals as a fraction of revenue, 0 when there is no
    /// revenue.
    pub gross_margin_pct: f64,
    /// Probability-weighted margin of the open pipeline.
    pub weighted_margin_usd: f64,
    /// Probability-weighted revenue of the open pipeline.
    pub weighted_revenue_usd: f64,
    /// Revenue if every open deal is won, plus actuals.
    pub best_case_revenue_usd: f64,
    /// Margin if every open deal is won, plus actuals.
    pub best_case_margin_usd: f64,
    /// Full (unweighted) value of the open pipeline.
    pub total_pipeline_value: f64,
    /// Full (unweighted) margin of the open pipeline.
    pub total_pipeline_margin: f64,
}

/// Reduce a deal collection into headline KPI totals.
///
/// Won deals contribute to the actuals, open deals to the weighted pipeline
/// and best-case figures, and lost deals to nothing. An empty collection
/// yields all-zero KPIs.
pub fn calculate_kpis(deals: &[Deal]) -> Kpis {
    let open_deals = || deals.iter().filter(|deal| deal.status.is_open());
    let won_deals = || deals.iter().filter(|deal| deal.status == DealStatus::Won);

    let total_revenue: f64 = won_deals().map(|deal| deal.sell_usd).sum();
    let total_cost: f64 = won_deals()
        .map(|deal| cost_amount(deal.sell_usd, deal.margin_pct))
        .sum();
    let gross_margin_usd = total_revenue - total_cost;
    let gross_margin_pct = if total_revenue > 0.0 {
        gross_margin_usd / total_revenue
    } else {
        0.0
    };

    let weighted_margin_usd: f64 = open_deals()
        .map(|deal| weighted_margin(deal.margin_usd, deal.probability))
        .sum();
    let weighted_revenue_usd: f64 = open_deals()
        .map(|deal| weighted_revenue(deal.sell_usd, deal.probability))
        .sum();

    let total_pipeline_value: f64 = open_deals().map(|deal| deal.sell_usd).sum();
    let total_pipeline_margin: f64 = open_deals().map(|deal| deal.margin_usd).sum();

    Kpis {
        total_revenue,
        total_cost,
        gross_margin_usd,
        gross_margin_pct,
        weighted_margin_usd,
        weighted_revenue_usd,
        best_case_revenue_usd: total_revenue + total_pipeline_value,
        best_case_margin_usd: gross_margin_usd + total_pipeline_margin,
        total_pipeline_value,
        total_pipeline_margin,
    }
}

/// The weighted pipeline expected to close in one month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyForecast {
    pub month: Month,
    pub weighted_revenue_usd: f64,
    pub weighted_margin_usd: f64,
    pub deal_count: usize,
}

/// Group open deals by expected close month, earliest month first.
pub fn monthly_forecast(deals: &[Deal]) -> Vec<MonthlyForecast> {
    let mut buckets: HashMap<Month, (f64, f64, usize)> = HashMap::new();

    for deal in deals.iter().filter(|deal| deal.status.is_open()) {
        let bucket = buckets
            .entry(deal.expected_close_month)
            .or_insert((0.0, 0.0, 0));
        bucket.0 += weighted_revenue(deal.sell_usd, deal.probability);
        bucket.1 += weighted_margin(deal.margin_usd, deal.probability);
        bucket.2 += 1;
    }

    let mut forecasts: Vec<MonthlyForecast> = buckets
        .into_iter()
        .map(
            |(month, (weighted_revenue_usd, weighted_margin_usd, deal_count))| MonthlyForecast {
                month,
                weighted_revenue_usd,
                weighted_margin_usd,
                deal_count,
            },
        )
        .collect();

    forecasts.sort_by_key(|forecast| forecast.month);

    forecasts
}

/// The weighted pipeline expected to close in one quarter.
#[derive(Debug, Clone, PartialEq)]
pub struct QuarterlyForecast {
    pub quarter: Quarter,
    pub weighted_revenue_usd: f64,
    pub weighted_margin_usd: f64,
    pub deal_count: usize,
}

/// Group open deals by the quarter of their expected close month, earliest
/// quarter first.
pub fn quarterly_forecast(deals: &[Deal]) -> Vec<QuarterlyForecast> {
    let mut buckets: HashMap<Quarter, (f64, f64, usize)> = HashMap::new();

    for deal in deals.iter().filter(|deal| deal.status.is_open()) {
        let bucket = buckets
            .entry(deal.expected_close_month.quarter())
            .or_insert((0.0, 0.0, 0));
        bucket.0 += weighted_revenue(deal.sell_usd, deal.probability);
        bucket.1 += weighted_margin(deal.margin_usd, deal.probability);
        bucket.2 += 1;
    }

    let mut forecasts: Vec<QuarterlyForecast> = buckets
        .into_iter()
        .map(
            |(quarter, (weighted_revenue_usd, weighted_margin_usd, deal_count))| {
                QuarterlyForecast {
                    quarter,
                    weighted_revenue_usd,
                    weighted_margin_usd,
                    deal_count,
                }
            },
        )
        .collect();

    forecasts.sort_by_key(|forecast| forecast.quarter);

    forecasts
}

/// The weighted pipeline for one value of a dimension (one manufacturer, one
/// reseller).
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionalForecast {
    /// The ID of the dimension value, e.g., a manufacturer ID.
    pub key: i64,
    /// The resolved display name, or "Unknown" if the ID is not in the
    /// lookup.
    pub name: String,
    pub weighted_revenue_usd: f64,
    pub weighted_margin_usd: f64,
    pub deal_count: usize,
}

/// Group open deals by a dimension key, ranked by weighted margin with the
/// largest first.
///
/// Missing names degrade to "Unknown" rather than failing. Ties are broken by
/// key so the ranking is deterministic.
pub fn forecast_by_dimension(
    deals: &[Deal],
    key: impl Fn(&Deal) -> i64,
    names: &HashMap<i64, String>,
) -> Vec<DimensionalForecast> {
    let mut buckets: HashMap<i64, (f64, f64, usize)> = HashMap::new();

    for deal in deals.iter().filter(|deal| deal.status.is_open()) {
        let bucket = buckets.entry(key(deal)).or_insert((0.0, 0.0, 0));
        bucket.0 += weighted_revenue(deal.sell_usd, deal.probability);
        bucket.1 += weighted_margin(deal.margin_usd, deal.probability);
        bucket.2 += 1;
    }

    let mut forecasts: Vec<DimensionalForecast> = buckets
        .into_iter()
        .map(
            |(key, (weighted_revenue_usd, weighted_margin_usd, deal_count))| DimensionalForecast {
                key,
                name: names.get(&key).cloned().unwrap_or_else(|| "Unknown".to_string()),
                weighted_revenue_usd,
                weighted_margin_usd,
                deal_count,
            },
        )
        .collect();

    forecasts.sort_by(|a, b| {
        b.weighted_margin_usd
            .total_cmp(&a.weighted_margin_usd)
            .then(a.key.cmp(&b.key))
    });

    forecasts
}

/// Group open deals by manufacturer, ranked by weighted margin.
pub fn forecast_by_manufacturer(
    deals: &[Deal],
    manufacturers: &HashMap<i64, String>,
) -> Vec<DimensionalForecast> {
    forecast_by_dimension(deals, |deal| deal.manufacturer_id, manufacturers)
}

/// Group open deals by reseller, ranked by weighted margin.
pub fn forecast_by_reseller(
    deals: &[Deal],
    resellers: &HashMap<i64, String>,
) -> Vec<DimensionalForecast> {
    forecast_by_dimension(deals, |deal| deal.reseller_id, resellers)
}

/// The weighted pipeline for one forecast category, with the member deals for
/// drill-down.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedForecast {
    pub category: ForecastCategory,
    pub weighted_revenue_usd: f64,
    pub weighted_margin_usd: f64,
    pub deal_count: usize,
    pub deals: Vec<Deal>,
}

/// Group open deals by forecast category.
///
/// Always returns exactly three rows in the order committed, best case, worst
/// case, so callers never need to handle an absent category.
pub fn categorized_forecast(deals: &[Deal]) -> Vec<CategorizedForecast> {
    let mut forecasts: Vec<CategorizedForecast> = ForecastCategory::ALL
        .into_iter()
        .map(|category| CategorizedForecast {
            category,
            weighted_revenue_usd: 0.0,
            weighted_margin_usd: 0.0,
            deal_count: 0,
            deals: Vec::new(),
        })
        .collect();

    for deal in deals.iter().filter(|deal| deal.status.is_open()) {
        let category = categorize_deal(deal.status, deal.probability);
        let row = forecasts
            .iter_mut()
            .find(|row| row.category == category)
            .expect("all categories are initialized above");

        row.weighted_revenue_usd += weighted_revenue(deal.sell_usd, deal.probability);
        row.weighted_margin_usd += weighted_margin(deal.margin_usd, deal.probability);
        row.deal_count += 1;
        row.deals.push(deal.clone());
    }

    forecasts
}

/// Keep only the deals expected to close in `as_of` or later.
///
/// This is the "exclude past months" filter: the caller decides what counts
/// as the current month, keeping the aggregation functions free of the system
/// clock.
pub fn deals_closing_from(mut deals: Vec<Deal>, as_of: Month) -> Vec<Deal> {
    deals.retain(|deal| deal.expected_close_month >= as_of);
    deals
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::str::FromStr;

    use time::OffsetDateTime;

    use crate::{
        deal::{Deal, DealStatus},
        month::Month,
    };

    /// A deal with the given numbers and placeholder reference data.
    pub fn make_deal(
        sell_usd: f64,
        margin_pct: f64,
        probability: f64,
        status: DealStatus,
        month: &str,
    ) -> Deal {
        Deal {
            id: 0,
            manufacturer_id: 1,
            reseller_id: 1,
            end_customer: "Test Customer".to_string(),
            bdm_id: None,
            sell_usd,
            margin_pct,
            margin_usd: sell_usd * margin_pct,
            probability,
            status,
            expected_close_month: Month::from_str(month).unwrap(),
            notes: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }
}


#[cfg(test)]
mod categorize_deal_tests {
    use crate::deal::DealStatus;

    use super::{ForecastCategory, categorize_deal};

    #[test]
    fn probability_at_ninety_percent_is_committed() {
        assert_eq!(
            categorize_deal(DealStatus::Prospect, 0.90),
            ForecastCategory::Committed
        );
    }

    #[test]
    fn probability_just_below_ninety_percent_is_not_committed() {
        assert_eq!(
            categorize_deal(DealStatus::Prospect, 0.8999),
            ForecastCategory::BestCase
        );
    }

    #[test]
    fn verbal_at_eighty_percent_is_committed() {
        assert_eq!(
            categorize_deal(DealStatus::Verbal, 0.80),
            ForecastCategory::Committed
        );
    }

    #[test]
    fn verbal_below_eighty_percent_is_best_case() {
        assert_eq!(
            categorize_deal(DealStatus::Verbal, 0.79),
            ForecastCategory::BestCase
        );
    }

    #[test]
    fn proposal_is_best_case_at_any_probability() {
        assert_eq!(
            categorize_deal(DealStatus::Proposal, 0.1),
            ForecastCategory::BestCase
        );
    }

    #[test]
    fn low_probability_is_worst_case() {
        assert_eq!(
            categorize_deal(DealStatus::Qualified, 0.3),
            ForecastCategory::WorstCase
        );
    }
}

#[cfg(test)]
mod kpi_tests {
    use crate::deal::DealStatus;

    use super::{Kpis, calculate_kpis, test_utils::make_deal};

    #[test]
    fn empty_input_yields_all_zero_kpis() {
        let kpis = calculate_kpis(&[]);

        assert_eq!(kpis, Kpis::default());
    }

    #[test]
    fn won_deals_contribute_to_actuals_only() {
        let deals = vec![make_deal(50_000.0, 0.30, 1.0, DealStatus::Won, "2025-03")];

        let kpis = calculate_kpis(&deals);

        assert_eq!(kpis.total_revenue, 50_000.0);
        assert_eq!(kpis.gross_margin_usd, 15_000.0);
        assert!((kpis.gross_margin_pct - 0.30).abs() < 1e-9);
        assert_eq!(kpis.weighted_revenue_usd, 0.0);
        assert_eq!(kpis.weighted_margin_usd, 0.0);
    }

    #[test]
    fn open_deals_contribute_to_pipeline_only() {
        let deals = vec![make_deal(
            100_000.0,
            0.20,
            0.5,
            DealStatus::Proposal,
            "2025-06",
        )];

        let kpis = calculate_kpis(&deals);

        assert_eq!(kpis.total_revenue, 0.0);
        assert_eq!(kpis.weighted_revenue_usd, 50_000.0);
        assert_eq!(kpis.weighted_margin_usd, 10_000.0);
        assert_eq!(kpis.total_pipeline_value, 100_000.0);
        assert_eq!(kpis.total_pipeline_margin, 20_000.0);
        assert_eq!(kpis.best_case_revenue_usd, 100_000.0);
        assert_eq!(kpis.best_case_margin_usd, 20_000.0);
    }

    #[test]
    fn lost_deals_contribute_nothing() {
        let deals = vec![make_deal(75_000.0, 0.25, 0.9, DealStatus::Lost, "2025-01")];

        let kpis = calculate_kpis(&deals);

        assert_eq!(kpis, Kpis::default());
    }

    #[test]
    fn best_case_combines_actuals_and_pipeline() {
        let deals = vec![
            make_deal(50_000.0, 0.30, 1.0, DealStatus::Won, "2025-01"),
            make_deal(100_000.0, 0.20, 0.5, DealStatus::Qualified, "2025-06"),
        ];

        let kpis = calculate_kpis(&deals);

        assert_eq!(kpis.best_case_revenue_usd, 150_000.0);
        assert_eq!(kpis.best_case_margin_usd, 35_000.0);
    }
}


#[cfg(test)]
mod dimensional_forecast_tests {
    use std::collections::HashMap;

    use crate::deal::DealStatus;

    use super::{forecast_by_manufacturer, test_utils::make_deal};

    #[test]
    fn ranks_by_weighted_margin_descending() {
        let mut small = make_deal(10_000.0, 0.2, 0.5, DealStatus::Qualified, "2025-01");
        small.manufacturer_id = 1;
        let mut large = make_deal(100_000.0, 0.2, 0.9, DealStatus::Prospect, "2025-01");
        large.manufacturer_id = 2;

        let names = HashMap::from([(1, "F5".to_string()), (2, "Zscaler".to_string())]);

        let forecasts = forecast_by_manufacturer(&[small, large], &names);

        assert_eq!(forecasts.len(), 2);
        assert_eq!(forecasts[0].name, "Zscaler");
        assert_eq!(forecasts[1].name, "F5");
        assert!(forecasts[0].weighted_margin_usd >= forecasts[1].weighted_margin_usd);
    }

    #[test]
    fn missing_name_falls_back_to_unknown() {
        let deal = make_deal(10_000.0, 0.2, 0.5, DealStatus::Qualified, "2025-01");

        let forecasts = forecast_by_manufacturer(&[deal], &HashMap::new());

        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].name, "Unknown");
    }

    #[test]
    fn deals_for_the_same_manufacturer_are_combined() {
        let deals = vec![
            make_deal(10_000.0, 0.2, 0.5, DealStatus::Qualified, "2025-01"),
            make_deal(20_000.0, 0.2, 0.5, DealStatus::Prospect, "2025-02"),
        ];
        let names = HashMap::from([(1, "F5".to_string())]);

        let forecasts = forecast_by_manufacturer(&deals, &names);

        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].deal_count, 2);
        assert_eq!(forecasts[0].weighted_revenue_usd, 15_000.0);
    }
}



#[cfg(test)]
mod worked_example_tests {
    use std::str::FromStr;

    use crate::{deal::DealStatus, month::Month};

    use super::{
        ForecastCategory, categorize_deal, monthly_forecast, test_utils::make_deal,
        weighted_margin, weighted_revenue,
    };

    // A proposal-stage deal at 50% probability should land in the best-case
    // bucket with half-weighted figures.
    #[test]
    fn proposal_deal_scenario() {
        let deal = make_deal(100_000.0, 0.20, 0.5, DealStatus::Proposal, "2025-06");

        assert_eq!(deal.margin_usd, 20_000.0);
        assert_eq!(
            categorize_deal(deal.status, deal.probability),
            ForecastCategory::BestCase
        );
        assert_eq!(weighted_margin(deal.margin_usd, deal.probability), 10_000.0);
        assert_eq!(
            weighted_revenue(deal.sell_usd, deal.probability),
            50_000.0
        );

        let forecasts = monthly_forecast(&[deal]);
        assert_eq!(forecasts.len(), 1);
        assert_eq!(forecasts[0].month, Month::from_str("2025-06").unwrap());
        assert_eq!(forecasts[0].deal_count, 1);
    }
}
