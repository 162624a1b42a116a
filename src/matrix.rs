//! The manufacturer-by-month pivot behind the forecast exports.
//!
//! One algorithm with two configurations: the weighted variant discounts each
//! deal by its probability, the full-value variant counts the whole deal.
//! Callers pre-filter the deal collection (lost deals out, and for the
//! full-value variant only deals at 70% probability or better) before
//! building the matrix.

use std::collections::{HashMap, HashSet};

use crate::{deal::Deal, month::Month};

/// How a deal contributes to a matrix cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    /// Revenue and margin discounted by the deal's win probability.
    Weighted,
    /// The deal's full sell price and margin, undiscounted.
    FullValue,
}

impl Contribution {
    /// The (revenue, margin) a deal adds to its cell.
    pub fn apply(self, deal: &Deal) -> (f64, f64) {
        match self {
            Contribution::Weighted => (
                deal.sell_usd * deal.probability,
                deal.margin_usd * deal.probability,
            ),
            Contribution::FullValue => (deal.sell_usd, deal.margin_usd),
        }
    }
}

/// One cell of the matrix: the deals of one manufacturer closing in one
/// month.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixCell {
    pub deal_count: usize,
    pub revenue_usd: f64,
    pub margin_usd: f64,
}

impl MatrixCell {
    fn add(&mut self, revenue_usd: f64, margin_usd: f64) {
        self.deal_count += 1;
        self.revenue_usd += revenue_usd;
        self.margin_usd += margin_usd;
    }

    /// The cell's margin as a fraction of its revenue, 0 when the cell has no
    /// revenue.
    pub fn margin_pct(&self) -> f64 {
        if self.revenue_usd > 0.0 {
            self.margin_usd / self.revenue_usd
        } else {
            0.0
        }
    }
}

/// One manufacturer's row of the matrix, with one cell per month in the
/// matrix's month list.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub manufacturer_id: i64,
    /// The manufacturer's name, or "Unknown" if the ID is not in the lookup.
    pub manufacturer_name: String,
    /// Cells aligned index-for-index with [ForecastMatrix::months].
    pub cells: Vec<MatrixCell>,
    /// The sum of the row's cells.
    pub total: MatrixCell,
}

/// A manufacturer-by-month pivot of a deal collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastMatrix {
    /// The distinct close months present in the deal collection, earliest
    /// first. These are the matrix's columns.
    pub months: Vec<Month>,
    /// One row per manufacturer, largest total revenue first.
    pub rows: Vec<MatrixRow>,
    /// Per-month column totals, aligned index-for-index with `months`.
    pub month_totals: Vec<MatrixCell>,
    /// The sum over the whole matrix.
    pub grand_total: MatrixCell,
}

/// Pivot deals by manufacturer and expected close month.
///
/// The deal collection must already be filtered to the deals that belong in
/// the matrix; this function does not look at status or probability except
/// through `contribution`.
pub fn manufacturer_month_matrix(
    deals: &[Deal],
    manufacturers: &HashMap<i64, String>,
    contribution: Contribution,
) -> ForecastMatrix {
    let mut month_set: HashSet<Month> = HashSet::new();
    for deal in deals {
        month_set.insert(deal.expected_close_month);
    }

    let mut months: Vec<Month> = month_set.into_iter().collect();
    months.sort();

    let month_index: HashMap<Month, usize> = months
        .iter()
        .enumerate()
        .map(|(index, month)| (*month, index))
        .collect();

    let mut cells_by_manufacturer: HashMap<i64, Vec<MatrixCell>> = HashMap::new();

    for deal in deals {
        let (revenue_usd, margin_usd) = contribution.apply(deal);
        let index = month_index[&deal.expected_close_month];

        cells_by_manufacturer
            .entry(deal.manufacturer_id)
            .or_insert_with(|| vec![MatrixCell::default(); months.len()])[index]
            .add(revenue_usd, margin_usd);
    }

    let mut rows: Vec<MatrixRow> = cells_by_manufacturer
        .into_iter()
        .map(|(manufacturer_id, cells)| {
            let mut total = MatrixCell::default();
            for cell in &cells {
                total.deal_count += cell.deal_count;
                total.revenue_usd += cell.revenue_usd;
                total.margin_usd += cell.margin_usd;
            }

            MatrixRow {
                manufacturer_id,
                manufacturer_name: manufacturers
                    .get(&manufacturer_id)
                    .cloned()
                    .unwrap_or_else(|| "Unknown".to_string()),
                cells,
                total,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total
            .revenue_usd
            .total_cmp(&a.total.revenue_usd)
            .then(a.manufacturer_id.cmp(&b.manufacturer_id))
    });

    let mut month_totals = vec![MatrixCell::default(); months.len()];
    let mut grand_total = MatrixCell::default();

    for row in &rows {
        for (index, cell) in row.cells.iter().enumerate() {
            month_totals[index].deal_count += cell.deal_count;
            month_totals[index].revenue_usd += cell.revenue_usd;
            month_totals[index].margin_usd += cell.margin_usd;
        }

        grand_total.deal_count += row.total.deal_count;
        grand_total.revenue_usd += row.total.revenue_usd;
        grand_total.margin_usd += row.total.margin_usd;
    }

    ForecastMatrix {
        months,
        rows,
        month_totals,
        grand_total,
    }
}
