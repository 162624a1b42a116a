//! The API endpoints URIs.
//!
//! For endpoints that take a parameter, e.g., '/deals/{deal_id}/edit', use [format_endpoint].

/// The root route which redirects to the dashboard.
pub const ROOT: &str = "/";
/// The landing page with the forecast overview.
pub const DASHBOARD_VIEW: &str = "/dashboard";
/// The page for displaying all deals.
pub const DEALS_VIEW: &str = "/deals";
/// The page for creating a new deal.
pub const NEW_DEAL_VIEW: &str = "/deals/new";
/// The page for editing an existing deal.
pub const EDIT_DEAL_VIEW: &str = "/deals/{deal_id}/edit";
/// The page for managing manufacturers, resellers, and BDMs.
pub const DIRECTORY_VIEW: &str = "/directory";
/// The page listing the available CSV exports.
pub const EXPORTS_VIEW: &str = "/exports";
/// The route for static files.
pub const STATIC: &str = "/static";

/// The route to download the weighted forecast matrix as CSV.
pub const EXPORT_FORECAST_CSV: &str = "/exports/forecast.csv";
/// The route to download the committed (full-value) forecast matrix as CSV.
pub const EXPORT_COMMITTED_CSV: &str = "/exports/committed.csv";
/// The route to download the full historical deal list as CSV.
pub const EXPORT_DEALS_CSV: &str = "/exports/deals.csv";
/// The route to download the per-manufacturer pipeline summary as CSV.
pub const EXPORT_PIPELINE_BY_MANUFACTURER_CSV: &str = "/exports/pipeline-by-manufacturer.csv";
/// The route to download the per-reseller pipeline summary as CSV.
pub const EXPORT_PIPELINE_BY_RESELLER_CSV: &str = "/exports/pipeline-by-reseller.csv";
/// The route to download the monthly forecast summary as CSV.
pub const EXPORT_MONTHLY_FORECAST_CSV: &str = "/exports/monthly-forecast.csv";

/// The route to create a deal.
pub const POST_DEAL: &str = "/api/deals";
/// The route to update a deal.
pub const PUT_DEAL: &str = "/api/deals/{deal_id}";
/// The route to delete a deal.
pub const DELETE_DEAL: &str = "/api/deals/{deal_id}";
/// The route to create a manufacturer.
pub const POST_MANUFACTURER: &str = "/api/manufacturers";
/// The route to delete a manufacturer.
pub const DELETE_MANUFACTURER: &str = "/api/manufacturers/{manufacturer_id}";
/// The route to create a reseller.
pub const POST_RESELLER: &str = "/api/resellers";
/// The route to delete a reseller.
pub const DELETE_RESELLER: &str = "/api/resellers/{reseller_id}";
/// The route to create a BDM.
pub const POST_BDM: &str = "/api/bdms";
/// The route to delete a BDM.
pub const DELETE_BDM: &str = "/api/bdms/{bdm_id}";

/// Replace the parameter in `endpoint_path` with `id`.
///
/// A parameter is a string that starts with a left brace, followed by
/// lowercase letters or underscores, and ends with a right brace.
/// For example, in the endpoint path '/deals/{deal_id}/edit', '{deal_id}'
/// is the parameter.
///
/// This function assumes that an endpoint path only contains ASCII characters
/// and a single parameter.
///
/// If no parameter is found in `endpoint_path`, the function returns the
/// the original `endpoint_path`.
pub fn format_endpoint(endpoint_path: &str, id: i64) -> String {
    let mut param_start = None;
    let mut param_end = None;

    for (i, c) in endpoint_path.chars().enumerate() {
        if c == '{' {
            param_start = Some(i);
        } else if param_start.is_some() && c == '}' {
            param_end = Some(i + 1);
            break;
        }
    }

    let param_start = match param_start {
        Some(start) => start,
        None => return endpoint_path.to_string(),
    };

    let param_end = param_end.unwrap_or(endpoint_path.len());

    format!(
        "{}{}{}",
        &endpoint_path[..param_start],
        id,
        &endpoint_path[param_end..]
    )
}
