//! Application router configuration.

use axum::{
    Router,
    response::Redirect,
    routing::{delete, get, post, put},
};
use tower_http::services::ServeDir;

use crate::{
    AppState,
    bdm::{create_bdm_endpoint, delete_bdm_endpoint},
    dashboard::get_dashboard_page,
    deal::{
        create_deal_endpoint, delete_deal_endpoint, get_deals_page, get_edit_deal_page,
        get_new_deal_page, update_deal_endpoint,
    },
    directory::get_directory_page,
    endpoints,
    export::{
        get_committed_csv, get_deals_csv, get_exports_page, get_forecast_csv,
        get_monthly_forecast_csv, get_pipeline_by_manufacturer_csv, get_pipeline_by_reseller_csv,
    },
    manufacturer::{create_manufacturer_endpoint, delete_manufacturer_endpoint},
    not_found::get_404_not_found,
    reseller::{create_reseller_endpoint, delete_reseller_endpoint},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let page_routes = Router::new()
        .route(endpoints::ROOT, get(get_index_page))
        .route(endpoints::DASHBOARD_VIEW, get(get_dashboard_page))
        .route(endpoints::DEALS_VIEW, get(get_deals_page))
        .route(endpoints::NEW_DEAL_VIEW, get(get_new_deal_page))
        .route(endpoints::EDIT_DEAL_VIEW, get(get_edit_deal_page))
        .route(endpoints::DIRECTORY_VIEW, get(get_directory_page))
        .route(endpoints::EXPORTS_VIEW, get(get_exports_page))
        .route(endpoints::EXPORT_FORECAST_CSV, get(get_forecast_csv))
        .route(endpoints::EXPORT_COMMITTED_CSV, get(get_committed_csv))
        .route(endpoints::EXPORT_DEALS_CSV, get(get_deals_csv))
        .route(
            endpoints::EXPORT_PIPELINE_BY_MANUFACTURER_CSV,
            get(get_pipeline_by_manufacturer_csv),
        )
        .route(
            endpoints::EXPORT_PIPELINE_BY_RESELLER_CSV,
            get(get_pipeline_by_reseller_csv),
        )
        .route(
            endpoints::EXPORT_MONTHLY_FORECAST_CSV,
            get(get_monthly_forecast_csv),
        );

    let api_routes = Router::new()
        .route(endpoints::POST_DEAL, post(create_deal_endpoint))
        // PUT_DEAL and DELETE_DEAL share a path, so they must be registered
        // together.
        .route(
            endpoints::PUT_DEAL,
            put(update_deal_endpoint).delete(delete_deal_endpoint),
        )
        .route(endpoints::POST_MANUFACTURER, post(create_manufacturer_endpoint))
        .route(
            endpoints::DELETE_MANUFACTURER,
            delete(delete_manufacturer_endpoint),
        )
        .route(endpoints::POST_RESELLER, post(create_reseller_endpoint))
        .route(endpoints::DELETE_RESELLER, delete(delete_reseller_endpoint))
        .route(endpoints::POST_BDM, post(create_bdm_endpoint))
        .route(endpoints::DELETE_BDM, delete(delete_bdm_endpoint));

    page_routes
        .merge(api_routes)
        .nest_service(endpoints::STATIC, ServeDir::new("static/"))
        .fallback(get_404_not_found)
        .with_state(state)
}

/// The root path '/' redirects to the dashboard page.
async fn get_index_page() -> Redirect {
    Redirect::to(endpoints::DASHBOARD_VIEW)
}

#[cfg(test)]
mod root_route_tests {
    use axum::{http::StatusCode, response::IntoResponse};

    use crate::{endpoints, routing::get_index_page};

    #[tokio::test]
    async fn root_redirects_to_dashboard() {
        let response = get_index_page().await.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = response.headers().get("location").unwrap();
        assert_eq!(location, endpoints::DASHBOARD_VIEW);
    }
}
