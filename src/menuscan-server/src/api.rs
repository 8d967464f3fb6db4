use actix_web::{http::StatusCode, web, HttpResponse, Result as ActixResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use menuscan_core::config::Config;
use menuscan_core::models::{InstallRequest, Restaurant, RestaurantResponse, StatusResponse};
use menuscan_core::preparer::{CollectionPreparer, InstallPlan, Installer};
use menuscan_core::query::{parse_options, Lookup, QueryParams};
use menuscan_core::store::{InstallTarget, RestaurantRepository, StoreError};

/// Shared application state
pub struct AppState {
    pub repository: Arc<dyn RestaurantRepository>,
    pub installer: Arc<dyn Installer>,
    pub config: Arc<Config>,
    install_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn RestaurantRepository>,
        installer: Arc<dyn Installer>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repository,
            installer,
            config,
            install_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serve queries from `store` and install into it with the configured preparer
    pub fn from_store<S>(store: Arc<S>, config: Config) -> Self
    where
        S: RestaurantRepository + InstallTarget,
    {
        let preparer = CollectionPreparer::from_config(Arc::clone(&store), &config.install);
        Self::new(store, Arc::new(preparer), Arc::new(config))
    }

    pub fn install_running(&self) -> bool {
        self.install_running.load(Ordering::SeqCst)
    }
}

/// Clears the install flag when the background task ends, even by panic
struct InstallSlot(Arc<AtomicBool>);

impl Drop for InstallSlot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn status(code: StatusCode, message: &str) -> StatusResponse {
    StatusResponse {
        code: code.as_u16(),
        title: code.canonical_reason().unwrap_or_default().to_string(),
        message: message.to_string(),
    }
}

/// Health check
/// GET /ping
pub async fn ping() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(status(StatusCode::OK, "pong!")))
}

/// Trigger a collection install in the background
/// POST /run-install
#[tracing::instrument(skip(body, state))]
pub async fn run_install(body: web::Bytes, state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let req: InstallRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return Ok(HttpResponse::BadRequest().body(e.to_string())),
    };

    let plan = match InstallPlan::from_request(&req, &state.config.install) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::debug!("Rejected install request: {}", e);
            return Ok(HttpResponse::BadRequest().body(e.to_string()));
        }
    };

    if state
        .install_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(HttpResponse::Conflict().body("An installation is already running"));
    }

    tracing::info!("Starting {} installation...", plan.mode);

    let installer = Arc::clone(&state.installer);
    let slot = InstallSlot(Arc::clone(&state.install_running));
    actix_web::rt::spawn(async move {
        let _slot = slot;
        match installer.install(plan).await {
            Ok(outcome) if outcome.success => {
                tracing::info!(
                    inserted = outcome.inserted,
                    regenerated = outcome.regenerated,
                    elapsed_ms = outcome.elapsed_ms,
                    "Installation complete"
                );
            }
            Ok(outcome) => {
                tracing::warn!(?outcome, "Installation did not complete, nothing was committed");
            }
            Err(e) => abort_install(&e),
        }
    });

    Ok(HttpResponse::Accepted().json(status(StatusCode::ACCEPTED, "Starting installation...")))
}

/// Driver-level failures while preparing data leave nothing sensible to serve
fn abort_install(e: &StoreError) -> ! {
    tracing::error!("Installation failed: {}", e);
    std::process::exit(1)
}

fn respond(result: Result<Vec<Restaurant>, StoreError>) -> HttpResponse {
    match result {
        Ok(restaurants) => HttpResponse::Ok().json(RestaurantResponse::from_results(restaurants)),
        Err(e) => {
            tracing::error!("Query failed: {}", e);
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

/// Conventional filter query
async fn scan(
    state: &AppState,
    query: &HashMap<String, String>,
    lookup: Lookup,
) -> Result<Vec<Restaurant>, StoreError> {
    let params = QueryParams::from_map(query);
    let options = parse_options(query).with_limit(lookup.limit(state.config.search.result_limit));
    let filter = params.to_filter();
    tracing::debug!(?filter, endpoint = lookup.endpoint(), "Scan query");

    match lookup {
        Lookup::One => Ok(state
            .repository
            .find_one(filter, &options)
            .await?
            .into_iter()
            .collect()),
        Lookup::Many | Lookup::All => state.repository.find_many(filter, &options).await,
    }
}

/// Managed search query
async fn search(
    state: &AppState,
    query: &HashMap<String, String>,
    lookup: Lookup,
) -> Result<Vec<Restaurant>, StoreError> {
    let params = QueryParams::from_map(query);
    let options = parse_options(query).with_limit(lookup.limit(state.config.search.result_limit));
    let index = options.search_index_or(&state.config.search.default_index);
    let pipeline = params.to_search_pipeline(index, options.limit);
    tracing::debug!(?pipeline, endpoint = lookup.endpoint(), "Search query");

    state.repository.aggregate(pipeline, &options).await
}

/// GET /scan/get-restaurant
#[tracing::instrument(skip(query, state))]
pub async fn scan_restaurant(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(respond(scan(&state, &query, Lookup::One).await))
}

/// GET /scan/get-restaurants
#[tracing::instrument(skip(query, state))]
pub async fn scan_restaurants(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(respond(scan(&state, &query, Lookup::Many).await))
}

/// GET /scan/get-all-restaurants
#[tracing::instrument(skip(query, state))]
pub async fn scan_all_restaurants(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(respond(scan(&state, &query, Lookup::All).await))
}

/// GET /atlas-search/get-restaurant
#[tracing::instrument(skip(query, state))]
pub async fn search_restaurant(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(respond(search(&state, &query, Lookup::One).await))
}

/// GET /atlas-search/get-restaurants
#[tracing::instrument(skip(query, state))]
pub async fn search_restaurants(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(respond(search(&state, &query, Lookup::Many).await))
}

/// GET /atlas-search/get-all-restaurants
#[tracing::instrument(skip(query, state))]
pub async fn search_all_restaurants(
    query: web::Query<HashMap<String, String>>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    Ok(respond(search(&state, &query, Lookup::All).await))
}

/// Configure routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/ping", web::get().to(ping))
        .route("/run-install", web::post().to(run_install))
        .service(
            web::scope("/scan")
                .route("/get-restaurant", web::get().to(scan_restaurant))
                .route("/get-restaurants", web::get().to(scan_restaurants))
                .route("/get-all-restaurants", web::get().to(scan_all_restaurants)),
        )
        .service(
            web::scope("/atlas-search")
                .route("/get-restaurant", web::get().to(search_restaurant))
                .route("/get-restaurants", web::get().to(search_restaurants))
                .route("/get-all-restaurants", web::get().to(search_all_restaurants)),
        );
}
