use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{Request, Uri},
    middleware::Next,
    response::Response,
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::trace::TraceLayer;

use db_service::DbService;
use shared_lib::call_structs::CallCategory;
use shared_lib::utils;

pub mod route_handlers;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbService>,
}

struct RequestUri(Uri);

/**
 * main router for the app: liveness routes, one static route per call category
 * and the parametrized webhook route
 **/
pub fn get_main_router(state: AppState) -> Router {
    tracing::debug!("initializing router(s) ...");

    let mut router = Router::new()
        .route("/", get(route_handlers::home::handler))
        .route("/healthcheck", get(|| async { "Ok" }))
        .route(
            "/webhook/:category",
            post(route_handlers::webhooks::category_handler),
        );

    for category in CallCategory::ALL {
        router = router.route(&format!("/{}", category.as_str()), category_route(category));
    }

    router.with_state(state)
}

fn category_route(category: CallCategory) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, body: Bytes| async move {
        route_handlers::webhooks::handler(state, category, body).await
    })
}

/**
 * main router wrapped in request logging, this is what gets served
 **/
pub fn build_app(state: AppState) -> Router {
    get_main_router(state)
        .layer(axum::middleware::from_fn(
            |request: Request<_>, next: Next<_>| async move {
                let uri = request.uri().clone();

                let mut response = next.run(request).await;

                response.extensions_mut().insert(RequestUri(uri));

                response
            },
        ))
        .layer(TraceLayer::new_for_http().on_response(
            |response: &Response, latency: std::time::Duration, _span: &tracing::Span| {
                let url = match response.extensions().get::<RequestUri>().map(|r| &r.0) {
                    Some(uri) => uri.to_string(),
                    None => "unknown".to_string(),
                };
                let status = response.status();
                let latency = utils::duration_to_ms_string(latency);

                if url == "/healthcheck" {
                    tracing::trace!("{} {} {}", url, status, latency);
                    return;
                }

                tracing::debug!("{} {} {}", url, status, latency);
            },
        ))
}
