use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vendra_billing::config::Config;
use vendra_billing::records::{DirectusGateway, RecordGateway};
use vendra_billing::routes::webhook::{root, webhook};
use vendra_billing::services::stripe::{LiveStripeService, StripeService};
use vendra_billing::AppState;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let config = Arc::new(Config::from_env());
    let http_client = Client::new();

    let records = Arc::new(DirectusGateway::new(http_client.clone(), &config.directus))
        as Arc<dyn RecordGateway>;
    let stripe =
        Arc::new(LiveStripeService::new(http_client, &config.stripe)) as Arc<dyn StripeService>;

    let state = AppState {
        records,
        stripe,
        config: config.clone(),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/webhook", post(webhook))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await.unwrap();
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await.unwrap();
}
