use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    get, middleware, web::Data, App, HttpRequest, HttpResponse, HttpServer, Responder,
};
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use tracing::*;

pub use alert_management::{self, telemetry, State};
use alert_management::management::ownership::{
    DEFAULT_OWNER_LABEL_KEY, DEFAULT_OWNER_LABEL_VALUE, DEFAULT_RULE_GROUP_NAME,
};
use alert_management::management::{ManagementConfig, OwnershipConfig};
use alert_management::resources::{AlertRelabelConfig, PrometheusRule};
use alert_management::store::KubeStore;

#[derive(Debug, clap::Parser)]
struct Arguments {
    #[arg(long = "bind-address", env = "BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    bind_address: String,

    /// Label key marking documents written by this service.
    #[arg(long = "owner-label-key", env = "OWNER_LABEL_KEY", default_value = DEFAULT_OWNER_LABEL_KEY)]
    owner_label_key: String,

    #[arg(long = "owner-label-value", env = "OWNER_LABEL_VALUE", default_value = DEFAULT_OWNER_LABEL_VALUE)]
    owner_label_value: String,

    /// Name of the rule group this service owns inside each PrometheusRule.
    #[arg(long = "rule-group-name", env = "RULE_GROUP_NAME", default_value = DEFAULT_RULE_GROUP_NAME)]
    rule_group_name: String,

    /// Upper bound for a single call to the Kubernetes API; 0 disables it.
    #[arg(
        long = "request-timeout-seconds",
        env = "REQUEST_TIMEOUT_SECONDS",
        default_value_t = 30
    )]
    request_timeout_seconds: u64,

    #[arg(
        long = "max-conflict-retries",
        env = "MAX_CONFLICT_RETRIES",
        default_value_t = 3
    )]
    max_conflict_retries: u32,

    #[command(flatten)]
    log: telemetry::LogOptions,
}

impl Arguments {
    fn management_config(&self) -> ManagementConfig {
        ManagementConfig {
            ownership: OwnershipConfig {
                label_key: self.owner_label_key.clone(),
                label_value: self.owner_label_value.clone(),
                rule_group_name: self.rule_group_name.clone(),
            },
            request_timeout: (self.request_timeout_seconds > 0)
                .then(|| Duration::from_secs(self.request_timeout_seconds)),
            max_conflict_retries: self.max_conflict_retries,
        }
    }
}

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().body(buffer),
        Err(err) => {
            error!(error = %err, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Arguments = Arguments::parse();
    telemetry::init(&args.log)?;

    let config = args.management_config();
    info!(
        owner_label = %format!("{}={}", config.ownership.label_key, config.ownership.label_value),
        rule_group = %config.ownership.rule_group_name,
        "Starting alert management"
    );

    let client = kube::Client::try_default().await?;
    let store = Arc::new(KubeStore::new(client));

    // Shared between the management API and the diagnostics endpoints
    let state = State::new(config);
    let controller = state.to_controller(
        store.clone() as Arc<dyn alert_management::store::DocumentStore<PrometheusRule>>,
        store as Arc<dyn alert_management::store::DocumentStore<AlertRelabelConfig>>,
    )?;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .app_data(Data::from(controller.clone()))
            .wrap(middleware::Logger::default().exclude("/health"))
            .service(index)
            .service(health)
            .service(metrics)
            .configure(alert_management::httpserver::configure)
    })
    .bind(&args.bind_address)?
    .shutdown_timeout(5)
    .run();

    server.await?;
    Ok(())
}
