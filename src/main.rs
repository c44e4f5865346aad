use api_rest::{core_config_from_env, router, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the CareScore application
///
/// Loads the configured bundle and plan catalog into an in-memory store, then serves the
/// REST API.
///
/// # Environment Variables
/// - `CARESCORE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CARESCORE_BUNDLE`: FHIR bundle JSON to preload (optional)
/// - `CARESCORE_PLAN_CATALOG`: YAML plan catalog (optional; built-in plans otherwise)
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If bootstrap, binding, or serving fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("carescore=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr =
        std::env::var("CARESCORE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(core_config_from_env());
    let store = carescore_core::bootstrap_store(&cfg)?;

    tracing::info!("++ Starting CareScore REST on {}", rest_addr);

    let rest_app = router(AppState::new(store, cfg));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, rest_app).await?;

    Ok(())
}
