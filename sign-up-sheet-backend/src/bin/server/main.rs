use sign_up_sheet_backend::error::AppError;
use sign_up_sheet_backend::run_server;
use sign_up_sheet_backend::telemetry::setup_telemetry;
use sign_up_sheet_config::get_config;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = get_config()?;
    setup_telemetry(&config.log_filter)?;
    tracing::debug!(?config, "loaded config");

    run_server(&config).await?.await
}
