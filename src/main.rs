use log::{error, info};
use service::{config::Config, logging::Logger};
use web::AppState;

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to initialize logger: {e}");
    }

    let missing = config.missing_settings();
    if !missing.is_empty() {
        error!("Missing required settings: {}", missing.join(", "));
        std::process::exit(1);
    }

    info!("Starting token broker [{}]...", config.runtime_env());

    let app_state = match AppState::from_config(config) {
        Ok(app_state) => app_state,
        Err(e) => {
            error!("Failed to build the provider client: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = web::init_server(app_state).await {
        error!("Server stopped: {e}");
        std::process::exit(1);
    }
}
