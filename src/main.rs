use log::error;
use std::process::ExitCode;
use std::sync::Arc;
use timetable_service::config::Config;
use timetable_service::server;
use timetable_service::service::TimetableService;
use timetable_service::store::TimetableStore;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let seed = match config.load_seed() {
        Ok(seed) => seed,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match &config.data_file {
        Some(path) => TimetableStore::open(path, seed),
        None => TimetableStore::in_memory(seed),
    };
    let store = match store {
        Ok(store) => store,
        Err(e) => {
            error!("Could not open the timetable database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = Arc::new(TimetableService::new(store, config.max_recommended_load));

    if let Err(e) = server::run_server(config.addr, service).await {
        error!("Server stopped: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
