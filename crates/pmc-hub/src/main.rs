use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use pmc_core::presence_contracts::PresenceResult;
use pmc_core::{Clock, SystemClock};
use pmc_historic::client::HttpTaskSource;
use pmc_historic::{HistoricCache, HistoricService};
use pmc_presence::{reconstruct, HeartbeatSources};
use serde::Deserialize;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    data_dir: PathBuf,
    task_api_url: String,
    token_env: String,
    debug: bool,
    log_dir: String,
}

#[derive(Parser, Debug)]
#[command(name = "pmc-hub")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    data_dir: String,
    #[arg(long, default_value = "")]
    task_api_url: String,
    #[arg(long, default_value = "PMC_TASK_TOKEN")]
    token_env: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
}

struct AppState {
    data_dir: PathBuf,
    historic: HistoricService<HttpTaskSource>,
    clock: SystemClock,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    let _log_guard = init_logging(&config);

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %config.addr);
        return;
    }

    let token = std::env::var(&config.token_env).unwrap_or_default();
    if token.is_empty() {
        warn!(event = "missing_task_token", env = %config.token_env);
    }

    let source = HttpTaskSource::new(config.task_api_url.clone(), token);
    let historic = HistoricService::new(source, HistoricCache::default(), Arc::new(SystemClock));
    let state = Arc::new(AppState {
        data_dir: config.data_dir.clone(),
        historic,
        clock: SystemClock,
    });

    let app = Router::new()
        .route("/api/presence", get(presence_handler))
        .route("/api/historic/:year", get(historic_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err);
            return;
        }
    };

    info!(event = "hub_start", addr = %config.addr, data_dir = %config.data_dir.display());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        error!(event = "hub_error", error = %err);
    }
}

/// Always answers: absent or unreadable heartbeat sources come back as
/// an explicit unknown/empty result, never an error status.
async fn presence_handler(State(app): State<Arc<AppState>>) -> Json<PresenceResult> {
    let sources = HeartbeatSources::load(&app.data_dir);
    Json(reconstruct(&sources, app.clock.now()))
}

#[derive(Debug, Deserialize)]
struct HistoricParams {
    #[serde(default, rename = "includeRecurring")]
    include_recurring: bool,
}

async fn historic_handler(
    State(app): State<Arc<AppState>>,
    Path(year): Path<i32>,
    Query(params): Query<HistoricParams>,
) -> Response {
    match app.historic.get_historic(year, params.include_recurring).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            error!(event = "historic_error", year, error = %err);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response()
        }
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    let addr = resolve_with_env(&args.addr, "PMC_HUB_ADDR", "127.0.0.1:8787");
    let data_dir = resolve_with_env(&args.data_dir, "PMC_DATA_DIR", ".pmc/heartbeat");
    let task_api_url = resolve_with_env(
        &args.task_api_url,
        "PMC_TASK_API_URL",
        "https://api.toodledo.com/3",
    );
    let debug = args.debug || env_true("PMC_HUB_DEBUG");
    let log_dir = resolve_log_dir(&args.log_dir);
    Config {
        addr,
        data_dir: PathBuf::from(data_dir),
        task_api_url,
        token_env: args.token_env,
        debug,
        log_dir,
    }
}

fn resolve_log_dir(log_dir_flag: &str) -> String {
    if !log_dir_flag.trim().is_empty() {
        return log_dir_flag.to_string();
    }
    if let Ok(value) = std::env::var("PMC_LOG_DIR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    ".pmc/logs".to_string()
}

fn resolve_with_env(flag: &str, env_key: &str, fallback: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value;
        }
    }
    fallback.to_string()
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => false,
    }
}

fn init_logging(config: &Config) -> Option<LogGuard> {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("PMC_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&config.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

struct MultiWriter {
    stdout: io::Stdout,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl MultiWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stdout: io::stdout(),
            file,
        }
    }
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stdout.write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stdout.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    if std::fs::create_dir_all(&dir).is_err() {
        return Ok(LogGuard { file: None });
    }
    let path = dir.join("pmc-hub.log");
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}
