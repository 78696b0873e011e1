use std::process::ExitCode;

use clap::Parser;
use icd_builder::cli::{self, Cli};
use icd_builder::config::AppConfig;
use icd_builder::errors::{ApiResponse, AppError};
use icd_builder::AppState;
use mimalloc::MiMalloc;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// M-MIMALLOC-APP: Use mimalloc as global allocator for improved performance.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "icd_builder=info".into()))
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let pretty = cli.pretty;
    let config = AppConfig::from_env().with_data_dir(cli.data_dir);
    tracing::debug!(data_dir = %config.data_dir.display(), "Configuration loaded");

    let mut app = match AppState::load(config) {
        Ok(app) => app,
        Err(err) => return fail(err, pretty),
    };

    match cli::dispatch(&mut app, cli.command) {
        Ok(data) => {
            print_envelope(&ApiResponse::success(data), pretty);
            ExitCode::SUCCESS
        }
        Err(err) => {
            if err.is_storage() {
                tracing::warn!(error = %err, "Change applied in memory but not saved");
            }
            fail(err, pretty)
        }
    }
}

fn fail(err: AppError, pretty: bool) -> ExitCode {
    let code = err.exit_code();
    print_envelope(&err.into_response(), pretty);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn print_envelope<T: Serialize>(response: &ApiResponse<T>, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(response)
    } else {
        serde_json::to_string(response)
    };
    match rendered {
        Ok(text) => println!("{text}"),
        Err(e) => {
            let fallback = AppError::Serialization(e).into_response();
            println!("{}", serde_json::json!({ "data": null, "error": fallback.error }));
        }
    }
}
