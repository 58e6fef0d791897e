mod adapters;
mod config;
mod endpoints;
mod error;
mod logging;
mod models;
mod service;
mod store;
mod transport;
mod ui;
mod views;

use adapters::{CopyOutcome, FileDownloader, SystemClipboard};
use clap::{Parser, Subcommand};
use config::{
    ensure_initialized, load_settings, logs_dir, prepare_env_artifact, write_env_artifact,
    AppSettings, ConfigResolver, KEY_API_SERVER, KEY_BASE_URL, KEY_SHOW_GITHUB_ICON,
    RECOGNIZED_KEYS,
};
use endpoints::EndpointMap;
use error::{AppError, Severity};
use models::Snapshot;
use service::{QueryEngine, StageToggles};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use store::SnapshotStore;
use transport::HttpTransport;
use ui::app::AppState;
use ui::run::{run_tui, TuiContext};
use views::{build_table, copy_summary, export_csv, summary_text, TableQuery};

#[derive(Debug, Parser)]
#[command(name = "token-meter")]
#[command(about = "Query API token balance and call logs across relay endpoints")]
struct Cli {
    /// Mirror warnings to stderr (ignored by the TUI).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    /// Write the runtime override artifact from a dotenv file.
    EnvPrepare {
        #[arg(long, default_value = ".env")]
        env_file: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print every recognized key with its resolved value.
    Config,
    Endpoints,
    Query {
        #[arg(long, env = "TOKEN_METER_TOKEN", hide_env_values = true, default_value = "")]
        token: String,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
        #[arg(long)]
        copy: bool,
        #[arg(long)]
        export: bool,
    },
    Tui,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_format(input: &str) -> Result<OutputFormat, AppError> {
    if input.eq_ignore_ascii_case("text") {
        Ok(OutputFormat::Text)
    } else if input.eq_ignore_ascii_case("json") {
        Ok(OutputFormat::Json)
    } else {
        Err(AppError::Config(
            "Unsupported output format. Use text or json.".into(),
        ))
    }
}

/// Everything a command needs from the configuration layers.
struct Resolved {
    settings: AppSettings,
    resolver: ConfigResolver,
    endpoints: EndpointMap,
}

fn resolve_all() -> Result<Resolved, AppError> {
    let settings = load_settings()?;
    let resolver = ConfigResolver::from_environment(&settings.env_config_path()?);
    let endpoints = EndpointMap::parse(&resolver.resolve(KEY_BASE_URL));
    Ok(Resolved {
        settings,
        resolver,
        endpoints,
    })
}

fn build_engine(resolved: &Resolved) -> Result<QueryEngine, AppError> {
    Ok(QueryEngine::new(
        Arc::new(HttpTransport::new(&resolved.settings)?),
        StageToggles::from_resolver(&resolved.resolver),
        Arc::new(SnapshotStore::new()),
    ))
}

fn render_log_lines(snapshot: &Snapshot, per_unit: f64) -> Vec<String> {
    let query = TableQuery {
        page_size: snapshot.logs.len().max(1),
        ..TableQuery::default()
    };
    let page = build_table(&snapshot.logs, &query, per_unit);

    let mut lines = vec![format!("{} items total", page.total)];
    for row in page.rows {
        let cells = [
            row.time,
            row.token_name,
            row.model,
            row.use_time.unwrap_or_default(),
            row.prompt_tokens.unwrap_or_default(),
            row.completion_tokens.unwrap_or_default(),
            row.cost.unwrap_or_default(),
            row.detail,
        ];
        lines.push(cells.join("\t"));
    }
    lines
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized token-meter config and data directories.");
        }
        Commands::EnvPrepare { env_file, out } => {
            ensure_initialized()?;
            let out = match out {
                Some(path) => path,
                None => load_settings()?.env_config_path()?,
            };
            let artifact = prepare_env_artifact(&env_file)?;
            write_env_artifact(&artifact, &out)?;
            tracing::info!(env_file = %env_file.display(), out = %out.display(), "env artifact written");
            println!("Wrote runtime overrides to {}", out.display());
        }
        Commands::Config => {
            let resolved = resolve_all()?;
            for key in RECOGNIZED_KEYS {
                println!("{}={}", key, resolved.resolver.resolve(key));
            }
        }
        Commands::Endpoints => {
            let resolved = resolve_all()?;
            if resolved.endpoints.is_empty() {
                println!("No endpoints configured. Set BASE_URL to a JSON object of label to URL.");
            }
            let default = resolved.endpoints.default_label();
            for (label, url) in resolved.endpoints.iter() {
                let marker = if Some(label) == default { "*" } else { " " };
                println!("{marker} {label}\t{url}");
            }
        }
        Commands::Query {
            token,
            endpoint,
            format,
            copy,
            export,
        } => {
            let format = parse_format(&format)?;
            let resolved = resolve_all()?;
            let label = endpoint
                .or_else(|| resolved.endpoints.default_label().map(str::to_string))
                .unwrap_or_default();
            let base_url = resolved
                .endpoints
                .resolve_base_url(&label, &resolved.resolver.resolve(KEY_API_SERVER));

            let engine = build_engine(&resolved)?;
            let snapshot = engine.query(&label, &base_url, &token).await?;
            let per_unit = resolved.settings.quota_per_unit;
            let toggles = engine.toggles();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                OutputFormat::Text => {
                    if toggles.balance {
                        println!("{}", summary_text(&snapshot, per_unit));
                    }
                    if toggles.detail {
                        if toggles.balance {
                            println!();
                        }
                        for line in render_log_lines(&snapshot, per_unit) {
                            println!("{line}");
                        }
                    }
                }
            }

            if copy {
                match copy_summary(&snapshot, per_unit, &SystemClipboard::default()) {
                    None => eprintln!("Nothing to copy: the token was not validated."),
                    Some(CopyOutcome::Copied) => eprintln!("Copied token info to clipboard."),
                    Some(CopyOutcome::Manual(text)) => {
                        eprintln!("Clipboard unavailable, copy the text below manually:\n{text}")
                    }
                }
            }

            if export {
                let downloader = FileDownloader::new(resolved.settings.export_dir()?);
                let path = export_csv(
                    &snapshot.logs,
                    &downloader,
                    &resolved.settings.export_filename,
                )?;
                eprintln!("Exported {} rows to {}", snapshot.logs.len(), path.display());
            }
        }
        Commands::Tui => {
            ensure_initialized()?;
            let resolved = resolve_all()?;
            let engine = Arc::new(build_engine(&resolved)?);
            let state = AppState::new(
                resolved.endpoints.clone(),
                engine.toggles(),
                resolved.resolver.toggle(KEY_SHOW_GITHUB_ICON),
            );
            let ctx = TuiContext {
                engine,
                api_server: resolved.resolver.resolve(KEY_API_SERVER),
                downloader: Box::new(FileDownloader::new(resolved.settings.export_dir()?)),
                clipboard: Box::new(SystemClipboard::default()),
                settings: resolved.settings,
            };
            run_tui(ctx, state).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let console = cli.verbose && !matches!(cli.command, Commands::Tui);
    let _log_guard = match logs_dir() {
        Ok(dir) => logging::init_logging(&dir, console).ok(),
        Err(_) => None,
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let prefix = match &e {
                AppError::Query(q) if q.severity() == Severity::Warning => "warning",
                _ => "error",
            };
            tracing::error!(error = %e, "command failed");
            eprintln!("{prefix}: {e}");
            ExitCode::FAILURE
        }
    }
}
