//! `dailydone`: errand lists and actions from the terminal.
//!
//! Prints a page of errands once or keeps polling with `--watch`, and runs
//! the accept/cancel/complete/rate actions. Configuration via CLI flags,
//! environment variables, or config file
//! (`~/.config/dailydone/config.toml`).
//!
//! ```bash
//! dailydone --token "$TOKEN" list --category pet-care --page 2
//! DAILYDONE_TOKEN=... dailydone list --source helper --watch
//! dailydone accept 65f1c0ffee
//! dailydone rate U42 5
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dailydone_proto::normalize::find_raw_record;
use dailydone_proto::task::{Profile, Task, TaskId, TaskStatus};
use tracing_appender::non_blocking::WorkerGuard;

use dailydone::actions::{ActionCoordinator, ActionError, ActionOutcome, CompletionTarget};
use dailydone::config::{CliArgs, ClientConfig, Command, ListArgs, ListKind};
use dailydone::http::client::HttpClient;
use dailydone::http::{ApiClient, HttpError, StaticToken};
use dailydone::sync::{FilterScope, PollHealth, SyncSession, VisiblePage};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::from_cli(&cli)
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(base_url = %config.base_url, "dailydone starting");

    let tokens = Arc::new(config.token.clone().map_or_else(StaticToken::none, StaticToken::new));
    let api = match HttpClient::new(&config.base_url, tokens) {
        Ok(client) => Arc::new(client.with_timeout(config.request_timeout)),
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let command = cli.command.clone().unwrap_or_else(|| {
        Command::List(ListArgs {
            page: 1,
            ..ListArgs::default()
        })
    });
    let result = match command {
        Command::List(args) => run_list(api, &config, &args).await,
        Command::Accept { id } => {
            let coordinator = ActionCoordinator::with_endpoints(api, config.actions.clone());
            report(coordinator.accept(&TaskId::new(id)).await)
        }
        Command::Cancel { id } => {
            let coordinator = ActionCoordinator::with_endpoints(api, config.actions.clone());
            report(coordinator.cancel(&TaskId::new(id)).await)
        }
        Command::Complete { id, poster } => run_complete(api, &config, id, poster).await,
        Command::Rate { user_id, value } => {
            let coordinator = ActionCoordinator::with_endpoints(api, config.actions.clone());
            report(coordinator.rate(&user_id, value).await)
        }
    };

    tracing::info!("dailydone exiting");
    result
}

/// Initialize file-based logging.
///
/// Logs go to a file so stdout stays clean for program output. Returns a
/// [`WorkerGuard`] that must be held until shutdown to flush buffered
/// entries.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("dailydone.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Fetches a list and prints the requested page; with `--watch`, keeps
/// polling and reprints after every poll interval until Ctrl-C.
async fn run_list(api: Arc<HttpClient>, config: &ClientConfig, args: &ListArgs) -> ExitCode {
    let scope = match filter_scope(config, args) {
        Ok(scope) => scope,
        Err(message) => {
            eprintln!("error: {message}");
            return ExitCode::FAILURE;
        }
    };

    let label = format!("{:?}", args.source).to_lowercase();
    let session = SyncSession::start(label, api, config.list_source(args.source), config.sync);

    if let Err(e) = session.refresh().await {
        tracing::warn!(err = %e, "initial fetch failed");
        eprintln!("{}", sync_message(&e));
        if !args.watch {
            return ExitCode::FAILURE;
        }
    }
    print_page(&session.visible_page(&scope), config, args.json);
    if !args.watch {
        session.stop();
        return ExitCode::SUCCESS;
    }

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let health = session
        .watch(shutdown, |s| print_page(&s.visible_page(&scope), config, args.json))
        .await;
    let snapshot = session.snapshot();
    session.stop();
    if health == PollHealth::Halted {
        if let Some(err) = &snapshot.last_error {
            eprintln!("{}", err.user_message());
        }
        eprintln!(
            "Stopped refreshing after {} failed attempts.",
            snapshot.consecutive_failures
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn filter_scope(config: &ClientConfig, args: &ListArgs) -> Result<FilterScope, String> {
    let mut scope = FilterScope::new()
        .with_page(args.page)
        .with_page_size(args.page_size.unwrap_or(config.page_size))
        .with_sort(args.sort);
    if let Some(status) = &args.status {
        let status = TaskStatus::from_alias(status)
            .ok_or_else(|| format!("unknown status {status:?}"))?;
        scope = scope.with_status(status);
    }
    if let Some(category) = &args.category {
        scope = scope.with_category(category.as_str());
    }
    if let Some(search) = &args.search {
        scope = scope.with_search(search.as_str());
    }
    Ok(scope)
}

fn print_page(page: &VisiblePage, config: &ClientConfig, json: bool) {
    if json {
        match serde_json::to_string_pretty(page) {
            Ok(text) => println!("{text}"),
            Err(e) => eprintln!("error: {e}"),
        }
        return;
    }

    if page.items.is_empty() {
        println!("No errands match.");
        return;
    }
    for task in &page.items {
        let posted = task
            .created_at
            .map(|t| t.format(&config.timestamp_format).to_string())
            .unwrap_or_default();
        println!(
            "{:<26} {:<10} {:>9.2}  {:<16} {:<17} {}",
            task.id.as_str(),
            task.status.as_str(),
            task.price,
            task.category.name,
            posted,
            task.description
        );
    }
    if page.page_corrected {
        println!("(showing the last page)");
    }
    println!(
        "page {}/{} - {} errands",
        page.page, page.total_pages, page.total_matches
    );
}

/// Completes an errand. Without `--poster`, the poster id is looked up in
/// the raw poster list.
async fn run_complete(
    api: Arc<HttpClient>,
    config: &ClientConfig,
    id: String,
    poster: Option<String>,
) -> ExitCode {
    let view = Task {
        id: TaskId::new(id),
        poster: Profile {
            id: poster,
            ..Profile::default()
        },
        ..Task::default()
    };

    let raw = if view.poster.id.is_none() {
        match fetch_poster_record(api.as_ref(), config, &view.id).await {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!("{}", e.user_message());
                return ExitCode::FAILURE;
            }
        }
    } else {
        None
    };

    let mut target = CompletionTarget::from_view(&view);
    if let Some(raw) = &raw {
        target = target.with_raw(raw);
    }
    let coordinator = ActionCoordinator::with_endpoints(api, config.actions.clone());
    report(coordinator.complete(target).await)
}

async fn fetch_poster_record(
    api: &HttpClient,
    config: &ClientConfig,
    id: &TaskId,
) -> Result<Option<serde_json::Value>, HttpError> {
    let source = config.list_source(ListKind::Poster);
    let body = api
        .request(&source.path, source.request_options())
        .await?
        .into_json();
    Ok(find_raw_record(&body, id).cloned())
}

fn report(result: Result<ActionOutcome, ActionError>) -> ExitCode {
    match result {
        Ok(outcome) => {
            println!("{} ok", outcome.kind);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::warn!(err = %e, "action failed");
            eprintln!("{}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

fn sync_message(err: &dailydone::sync::SyncError) -> String {
    match err {
        dailydone::sync::SyncError::Http(e) => e.user_message(),
        other => other.to_string(),
    }
}
