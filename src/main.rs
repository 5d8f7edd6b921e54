mod cli;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

use cli::{Cli, Commands, ConfigAction};
use taskmate::config::{Config, InsightBackend};
use taskmate::insight::{InsightPanel, InsightState};
use taskmate::llm::{InsightRequester, OllamaInsight, StubInsight};
use taskmate::models::{parse_due_input, Severity, Task, TaskId};
use taskmate::notify::NotificationQueue;
use taskmate::retry::RetryPolicy;
use taskmate::ui::{run_tui, App};
use taskmate::{HttpTaskApi, TaskStore};

type Insight = InsightPanel<Box<dyn InsightRequester>>;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_path);

    // These never touch the task service
    match &cli.command {
        Some(Commands::Config { action }) => return run_config(action, &config_path),
        Some(Commands::Completions { shell }) => return print_completions(shell),
        _ => {}
    }

    let mut config = Config::load_from(&config_path)?;
    config.apply_env();
    if let Some(api_url) = &cli.api_url {
        config.set("api_url", api_url)?;
    }
    let _log_guard = init_logging(&config.log_level);
    log::info!("Using task service at {}", config.api_url);

    let rt = tokio::runtime::Runtime::new()?;
    let notifications = Arc::new(NotificationQueue::new(config.notification_duration()));
    let api = HttpTaskApi::new(&config.api_url, config.request_timeout())
        .with_context(|| format!("Invalid API url '{}'", config.api_url))?;
    let store = Arc::new(TaskStore::new(api, RetryPolicy::default(), notifications.clone()));
    let insight: Arc<Insight> = Arc::new(InsightPanel::new(build_insight(&config), notifications));

    match cli.command {
        None | Some(Commands::Tui) => {
            let mut app = App::new(store, insight, rt.handle().clone());
            run_tui(&mut app)
        }
        Some(command) => rt.block_on(run_command(command, &store, &insight)),
    }
}

fn build_insight(config: &Config) -> Box<dyn InsightRequester> {
    match config.insight_backend {
        InsightBackend::Stub => Box::new(StubInsight::default()),
        InsightBackend::Ollama => Box::new(OllamaInsight::new(
            config.ollama_base_url.clone(),
            config.ollama_model.clone(),
        )),
    }
}

async fn run_command(command: Commands, store: &TaskStore<HttpTaskApi>, insight: &Insight) -> Result<()> {
    let outcome = match command {
        Commands::List => {
            let outcome = store.list_tasks().await;
            if outcome.is_ok() {
                print_tasks(&store.tasks(), store.pending_count());
            }
            outcome
        }
        Commands::Add { title, priority, due } => {
            let due_date = match due.as_deref() {
                Some(raw) => match parse_due_input(raw) {
                    Some(parsed) => Some(parsed),
                    None => bail!("Invalid due date '{}'. Use YYYY-MM-DDTHH:MM.", raw),
                },
                None => None,
            };
            store.add_task(&title, priority.into(), due_date).await
        }
        Commands::Toggle { id } => {
            let task = find_task(store, TaskId(id)).await?;
            let outcome = store.toggle_completed(&task).await;
            if let (Ok(()), Some(updated)) = (&outcome, store.task(task.id)) {
                let state = if updated.completed { "completed" } else { "pending" };
                println!("Task {} is now {}", updated.id, state);
            }
            outcome
        }
        Commands::Delete { id } => store.delete_task(TaskId(id)).await,
        Commands::Rename { id, title } => store.rename_task(TaskId(id), &title).await,
        Commands::Insight => {
            load_tasks(store).await?;
            let state = insight.generate(&store.tasks()).await;
            if let InsightState::Ready(text) = &state {
                println!("{}", text);
            }
            report(store.notifications());
            if state == InsightState::Failed {
                bail!("{}", state.text());
            }
            return Ok(());
        }
        Commands::Config { .. } | Commands::Completions { .. } | Commands::Tui => return Ok(()),
    };

    report(store.notifications());
    outcome.map_err(anyhow::Error::from)
}

// Fetches the list, printing the load error before giving up.
async fn load_tasks(store: &TaskStore<HttpTaskApi>) -> Result<()> {
    if let Err(err) = store.list_tasks().await {
        report(store.notifications());
        return Err(err.into());
    }
    Ok(())
}

async fn find_task(store: &TaskStore<HttpTaskApi>, id: TaskId) -> Result<Task> {
    load_tasks(store).await?;
    match store.task(id) {
        Some(task) => Ok(task),
        None => bail!("Task {} not found.", id),
    }
}

fn report(notifications: &NotificationQueue) {
    if let Some(entry) = notifications.visible() {
        match entry.severity {
            Severity::Error | Severity::Warning => eprintln!("{}", entry.message),
            Severity::Success | Severity::Info => println!("{}", entry.message),
        }
    }
}

fn print_tasks(tasks: &[Task], pending: usize) {
    if tasks.is_empty() {
        println!("No tasks found. Start by adding a new one!");
        return;
    }
    println!("Task List ({} Pending)", pending);
    println!("------");
    for task in tasks {
        println!(
            "{:>4} | [{}] {} | Priority: {} | Due: {}{}",
            task.id,
            if task.completed { "x" } else { " " },
            task.title,
            task.priority_label(),
            task.due_label(),
            if task.is_recurring { " | (Recurring)" } else { "" }
        );
    }
}

fn run_config(action: &ConfigAction, path: &Path) -> Result<()> {
    let mut config = Config::load_from(path)?;
    match action {
        ConfigAction::Set { key, value } => {
            config.set(key, value)?;
            config.save_to(path)?;
            println!("Config '{}' set to '{}'", key, value);
        }
        ConfigAction::Get { key } => {
            println!("{}", config.get(key)?);
        }
        ConfigAction::List => {
            println!("Configs ({}):", path.display());
            println!("------");
            for (key, value) in config.entries() {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Delete { key } => {
            config.reset(key)?;
            config.save_to(path)?;
            println!("Config '{}' reset to '{}'", key, config.get(key)?);
        }
    }
    Ok(())
}

fn print_completions(shell: &str) -> Result<()> {
    use clap_complete::{generate, Shell};
    let shell = shell.to_lowercase();
    let shell_enum = match shell.as_str() {
        "bash" => Shell::Bash,
        "zsh" => Shell::Zsh,
        "fish" => Shell::Fish,
        "elvish" => Shell::Elvish,
        "powershell" => Shell::PowerShell,
        _ => bail!("Unsupported shell: {}", shell),
    };
    let mut cmd = Cli::command();
    generate(shell_enum, &mut cmd, "taskmate", &mut std::io::stdout());
    Ok(())
}

// Logs go to a file so they never draw over the TUI.
fn init_logging(level: &str) -> Option<WorkerGuard> {
    let log_path = std::env::var("TASKMATE_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir().join("taskmate.log"));
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
