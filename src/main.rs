use std::sync::Arc;

use clap::{Parser, Subcommand};
use notes_client::app::NotesApp;
use notes_client::config::{ClientConfig, ConfigError};
use notes_client::models::{Credentials, DEFAULT_MODEL, NoteDraft, NoteError, Tags, validate_search_query};
use notes_client::net::api::ApiClient;
use notes_client::net::types::ApiError;
use notes_client::ui::notice::{LogNotifier, Notifier};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Invalid(#[from] NoteError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0} failed; see log for details")]
    Failed(&'static str),
}

#[derive(Parser, Debug)]
#[command(name = "notes-client", about = "Notes backend client")]
struct Cli {
    /// Overrides `NOTES_API_BASE`.
    #[arg(long, env = "NOTES_API_BASE")]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether the backend has AI credentials configured.
    Status,
    Login {
        #[arg(long)]
        api_url: String,
        #[arg(long, env = "NOTES_AI_API_KEY")]
        api_key: String,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
    Logout,
    List {
        #[arg(long, conflicts_with = "tag")]
        category: Option<String>,
        #[arg(long)]
        tag: Option<String>,
    },
    Get {
        id: i64,
    },
    Search {
        query: String,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "", help = "Comma-separated tags")]
        tags: String,
    },
    Update {
        id: i64,
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long, default_value = "", help = "Comma-separated tags")]
        tags: String,
    },
    Delete {
        id: i64,
    },
    Stats,
    Categories,
    Tags,
    /// Rewrite with a prompt, or analyze title/category/tags without one.
    Optimize {
        content: String,
        #[arg(long)]
        prompt: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(base) = cli.api_base.as_deref() {
        config = config.with_api_base(base)?;
    }
    let api = ApiClient::from_config(&config)?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let app = NotesApp::new(api.clone(), config.cooldowns, notifier);

    match cli.command {
        Command::Status => print_json(&api.config().await?),
        Command::Login { api_url, api_key, model } => {
            app.login(&Credentials { api_url, api_key, model }).await?;
            Ok(())
        }
        Command::Logout => {
            app.logout().await?;
            Ok(())
        }
        Command::List { category, tag } => {
            let notes = match (category, tag) {
                (Some(category), _) => api.notes_by_category(&category).await?,
                (None, Some(tag)) => api.notes_by_tag(&tag).await?,
                (None, None) => api.list_notes().await?,
            };
            print_json(&notes)
        }
        Command::Get { id } => print_json(&api.get_note(id).await?),
        Command::Search { query } => {
            validate_search_query(&query)?;
            print_json(&api.search(query.trim()).await?)
        }
        Command::Create { title, content, category, tags } => {
            let draft = NoteDraft { title, content, category, tags: Tags::parse(&tags) };
            let note = app.handle_save(None, &draft).await.ok_or(CliError::Failed("create"))?;
            print_json(&note)
        }
        Command::Update { id, title, content, category, tags } => {
            let draft = NoteDraft { title, content, category, tags: Tags::parse(&tags) };
            let note = app.handle_save(Some(id), &draft).await.ok_or(CliError::Failed("update"))?;
            print_json(&note)
        }
        Command::Delete { id } => {
            if app.handle_delete(id).await { Ok(()) } else { Err(CliError::Failed("delete")) }
        }
        Command::Stats => print_json(&api.stats().await?),
        Command::Categories => print_json(&api.categories().await?),
        Command::Tags => print_json(&api.tags().await?),
        Command::Optimize { content, prompt } => {
            app.check_login_status().await;
            let result = app
                .handle_optimize(&content, prompt.as_deref())
                .await
                .ok_or(CliError::Failed("optimize"))?;
            print_json(&serde_json::json!({
                "title": result.title,
                "optimized": result.optimized,
                "category": result.category,
                "tags": result.tags,
                "key_points": result.key_points,
                "graph": result.graph,
                "mode": result.mode.as_str(),
            }))
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
