use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use story_site::{
    config::{Config, LogFormat},
    listing::SORT_PARAM,
    related::ListOwner,
    site::AppState,
    storage::SqliteStorage,
    study::{MemorySessionStore, SessionStore, StudyVariant, STUDY_SESSION_ID_KEY},
    tags::QueryParams,
};

/// Administration tool for the story site content engine.
#[derive(Parser, Debug)]
#[command(name = "story-site", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect and edit related-content lists
    #[command(subcommand)]
    Related(RelatedCommands),

    /// Manage study sessions
    #[command(subcommand)]
    Study(StudyCommands),

    /// Render the stories listing
    Stories {
        /// Sort comparator name
        #[arg(long)]
        sort: Option<String>,

        /// Facet filters as category=tag
        filters: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RelatedCommands {
    /// Show the live members of a list
    Show {
        /// Owner reference key (e.g. question-42) or list name
        owner: String,
    },
    /// Append one reference
    Append { owner: String, reference: String },
    /// Make the list equal to the given references
    Replace {
        owner: String,
        references: Vec<String>,
    },
    /// Re-sequence members; omitted members are removed
    Reorder {
        owner: String,
        references: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum StudyCommands {
    /// Create a study session
    Assign {
        /// Persona label
        #[arg(long)]
        persona: Option<String>,

        /// High-agency variant
        #[arg(long)]
        high_agency: bool,

        /// Integrated-content variant
        #[arg(long)]
        integrated_content: bool,

        /// Draw both axes at random, ignoring the variant flags
        #[arg(long)]
        random: bool,
    },
    /// Show the display flags a study session produces
    Flags { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Story site starting...");

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let state = AppState::new(config, storage);

    if let Err(e) = run(&state, cli.command).await {
        error!(error = %e, "Command failed");
        return Err(e);
    }

    Ok(())
}

async fn run(state: &AppState, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Related(command) => run_related(state, command).await,
        Commands::Study(command) => run_study(state, command).await,
        Commands::Stories { sort, filters } => {
            let mut query = parse_filters(&filters)?;
            if let Some(sort) = sort {
                query.insert(SORT_PARAM.to_string(), sort);
            }
            let session = MemorySessionStore::new();
            let page = state.stories_page(&session, &query).await?;
            print_json(&page)
        }
    }
}

async fn run_related(state: &AppState, command: RelatedCommands) -> anyhow::Result<()> {
    match command {
        RelatedCommands::Show { owner } => {
            let entries = state.related.get(&ListOwner::parse(&owner)).await?;
            let rows: Vec<Value> = entries
                .iter()
                .map(|e| {
                    serde_json::json!({
                        "reference": e.reference,
                        "order": e.order,
                        "title": state.resolver.title_of(&e.item),
                        "url": state.resolver.url_of(&e.item),
                    })
                })
                .collect();
            print_json(&rows)
        }
        RelatedCommands::Append { owner, reference } => {
            let summary = state
                .related
                .append(&ListOwner::parse(&owner), &reference)
                .await?;
            print_json(&summary)
        }
        RelatedCommands::Replace { owner, references } => {
            let summary = state
                .related
                .replace(&ListOwner::parse(&owner), &references)
                .await?;
            print_json(&summary)
        }
        RelatedCommands::Reorder { owner, references } => {
            let summary = state
                .related
                .reorder(&ListOwner::parse(&owner), &references)
                .await?;
            print_json(&summary)
        }
    }
}

async fn run_study(state: &AppState, command: StudyCommands) -> anyhow::Result<()> {
    let session = MemorySessionStore::new();
    match command {
        StudyCommands::Assign {
            persona,
            high_agency,
            integrated_content,
            random,
        } => {
            let record = if random {
                state
                    .study
                    .assign_random_variant(&session, persona.as_deref())
                    .await?
            } else {
                let variant = StudyVariant::new(high_agency, integrated_content);
                state
                    .study
                    .assign_variant(&session, persona.as_deref(), variant)
                    .await?
            };
            print_json(&record)
        }
        StudyCommands::Flags { id } => {
            session.set(STUDY_SESSION_ID_KEY, Value::from(id));
            let resolved = state.study.resolve(&session).await?;
            if resolved.session.is_none() {
                bail!("Study session not found: {}", id);
            }
            print_json(&resolved.flags)
        }
    }
}

fn parse_filters(filters: &[String]) -> anyhow::Result<QueryParams> {
    filters
        .iter()
        .map(|filter| {
            let (key, value) = filter
                .split_once('=')
                .with_context(|| format!("Filter '{}' is not key=value", filter))?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
