// comicshelf - comic library catalog
// Entry point and command-line front end

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comicshelf::app::{default_data_dir, AppContext};
use comicshelf::config::DATABASE_FILE_NAME;
use comicshelf::database::{Comic, Connection, MigrationRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "comicshelf")]
#[command(about = "Comic library catalog")]
#[command(version)]
struct Cli {
    /// Data directory holding the catalog database and settings
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the catalog database to the latest schema version
    Migrate,

    /// Show the stored and latest schema versions
    Version,

    /// Scan library roots and update the catalog
    Scan {
        /// Library roots [default: roots remembered in settings]
        roots: Vec<PathBuf>,
    },

    /// List active comics
    List {
        /// Output JSON to stdout
        #[arg(long)]
        json: bool,
    },

    /// List all tags
    Tags,

    /// Manage playlists
    #[command(subcommand)]
    Playlist(PlaylistCommands),
}

#[derive(Subcommand)]
enum PlaylistCommands {
    /// List playlists and their comics
    List,

    /// Create a playlist
    Add { name: String },

    /// Delete a playlist
    Remove { name: String },

    /// Rename a playlist
    Rename { old_name: String, new_name: String },

    /// Add comics to a playlist by unique identifier, e.g. "[Author]Title"
    AddComic {
        name: String,
        #[arg(required = true)]
        comics: Vec<String>,
    },

    /// Remove comics from a playlist by unique identifier
    RemoveComic {
        name: String,
        #[arg(required = true)]
        comics: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "comicshelf=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);

    if let Commands::Version = cli.command {
        return print_version(data_dir).await;
    }

    let ctx = AppContext::open(data_dir)
        .await
        .context("Failed to open catalog")?;
    let result = dispatch(&ctx, cli.command).await;
    ctx.close().await;
    result
}

async fn print_version(data_dir: PathBuf) -> anyhow::Result<()> {
    let runner = MigrationRunner::catalog()?;
    let db_path = data_dir.join(DATABASE_FILE_NAME);

    let stored = if db_path.exists() {
        let conn = Connection::open(&db_path).await?;
        let version = runner.current_version(&conn).await?;
        conn.close().await;
        version
    } else {
        None
    };

    match stored {
        Some(version) => println!("Schema version: {}", version),
        None => println!("Schema version: uninitialized"),
    }
    println!("Latest version: {}", runner.latest_version());
    Ok(())
}

async fn dispatch(ctx: &AppContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Migrate => {
            let runner = MigrationRunner::catalog()?;
            let version = runner.current_version(ctx.catalog.connection()).await?;
            println!("Schema version: {}", version.unwrap_or_default());
        }
        Commands::Version => print_version(ctx.data_dir.clone()).await?,
        Commands::Scan { roots } => {
            let roots = if roots.is_empty() {
                ctx.settings
                    .get_library_roots()
                    .await?
                    .into_iter()
                    .map(PathBuf::from)
                    .collect()
            } else {
                let remembered: Vec<String> = roots
                    .iter()
                    .map(|root| root.to_string_lossy().into_owned())
                    .collect();
                ctx.settings.remember_library_roots(&remembered).await?;
                roots
            };

            if roots.is_empty() {
                bail!("No library roots given and none remembered in settings");
            }

            let summary = ctx.library.sync(&roots).await?;
            println!(
                "{} comics saved, {} removed",
                summary.added_or_updated, summary.removed
            );
        }
        Commands::List { json } => {
            let comics = ctx.catalog.get_all_comics().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&comics)?);
            } else {
                for comic in &comics {
                    let marker = if comic.metadata().loved { "*" } else { " " };
                    println!(
                        "{} {} / {} / {}",
                        marker,
                        comic.category(),
                        comic.author(),
                        comic.display_title()
                    );
                }
            }
        }
        Commands::Tags => {
            for tag in ctx.catalog.get_all_tags().await? {
                println!("{}", tag);
            }
        }
        Commands::Playlist(command) => playlist(ctx, command).await?,
    }

    Ok(())
}

async fn playlist(ctx: &AppContext, command: PlaylistCommands) -> anyhow::Result<()> {
    let catalog = &ctx.catalog;

    match command {
        PlaylistCommands::List => {
            let comics = catalog.get_all_comics().await?;
            for playlist in catalog.get_all_playlists(&comics).await? {
                println!("{} ({})", playlist.name, playlist.len());
                for comic in &playlist.comics {
                    println!("  {}", comic.unique_identifier());
                }
            }
        }
        PlaylistCommands::Add { name } => catalog.add_playlist(&name).await?,
        PlaylistCommands::Remove { name } => catalog.remove_playlist(&name).await?,
        PlaylistCommands::Rename { old_name, new_name } => {
            catalog.rename_playlist(&old_name, &new_name).await?
        }
        PlaylistCommands::AddComic { name, comics } => {
            let comics = find_comics(ctx, &comics).await?;
            catalog.add_comics_to_playlist(&name, &comics).await?;
        }
        PlaylistCommands::RemoveComic { name, comics } => {
            let comics = find_comics(ctx, &comics).await?;
            catalog.remove_comics_from_playlist(&name, &comics).await?;
        }
    }

    Ok(())
}

/// Resolve unique identifiers against the active catalog
async fn find_comics(ctx: &AppContext, ids: &[String]) -> anyhow::Result<Vec<Comic>> {
    let all = ctx.catalog.get_all_comics().await?;

    ids.iter()
        .map(|id| {
            all.iter()
                .find(|comic| &comic.unique_identifier() == id)
                .cloned()
                .with_context(|| format!("No active comic with identifier {}", id))
        })
        .collect()
}
