use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use log::debug;

use feedly_to_sqlite::auth::{self, DEFAULT_AUTH_PATH, DEVELOPER_TOKEN_URL};
use feedly_to_sqlite::client::{FEEDLY_API_URL, FeedlyClient};
use feedly_to_sqlite::db::Database;
use feedly_to_sqlite::flatten::FieldMap;
use feedly_to_sqlite::import::Importer;
use feedly_to_sqlite::logger::{self, LogConfig};

/// Save data from Feedly to a SQLite database
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Console log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write debug logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Base URL of the Feedly API
    #[arg(long, global = true, hide = true, default_value = FEEDLY_API_URL)]
    api_url: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Save authentication credentials to a JSON file
    Auth {
        /// Path to save tokens to
        #[arg(short, long, default_value = DEFAULT_AUTH_PATH)]
        auth: PathBuf,

        /// Feedly developer token; prompted for if omitted
        developer_token: Option<String>,
    },
    /// Download collections, feeds, boards and saved items
    Subscriptions {
        /// SQLite database file to write to
        db_path: PathBuf,

        /// Path to read tokens from
        #[arg(short, long, default_value = DEFAULT_AUTH_PATH)]
        auth: PathBuf,

        /// YAML file overriding which fields are saved
        #[arg(long)]
        fields: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logger::init(LogConfig {
        console_level: logger::parse_log_level(&args.log_level),
        log_file: args.log_file.clone(),
        ..LogConfig::default()
    })?;

    match args.command {
        Command::Auth {
            auth,
            developer_token,
        } => run_auth(&auth, developer_token),
        Command::Subscriptions {
            db_path,
            auth,
            fields,
        } => run_subscriptions(&db_path, &auth, fields.as_deref(), &args.api_url).await,
    }
}

fn run_auth(path: &Path, developer_token: Option<String>) -> Result<()> {
    let token = match developer_token {
        Some(token) => token,
        None => prompt_token()?,
    };

    auth::save(path, &token)?;

    println!();
    println!(
        "Your credentials have been saved to {}. You can now import feedly data by running",
        path.display()
    );
    println!();
    println!("    feedly-to-sqlite subscriptions feedly.db");
    println!();
    Ok(())
}

fn prompt_token() -> Result<String> {
    println!(
        "Visit the following link and find your personal developer token: {}",
        DEVELOPER_TOKEN_URL
    );
    print!("feedly developer token: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let token = line.trim();
    if token.is_empty() {
        bail!("No developer token given");
    }
    Ok(token.to_string())
}

async fn run_subscriptions(
    db_path: &Path,
    auth_path: &Path,
    fields: Option<&Path>,
    api_url: &str,
) -> Result<()> {
    let token = auth::load(auth_path)?;
    let fields = match fields {
        Some(path) => FieldMap::load(path)?,
        None => FieldMap::builtin()?,
    };

    debug!("Writing to {} from {}", db_path.display(), api_url);
    let db = Database::open(db_path).await?;
    let client = FeedlyClient::new(api_url, &token);
    let summary = Importer::new(db, client, fields).run().await?;

    println!(
        "Saved {} collections, {} feeds, {} boards and {} items to {}",
        summary.collections,
        summary.feeds,
        summary.boards,
        summary.items,
        db_path.display()
    );
    Ok(())
}
