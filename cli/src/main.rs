mod commands;
mod config;
mod recipe_page;
mod server;
mod weather;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_chore_complete, cmd_chore_list, cmd_chore_undo, cmd_grocery_generate, cmd_grocery_list,
    cmd_pin_hash, cmd_pin_set, cmd_user_add, cmd_user_list,
};
use crate::config::Config;
use hearth_core::db::Database;

#[derive(Parser)]
#[command(
    name = "hearthboard",
    version,
    about = "A family dashboard for chores, meals, groceries and the pantry"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dashboard server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000", env = "HEARTHBOARD_PORT")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1", env = "HEARTHBOARD_BIND")]
        bind: String,
    },
    /// Manage the family PIN
    Pin {
        #[command(subcommand)]
        command: PinCommands,
    },
    /// Manage household members
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// View and complete chores
    Chore {
        #[command(subcommand)]
        command: ChoreCommands,
    },
    /// View or generate the grocery list
    Grocery {
        #[command(subcommand)]
        command: GroceryCommands,
    },
}

#[derive(Subcommand)]
enum PinCommands {
    /// Print the hash of a PIN, for use as FAMILY_PIN_HASH
    Hash {
        /// Six-character PIN
        pin: String,
    },
    /// Store the PIN hash in the data directory
    Set {
        /// Six-character PIN
        pin: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// List users with their points and earnings
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a household member
    Add {
        /// Display name
        name: String,
        /// Color used on the board (e.g. "#3366ff")
        #[arg(long)]
        color: String,
        /// Optional emoji shown next to the name
        #[arg(long)]
        emoji: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ChoreCommands {
    /// List chores with this week's completions
    List {
        /// Week offset from the current week (e.g. -1 for last week)
        #[arg(short, long, default_value = "0", allow_hyphen_values = true)]
        week: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a chore done for a user
    Complete {
        /// Chore ID
        chore_id: i64,
        /// User ID
        user_id: i64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Undo a completion and take the points back
    Undo {
        /// Chore ID
        chore_id: i64,
        /// User ID
        user_id: i64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GroceryCommands {
    /// Show the grocery list grouped by store section
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add ingredients from planned meals in a date range
    Generate {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let open_db = || Database::open(&config.db_path);

    match cli.command {
        Commands::Serve { port, bind } => {
            let pin_hash = config.pin_hash()?;
            server::start_server(open_db()?, port, &bind, pin_hash).await
        }
        Commands::Pin { command } => match command {
            PinCommands::Hash { pin } => cmd_pin_hash(&pin),
            PinCommands::Set { pin } => cmd_pin_set(&config, &pin),
        },
        Commands::User { command } => {
            let db = open_db()?;
            match command {
                UserCommands::List { json } => cmd_user_list(&db, json),
                UserCommands::Add {
                    name,
                    color,
                    emoji,
                    json,
                } => cmd_user_add(&db, &name, &color, emoji, json),
            }
        }
        Commands::Chore { command } => {
            let db = open_db()?;
            match command {
                ChoreCommands::List { week, json } => cmd_chore_list(&db, week, json),
                ChoreCommands::Complete {
                    chore_id,
                    user_id,
                    date,
                    json,
                } => cmd_chore_complete(&db, chore_id, user_id, date, json),
                ChoreCommands::Undo {
                    chore_id,
                    user_id,
                    date,
                    json,
                } => cmd_chore_undo(&db, chore_id, user_id, date, json),
            }
        }
        Commands::Grocery { command } => {
            let db = open_db()?;
            match command {
                GroceryCommands::List { json } => cmd_grocery_list(&db, json),
                GroceryCommands::Generate { start, end, json } => {
                    cmd_grocery_generate(&db, start, end, json)
                }
            }
        }
    }
}
