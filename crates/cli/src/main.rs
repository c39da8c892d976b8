//! Pizzaria CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply schema migrations
//! pz-cli migrate
//!
//! # Create the first owner account (password read from stdin when omitted)
//! pz-cli admin create -e dono@pizzaria.com -n "Maria" -r dono
//!
//! # Load or update the menu from a YAML file
//! pz-cli seed menu menu.yaml
//! ```
//!
//! All commands read `ADMIN_DATABASE_URL` (or `DATABASE_URL`).

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pz-cli")]
#[command(author, version, about = "Pizzaria CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage operator accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a new operator
    Create {
        /// Operator email address
        #[arg(short, long)]
        email: String,

        /// Operator display name
        #[arg(short, long)]
        name: String,

        /// Role (`dono`, `gerente`, `atendente`)
        #[arg(short, long, default_value = "atendente")]
        role: String,

        /// Initial password; read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert categories, products, add-ons and stuffed crusts from YAML
    Menu {
        /// Path to the menu file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Admin { action } => match action {
            AdminAction::Create {
                email,
                name,
                role,
                password,
            } => {
                commands::admin::create_user(&email, &name, &role, password).await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Menu { file } => commands::seed::menu(&file).await?,
        },
    }
    Ok(())
}
