mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ecsroll", about = "Roll container images onto ECS Fargate services")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default ecsroll.toml
    Init,
    /// Show what a deploy of the given tag would register and trigger
    Plan {
        /// Image tag to deploy (defaults to "latest")
        #[arg(long, env = "IMAGE_TAG")]
        image_tag: Option<String>,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Provision the stacks and roll the service onto the given tag
    Deploy {
        /// Image tag to deploy (defaults to "latest")
        #[arg(long, env = "IMAGE_TAG")]
        image_tag: Option<String>,
        /// Reference existing network and infrastructure stacks instead of
        /// reconciling them
        #[arg(long)]
        service_only: bool,
        /// Print the deployment report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the running service and its last trigger key
    Status,
    /// Check AWS setup and readiness
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                // arch-lint: allow(no-silent-result-drop) reason="RUST_LOG unset or invalid falls back to the default info filter"
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::Plan { image_tag, json } => commands::plan(image_tag.as_deref(), json).await?,
        Commands::Deploy {
            image_tag,
            service_only,
            json,
        } => commands::deploy(image_tag.as_deref(), service_only, json).await?,
        Commands::Status => commands::status().await?,
        Commands::Doctor => commands::doctor().await?,
    }

    Ok(())
}
