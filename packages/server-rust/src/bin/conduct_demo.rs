//! Runs the greeting organizer and prints its JSend result.

use clap::Parser;
use conduct_core::Arguments;
use conduct_service::demo::Greet;
use conduct_service::Service;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "conduct-demo")]
#[command(about = "Greets a name through a three-step organizer", long_about = None)]
#[command(version)]
struct Cli {
    /// Name to greet
    name: String,

    /// End the greeting with an exclamation mark
    #[arg(short, long)]
    excited: bool,

    /// Also print the parent chain of the result
    #[arg(long)]
    parents: bool,

    /// Log level
    #[arg(long, env = "CONDUCT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "CONDUCT_LOG_JSON")]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());
    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let arguments = Arguments::new()
        .kwarg("name", cli.name)
        .kwarg("excited", cli.excited);
    let result = Greet::call(arguments)?;
    println!("{}", serde_json::to_string_pretty(&result.to_jsend())?);

    if cli.parents {
        let limit = Greet::config().settings().parents_limit;
        for (depth, ancestor) in result.parents(false, limit).enumerate() {
            println!(
                "{depth}: {} {}",
                ancestor.service(),
                serde_json::to_string(&ancestor.to_jsend())?
            );
        }
    }
    Ok(())
}
