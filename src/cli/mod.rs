pub mod args;
pub mod commands;

pub use args::{ConfigArgs, ServeArgs};
use clap::{Parser, Subcommand};

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser)]
#[command(name = "draftmill")]
#[command(version = crate::VERSION)]
#[command(about = "Orchestration engine for multi-stage content-generation pipelines")]
#[command(help_template = HELP_TEMPLATE)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(
        about = "Start the step-trigger HTTP server",
        long_about = "Serve binds the trigger listener and processes step requests until terminated. Requires the bearer token environment variable named by server.auth_token_env.",
        after_help = "Example:\n    draftmill serve ./workspace --bind 0.0.0.0:8319"
    )]
    Serve(ServeArgs),
    #[command(
        about = "Print the resolved configuration",
        long_about = "Config loads draftmill.toml from the workspace, applies environment overrides, validates the result, and prints it.",
        after_help = "Example:\n    draftmill config ./workspace --env-vars"
    )]
    Config(ConfigArgs),
}

pub async fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Serve(serve_args) => commands::serve(serve_args).await,
        Command::Config(config_args) => commands::config(config_args).await,
    }
}
