use clap::Parser;
use draftmill::{cli, logging};

#[tokio::main]
async fn main() -> draftmill::Result<()> {
    let args = cli::Args::parse();
    let workspace = match &args.command {
        cli::Command::Serve(serve_args) => serve_args.path.clone(),
        cli::Command::Config(config_args) => config_args.path.clone(),
    };
    let _guard = logging::init(workspace.as_deref())?;
    cli::run(args).await
}
