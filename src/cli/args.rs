use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ServeArgs {
    /// Workspace containing draftmill.toml and logs (default: current directory)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Override the configured bind address
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Workspace containing draftmill.toml (default: current directory)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Also list the supported environment variable overrides
    #[arg(long)]
    pub env_vars: bool,
}
