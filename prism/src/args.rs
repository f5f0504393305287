use std::path::PathBuf;

use clap::Parser;

/// Prism LLM API gateway
#[derive(Debug, Parser)]
#[command(name = "prism", about = "Protocol-translating gateway for LLM chat APIs")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prism.toml", env = "PRISM_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "PRISM_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,
}
