use clap::Parser;
use clap::builder::ValueHint;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dpp-daemon", about = "DPP certification control agent")]
pub struct Args {
    #[arg(
        long,
        value_name = "config",
        help = "Path to the agent configuration (TOML). If not specified, defaults are used.",
        value_hint = ValueHint::FilePath
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        value_name = "listen",
        help = "Address the control agent listens on; overrides listen_addr from the configuration"
    )]
    pub listen: Option<SocketAddr>,

    #[arg(
        long,
        value_name = "log-level",
        help = "Tracing filter used when RUST_LOG is not set",
        default_value = "info"
    )]
    pub log_level: String,
}
