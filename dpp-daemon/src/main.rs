mod args;
mod runner;

use args::Args;
use clap::Parser;
use dpp_core::config::load_config;
use dpp_core::dpp::DppEngine;
use dpp_core::dpp::ca::ScriptCa;
use dpp_core::factory::create_client;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG 优先，其次是 --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(args.config.as_deref()).await?;
    if let Some(addr) = args.listen {
        config.listen_addr = addr;
    }
    tracing::info!(
        device = ?config.device_type,
        ifname = config.ifname(),
        timeout_secs = config.default_timeout.as_secs(),
        "🚀 Starting DPP control agent"
    );

    // 1. 编译期选择的守护进程后端
    let client = create_client(&config);
    // 2. dot1x 注册使用的外部 CA
    let ca = Arc::new(ScriptCa::new(config.ca_program.clone(), config.ca_cert_dir.clone()));

    let addr = config.listen_addr;
    let engine = Arc::new(DppEngine::new(Arc::new(config), client, ca));

    runner::run_agent_server(engine, addr).await
}
