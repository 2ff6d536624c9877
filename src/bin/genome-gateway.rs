//! genome-gateway -- MCP server for genomic prediction tools.
//!
//! Usage: genome-gateway [--engine <program>] [--engine-arg <arg>]...
//!                       [--timeout-secs <n>] [--workers <n>] [--organism <name>]
//!
//! The engine credential is read from `ALPHAGENOME_API_KEY`.

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    // Initialize tracing to stderr so it does not interfere with MCP stdio.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = genome_gateway::GatewayConfig::from_env().context("invalid configuration")?;

    genome_gateway::run_mcp_server(config)
}
