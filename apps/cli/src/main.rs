//! seo-agent CLI: the monthly content-operations run for a marketing site.
//!
//! Measures rankings, writes or refreshes one article, maintains internal
//! links, scans competitors, publishes through git and emails a report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
