//! preampd binary.
//!
//! Brings the controller up against the configured engine, then serves
//! command phrases: either a single phrase from the command line, or one
//! phrase per stdin line with one reply per line (the wrapping network
//! transport lives outside this process).

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use preampd::engine::TcpEngineClient;
use preampd::{AppConfig, Preamp};

/// Personal audio preamplifier controller
#[derive(Parser, Debug)]
#[command(name = "preampd")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the controller configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single command phrase and exit
    #[arg(short = 'e', long)]
    execute: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    // no audio path exists without the engine: failure here is fatal
    let engine = TcpEngineClient::connect(&config.engine_addr)
        .context("connecting to the DSP engine")?;

    let mut preamp = Preamp::start(config, Box::new(engine)).context("starting the preamp")?;

    if let Some(phrase) = cli.execute {
        println!("{}", preamp.handle_phrase(&phrase));
        return Ok(());
    }

    info!("preampd v{} serving on stdin", env!("CARGO_PKG_VERSION"));

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let reply = preamp.handle_phrase(&line);
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }

    Ok(())
}
