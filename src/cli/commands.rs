use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use std::path::PathBuf;

use crate::cli::prompt::Prompt;
use crate::core::{clock::ThreadSleeper, config::Settings, reader::PcscReader};

#[derive(Parser, Debug)]
#[command(name = "bad-reader")]
#[command(about = "Interactive PCSC prompt for reading SLE4442 memory smart cards")]
#[command(version)]
pub struct Cli {
    /// JSON config file (flags override its values)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only use readers whose name contains this text
    #[arg(short, long)]
    pub reader: Option<String>,

    /// Timeout of one card presence poll, in milliseconds
    #[arg(long)]
    pub poll_timeout_ms: Option<u64>,

    /// Pause after a disconnect, in seconds
    #[arg(long)]
    pub grace_secs: Option<u64>,

    /// Send SELECT CARD TYPE (SLE4432/4442/4418) after connecting
    #[arg(long)]
    pub select_card_type: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Cli {
    /// Settings from the config file, if any, with flags applied on top
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        if let Some(reader) = &self.reader {
            settings.reader = Some(reader.clone());
        }
        if let Some(timeout) = self.poll_timeout_ms {
            settings.poll_timeout_ms = timeout;
        }
        if let Some(grace) = self.grace_secs {
            settings.grace_period_secs = grace;
        }
        if self.select_card_type {
            settings.select_card_type = true;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn log_level(&self) -> log::LevelFilter {
        if self.debug {
            log::LevelFilter::Debug
        } else if self.verbose {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Warn
        }
    }
}

pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(cli.log_level())
        .init();

    let settings = cli.settings()?;
    log::debug!("Settings: {settings:?}");

    println!("Bad Reader {}", env!("CARGO_PKG_VERSION"));

    let mut reader = PcscReader::new(settings.reader.clone(), Box::new(ThreadSleeper))
        .context("Failed to initialize PCSC")?;

    let mut prompt = Prompt::new(
        io::stdin().lock(),
        io::stdout().lock(),
        Box::new(ThreadSleeper),
        settings,
    );
    prompt.run_sessions(&mut reader)
}
