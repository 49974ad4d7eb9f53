use clap::Parser;

use crate::{event_loop::ClientConfig, registry::DEFAULT_MAX_AUCTIONS};

/// Follow several auction servers at once from one terminal.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Maximum number of auctions followed at the same time.
    #[arg(long, default_value_t = DEFAULT_MAX_AUCTIONS, value_parser = parse_capacity)]
    pub max_auctions: usize,

    /// Username sent to every server. Prompted for on stdin when omitted.
    #[arg(long)]
    pub username: Option<String>,

    /// Do not print the command prompt (useful when input is scripted).
    #[arg(long)]
    pub no_prompt: bool,
}

impl Args {
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            max_auctions: self.max_auctions,
            prompt: !self.no_prompt,
        }
    }
}

fn parse_capacity(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("at least one auction slot is required".to_string()),
        Ok(capacity) => Ok(capacity),
        Err(err) => Err(format!("invalid auction count '{value}': {err}")),
    }
}
