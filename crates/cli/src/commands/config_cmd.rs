//! `loopwright config` — show the effective configuration.
//!
//! Printed through the redacting Debug impl so the API key never lands in
//! a terminal scrollback.

use std::path::PathBuf;

pub fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    println!("{config:#?}");
    Ok(())
}
