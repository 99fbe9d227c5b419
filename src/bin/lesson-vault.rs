//! Lesson Vault CLI Binary

use std::process;

use clap::Parser;
use lesson_vault::cli::{execute, Cli};
use lesson_vault::commands::VaultApp;
use lesson_vault::config::VaultConfig;
use lesson_vault::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match VaultConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
        if cli.curriculum.is_none() && std::env::var("VAULT_CURRICULUM").is_err() {
            config.curriculum_path = dir.join("curriculum.json");
        }
    }
    if let Some(path) = &cli.curriculum {
        config.curriculum_path = path.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.json = format.eq_ignore_ascii_case("json");
    }

    init_logging(&config.logging);

    let app = match VaultApp::open(config) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Error opening vault: {}", e);
            process::exit(1);
        }
    };

    match execute(&app, &cli.command).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(details) = &e.details {
                eprintln!("  caused by: {}", details);
            }
            process::exit(1);
        }
    }
}
