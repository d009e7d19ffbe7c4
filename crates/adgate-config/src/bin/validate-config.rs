//! Config validation CLI tool
//!
//! Validates an adgate configuration file and reports any errors.

use adgate_config::MissingTtlPolicy;
use adgate_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an adgate configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match adgate_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", adgate_config::CURRENT_CONFIG_VERSION);
            println!(
                "  Session gate: {}, cooldown: {}",
                format_duration(settings.gating.session_gate),
                format_duration(settings.gating.cooldown)
            );
            let missing_ttl = match settings.gating.missing_ttl {
                MissingTtlPolicy::Expire => "expire",
                MissingTtlPolicy::Persist => "persist",
            };
            println!("  Missing server TTL: {}", missing_ttl);
            println!(
                "  Load backoff: {}^n s, plateau {}",
                settings.retry.backoff.base(),
                format_duration(settings.retry.backoff.max_delay())
            );
            println!("  Policy endpoint: {}", settings.network.base_url);
            println!("  Placements: {}", settings.placements.len());

            for placement in &settings.placements {
                let mode = if placement.auto_load { "auto-load" } else { "on demand" };
                println!("  - {} [{}]", placement.id, mode);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                adgate_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                adgate_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                adgate_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                adgate_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        adgate_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
