// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use prodlisting::apply::ApplyMode;
use prodlisting::config::{Config, DEFAULT_CONFIG_PATH, Profile};
use prodlisting::pipeline;
use prodlisting::validate::Schema;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

#[derive(Parser)]
#[command(name = "prodlisting")]
#[command(author, version, about = "Keep product package listings in sync with the listings database", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database profile file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Database path (overrides the active profile)
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile the database with a listing file
    Insert {
        /// Listing file to apply
        file: PathBuf,
        /// Execute the changes instead of only printing them
        #[arg(long)]
        commit: bool,
        /// Print only the statements that change the database
        #[arg(long)]
        print_changes_only: bool,
        /// Schema file to validate against (default: built-in schema)
        #[arg(long)]
        schemapath: Option<PathBuf>,
    },
    /// Write the stored listing of a product to a file
    Generate {
        /// Output file
        file: PathBuf,
        /// Product label
        #[arg(long)]
        product: String,
        /// Product version
        #[arg(long)]
        version: String,
        /// Product variant
        #[arg(long)]
        variant: String,
    },
    /// Check a listing file against the schema
    Validate {
        /// Listing file to check
        file: PathBuf,
        /// Schema file to validate against (default: built-in schema)
        #[arg(long)]
        schemapath: Option<PathBuf>,
        /// Print errors as JSON
        #[arg(long)]
        json: bool,
    },
    /// Initialize the listings database
    Init,
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Resolve the database path from the flag or the active profile
fn resolve_db_path(cli_path: Option<&Path>, config_path: &Path) -> Result<String> {
    let path = match cli_path {
        Some(path) => path.to_path_buf(),
        None => {
            let config = Config::load(config_path)?;
            let profile = Profile::from_env();
            debug!("Using database profile {}", profile);
            config.db_path_for(profile)
        }
    };

    path.to_str()
        .map(str::to_string)
        .with_context(|| format!("Database path is not valid UTF-8: {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Init => {
            let db_path = resolve_db_path(cli.db_path.as_deref(), &cli.config)?;
            info!("Initializing listings database at: {}", db_path);
            prodlisting::db::init(&db_path)?;
            println!("Database initialized successfully at: {}", db_path);
            Ok(())
        }
        Commands::Insert {
            file,
            commit,
            print_changes_only,
            schemapath,
        } => {
            let schema = Schema::load(schemapath.as_deref())?;
            let listing = pipeline::load_listing(&file, &schema)?;

            let db_path = resolve_db_path(cli.db_path.as_deref(), &cli.config)?;
            let mut conn = prodlisting::db::open(&db_path)?;

            let mut mode = if commit {
                ApplyMode::commit()
            } else {
                ApplyMode::preview()
            };
            if print_changes_only {
                mode = mode.quiet();
            }

            let report = match pipeline::sync_listing(&mut conn, &listing, mode) {
                Ok(report) => report,
                Err(e) if e.is_store_failure() && commit => {
                    error!("Insert aborted; statements executed before the failure stay applied");
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };
            println!(
                "{} {} {}: {}",
                report.product.label, report.product.version, report.product.variant, report.stats
            );
            if !commit && report.stats.mutations() > 0 {
                println!("Run again with --commit to apply these changes");
            }
            Ok(())
        }
        Commands::Generate {
            file,
            product,
            version,
            variant,
        } => {
            let db_path = resolve_db_path(cli.db_path.as_deref(), &cli.config)?;
            let conn = prodlisting::db::open(&db_path)?;

            let listing = pipeline::generate_file(&conn, &file, &product, &version, &variant)?;
            println!(
                "Wrote {} package(s) for {} {} {} to {}",
                listing.package_count(),
                product,
                version,
                variant,
                file.display()
            );
            Ok(())
        }
        Commands::Validate {
            file,
            schemapath,
            json,
        } => {
            let schema = Schema::load(schemapath.as_deref())?;
            let errors = pipeline::validate_file(&file, &schema)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&errors)?);
            } else if errors.is_empty() {
                println!("Pass");
            } else {
                print!("{}", errors);
            }

            if errors.is_empty() {
                Ok(())
            } else {
                Err(anyhow::anyhow!(
                    "{} failed validation ({} field(s) with errors)",
                    file.display(),
                    errors.len()
                ))
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "prodlisting", &mut io::stdout());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_insert_flags() {
        let cli = Cli::try_parse_from([
            "prodlisting",
            "insert",
            "listing.yaml",
            "--commit",
            "--print-changes-only",
            "--db-path",
            "/tmp/listings.db",
        ])
        .unwrap();

        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/listings.db")));
        match cli.command {
            Commands::Insert {
                file,
                commit,
                print_changes_only,
                schemapath,
            } => {
                assert_eq!(file, PathBuf::from("listing.yaml"));
                assert!(commit);
                assert!(print_changes_only);
                assert!(schemapath.is_none());
            }
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn test_generate_requires_product_fields() {
        let result = Cli::try_parse_from(["prodlisting", "generate", "out.yaml", "--product", "konami"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_db_path_flag_wins_over_profile() {
        let path = resolve_db_path(
            Some(Path::new("/tmp/explicit.db")),
            Path::new("/nonexistent/db_connections.toml"),
        )
        .unwrap();
        assert_eq!(path, "/tmp/explicit.db");
    }
}
