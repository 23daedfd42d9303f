//! # vcom CLI entry point
//!
//! Parses command-line arguments, initializes tracing, and dispatches to
//! subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vcom_cli::backend::BackendArgs;
use vcom_cli::cycle::{
    run_close, run_commit, run_import, run_root, run_status, CloseArgs, CommitArgs, ImportArgs,
    RootArgs, StatusArgs,
};
use vcom_cli::proof::{run_prove, run_verify, ProveArgs, VerifyArgs};

/// Vote commitment CLI.
///
/// Commits each election cycle's ballots to a Merkle root anchored on an
/// append-only ledger, and exports proofs that individual ballots are
/// included.
#[derive(Parser, Debug)]
#[command(name = "vcom", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to a YAML pipeline configuration file.
    #[arg(long, env = "VCOM_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load ballots from a JSON or JSON-lines file into the vote store.
    Import(ImportArgs),

    /// Close a cycle to further ballots.
    Close(CloseArgs),

    /// Compute a cycle's Merkle root without publishing it.
    Root(RootArgs),

    /// Publish and record the root for one or more cycles.
    Commit(CommitArgs),

    /// Show a cycle's commitment, close state and journaled submission.
    Status(StatusArgs),

    /// Export inclusion proofs for a voter's ballots.
    Prove(ProveArgs),

    /// Verify exported inclusion proofs.
    Verify(VerifyArgs),
}

fn init_tracing(verbose: u8, json: bool) {
    // RUST_LOG wins over -v when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "vcom starting");

    let config = cli.config.as_deref();
    let backend = &cli.backend;
    let result = match &cli.command {
        Commands::Import(args) => run_import(args, backend).await,
        Commands::Close(args) => run_close(args, backend).await,
        Commands::Root(args) => run_root(args, backend, config).await,
        Commands::Commit(args) => run_commit(args, backend, config).await,
        Commands::Status(args) => run_status(args, backend).await,
        Commands::Prove(args) => run_prove(args, backend).await,
        Commands::Verify(args) => run_verify(args, backend).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcom_cli::backend::{LedgerKind, StoreKind};

    #[test]
    fn cli_parse_commit_multiple_cycles() {
        let cli = Cli::try_parse_from([
            "vcom", "commit", "--cycle", "2024", "--cycle", "2025", "--finality", "finalized",
        ])
        .unwrap();
        if let Commands::Commit(args) = cli.command {
            assert_eq!(args.cycles, vec!["2024".to_string(), "2025".to_string()]);
            assert_eq!(
                args.overrides.finality,
                Some(vcom_commit::Finality::Finalized)
            );
            assert!(!args.overrides.allow_open);
        } else {
            panic!("expected commit");
        }
    }

    #[test]
    fn cli_parse_commit_requires_cycle() {
        assert!(Cli::try_parse_from(["vcom", "commit"]).is_err());
    }

    #[test]
    fn cli_parse_root_with_schema() {
        let cli =
            Cli::try_parse_from(["vcom", "root", "--cycle", "2024", "--schema", "selection-v1"])
                .unwrap();
        if let Commands::Root(args) = cli.command {
            assert_eq!(args.overrides.schema, Some(vcom_core::LeafSchema::SelectionV1));
        } else {
            panic!("expected root");
        }
    }

    #[test]
    fn cli_parse_prove() {
        let cli = Cli::try_parse_from([
            "vcom", "prove", "--cycle", "2024", "--voter", "V3", "--position", "P2",
        ])
        .unwrap();
        if let Commands::Prove(args) = cli.command {
            assert_eq!(args.voter, "V3");
            assert_eq!(args.position.as_deref(), Some("P2"));
            assert!(args.out.is_none());
        } else {
            panic!("expected prove");
        }
    }

    #[test]
    fn cli_parse_verify_with_ledger_check() {
        let cli = Cli::try_parse_from(["vcom", "verify", "proof.json", "--check-ledger"]).unwrap();
        if let Commands::Verify(args) = cli.command {
            assert_eq!(args.bundle, PathBuf::from("proof.json"));
            assert!(args.check_ledger);
        } else {
            panic!("expected verify");
        }
    }

    #[test]
    fn cli_parse_global_backend_flags() {
        let cli = Cli::try_parse_from([
            "vcom",
            "status",
            "--cycle",
            "2024",
            "--store",
            "postgres",
            "--database-url",
            "postgres://localhost/vcom",
            "--ledger",
            "evm",
        ])
        .unwrap();
        assert_eq!(cli.backend.store, StoreKind::Postgres);
        assert_eq!(cli.backend.ledger, LedgerKind::Evm);
        assert_eq!(
            cli.backend.database_url.as_deref(),
            Some("postgres://localhost/vcom")
        );
    }

    #[test]
    fn cli_parse_verbose_levels() {
        let cli0 = Cli::try_parse_from(["vcom", "close", "--cycle", "2024"]).unwrap();
        assert_eq!(cli0.verbose, 0);
        assert!(!cli0.log_json);

        let cli2 =
            Cli::try_parse_from(["vcom", "-vv", "--log-json", "close", "--cycle", "2024"]).unwrap();
        assert_eq!(cli2.verbose, 2);
        assert!(cli2.log_json);
    }

    #[test]
    fn cli_parse_invalid_schema_errors() {
        assert!(Cli::try_parse_from(["vcom", "root", "--cycle", "2024", "--schema", "v9"]).is_err());
    }

    #[test]
    fn cli_parse_no_subcommand_errors() {
        assert!(Cli::try_parse_from(["vcom"]).is_err());
    }
}
