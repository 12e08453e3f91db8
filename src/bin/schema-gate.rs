//! Schema Gate CLI
//!
//! Command-line interface for checking payloads against JSON schemas and
//! inspecting how schemas flatten.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use schema_gate::{
    errors_by_path, flatten, load_root, load_schema, resolve_all_refs, specific_validation_errors,
    validation_errors, RootSchema,
};

#[derive(Parser)]
#[command(name = "schema-gate")]
#[command(about = "Check JSON payloads against JSON schemas")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins when set
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a payload and report whether it is valid
    Check {
        /// Schema file
        schema: PathBuf,

        /// Payload file to check
        payload: PathBuf,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Print the payload's validation errors as JSON
    Errors {
        /// Schema file
        schema: PathBuf,

        /// Payload file to check
        payload: PathBuf,

        /// Only errors at or beneath this path (e.g. user.tags[0], /user/tags/0)
        #[arg(long)]
        path: Option<String>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the schema's flattened field descriptors
    Flatten {
        /// Schema file
        schema: PathBuf,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the schema with every local $ref inlined
    Resolve {
        /// Schema file
        schema: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Check {
            schema,
            payload,
            json,
        } => run_check(&schema, &payload, json),
        Commands::Errors {
            schema,
            payload,
            path,
            pretty,
        } => run_errors(&schema, &payload, path.as_deref(), pretty),
        Commands::Flatten { schema, pretty } => run_flatten(&schema, pretty),
        Commands::Resolve {
            schema,
            output,
            pretty,
        } => run_resolve(&schema, output, pretty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn run_check(schema_path: &Path, payload_path: &Path, json_output: bool) -> Result<(), u8> {
    let root = load_root(schema_path).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;
    let payload = load_schema(payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;

    let errors = root.errors(&payload).map_err(|e| {
        report_error(json_output, &e.to_string());
        e.exit_code() as u8
    })?;

    if errors.is_empty() {
        if json_output {
            println!(r#"{{"valid":true}}"#);
        } else {
            println!("Valid");
        }
        return Ok(());
    }

    if json_output {
        let output = serde_json::json!({
            "valid": false,
            "errors": errors
        });
        println!("{}", output);
    } else {
        eprintln!("Validation failed:");
        for (path, group) in errors_by_path(&errors) {
            let field = if path.is_empty() { "(root)" } else { path };
            for error in group {
                eprintln!("  {}: [{}] {}", field, error.code, error.message);
            }
        }
    }
    Err(1)
}

fn run_errors(
    schema_path: &Path,
    payload_path: &Path,
    target: Option<&str>,
    pretty: bool,
) -> Result<(), u8> {
    let root = load(schema_path)?;
    let payload = load_schema(payload_path).map_err(|e| {
        eprintln!("Error: loading payload: {}", e);
        e.exit_code() as u8
    })?;

    let errors = match target {
        Some(target) => specific_validation_errors(&payload, root.schema(), Some(&root), target),
        None => validation_errors(&payload, root.schema(), Some(&root)),
    }
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    print_json(&errors, pretty, None)?;
    if errors.is_empty() {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_flatten(schema_path: &Path, pretty: bool) -> Result<(), u8> {
    let root = load(schema_path)?;
    let fields = flatten(&root).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    print_json(&fields, pretty, None)
}

fn run_resolve(schema_path: &Path, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let root = load(schema_path)?;
    let resolved = resolve_all_refs(root.schema(), Some(&root)).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    print_json(&resolved, pretty, output.as_deref())
}

fn load(schema_path: &Path) -> Result<RootSchema, u8> {
    load_root(schema_path).map_err(|e| {
        eprintln!("Error: loading schema: {}", e);
        e.exit_code() as u8
    })
}

fn print_json<T: Serialize>(value: &T, pretty: bool, output: Option<&Path>) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => std::fs::write(path, &json_output).map_err(|e| {
            eprintln!("Error writing to {}: {}", path.display(), e);
            3u8
        }),
        None => {
            println!("{}", json_output);
            Ok(())
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
