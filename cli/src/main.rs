mod config;
mod diagnostics;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use evaluator::{Error, ErrorKind, Evaluator, Marshaler, Registry, Resource, Variables};
use tracing::debug;

use crate::config::Config;
use crate::diagnostics::Reporter;

#[derive(Parser)]
#[command(name = "sdl", version, about = "Schema definition language evaluator")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project config with variables and scoped enums (default: ./sdl.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Input variable as key=value. Repeatable; overrides the config.
    #[arg(long = "var", global = true)]
    vars: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate documents and print the resource tree as JSON
    Eval {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Evaluate documents and print them back in canonical form
    Fmt {
        #[arg(required = true)]
        files: Vec<String>,
    },

    /// Evaluate documents and report errors only
    Check {
        #[arg(required = true)]
        files: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("error: {}", e);
        process::exit(1);
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    };
    let vars = match config.variables(&cli.vars) {
        Ok(vars) => vars,
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    };

    let registry = Arc::new(Registry::default());
    let reporter = Reporter::new(cli.no_color);
    match cli.command {
        Command::Eval { files } => {
            let tree = evaluate(&files, &config, &vars, &registry, &reporter);
            match serde_json::to_string_pretty(&tree) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("error: {}", e);
                    process::exit(1);
                }
            }
        }
        Command::Fmt { files } => {
            let tree = evaluate(&files, &config, &vars, &registry, &reporter);
            let marshaler = config
                .enums
                .iter()
                .fold(Marshaler::new(Arc::clone(&registry)), |m, (path, values)| {
                    m.with_scoped_enums(path, values.iter().cloned())
                });
            print!("{}", marshaler.render(&tree));
        }
        Command::Check { files } => {
            evaluate(&files, &config, &vars, &registry, &reporter);
            eprintln!("ok: {} evaluated successfully", files.join(", "));
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Read, parse and evaluate `paths`, exiting with diagnostics on failure.
fn evaluate(
    paths: &[String],
    config: &Config,
    vars: &Variables,
    registry: &Arc<Registry>,
    reporter: &Reporter,
) -> Resource {
    let mut sources = SimpleFiles::new();
    let mut parsed = Vec::with_capacity(paths.len());
    let mut parse_errors = Vec::new();
    for path in paths {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot read '{}': {}", path, e);
                process::exit(1);
            }
        };
        let file_id = sources.add(path.clone(), source.clone());
        match sdl::parse(&source, path, file_id) {
            Ok(file) => parsed.push(file),
            Err(errors) => parse_errors.extend(errors),
        }
    }
    if !parse_errors.is_empty() {
        reporter.emit(&sources, &Error::new(ErrorKind::Parse(parse_errors)));
        process::exit(1);
    }

    let evaluator = config
        .enums
        .iter()
        .fold(Evaluator::with_registry(Arc::clone(registry)), |ev, (path, values)| {
            ev.with_scoped_enums(path, values.iter().cloned())
        });
    debug!(files = paths.len(), vars = vars.len(), "loaded sources");
    match evaluator.eval_resource(&parsed, vars) {
        Ok(tree) => tree,
        Err(e) => {
            reporter.emit(&sources, &e);
            process::exit(1);
        }
    }
}
