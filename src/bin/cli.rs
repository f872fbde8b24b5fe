//! TideKV CLI
//!
//! Command-line interface for a local TideKV store. One-shot subcommands
//! open the store, run one command and close it; `shell` keeps one engine
//! open for a whole session and supports transactions.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tidekv::command::{Command, Response};
use tidekv::oplog::read_entries;
use tidekv::{Config, Engine, Scalar, TideError, Transaction, Value};
use tracing_subscriber::{fmt, EnvFilter};

/// TideKV CLI
#[derive(Parser, Debug)]
#[command(name = "tidekv-cli")]
#[command(about = "CLI for the TideKV embedded key-value store")]
#[command(version)]
struct Args {
    /// Data directory holding the snapshot and the operation log
    #[arg(short, long, default_value = "./tidekv_data")]
    data_dir: PathBuf,

    /// Snapshot file (overrides the data directory)
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Operation log file (overrides the data directory)
    #[arg(long)]
    oplog: Option<PathBuf>,

    /// fsync after every write
    #[arg(long)]
    sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Set a key; a JSON object value is stored as an indexed record
    Set {
        key: String,
        value: String,

        /// Seconds until expiry; empty or absent means never
        #[arg(long, default_value = "")]
        ttl: String,
    },

    /// Get a value by key
    Get { key: String },

    /// Delete a key
    #[command(alias = "del")]
    Delete { key: String },

    /// Check whether a key exists
    Exists { key: String },

    /// List keys whose record field equals a value
    Query { field: String, value: String },

    /// Show the remaining lifetime of a key
    Ttl { key: String },

    /// Evict every expired key
    Purge,

    /// Print the operation log
    History {
        /// Only show the last N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Interactive session on one open store
    Shell,
}

fn main() {
    // Initialize tracing/logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,tidekv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> tidekv::Result<()> {
    let mut builder = Config::builder()
        .data_dir(&args.data_dir)
        .sync_writes(args.sync);
    if let Some(path) = args.snapshot {
        builder = builder.snapshot_path(path);
    }
    if let Some(path) = args.oplog {
        builder = builder.oplog_path(path);
    }
    let config = builder.build();

    match args.command {
        Commands::History { limit } => print_history(&config, limit),
        Commands::Shell => {
            let engine = Engine::open(config)?;
            shell(&engine)?;
            engine.close()
        }
        Commands::Set { key, value, ttl } => {
            let command = Command::Set {
                key,
                value: Value::parse_input(&value),
                ttl: parse_ttl(&ttl)?,
            };
            run_once(config, command)
        }
        Commands::Get { key } => run_once(config, Command::Get { key }),
        Commands::Delete { key } => run_once(config, Command::Delete { key }),
        Commands::Exists { key } => run_once(config, Command::Exists { key }),
        Commands::Query { field, value } => {
            let command = Command::Query {
                field,
                value: parse_scalar(&value),
            };
            run_once(config, command)
        }
        Commands::Ttl { key } => run_once(config, Command::Ttl { key }),
        Commands::Purge => run_once(config, Command::Purge),
    }
}

/// Open the store, execute one command, print the result
fn run_once(config: Config, command: Command) -> tidekv::Result<()> {
    let engine = Engine::open(config)?;
    print_response(engine.execute(command)?);
    engine.close()
}

// =============================================================================
// Interactive Shell
// =============================================================================

const SHELL_HELP: &str = "\
commands:
  set <key> <value> [ex <seconds>]
  get <key> | delete <key> | exists <key> | ttl <key>
  query <field> <value>
  purge
  begin | commit | abort
  help | quit";

fn shell(engine: &Engine) -> tidekv::Result<()> {
    let stdin = io::stdin();
    let mut tx: Option<Transaction<'_>> = None;

    prompt(tx.is_some())?;
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();

        if line.is_empty() {
            prompt(tx.is_some())?;
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        if let Err(e) = shell_line(engine, &mut tx, line) {
            println!("(error) {}", e);
        }
        prompt(tx.is_some())?;
    }

    if let Some(open) = tx.take() {
        println!("discarding {} uncommitted write(s)", open.len());
        open.abort();
    }
    Ok(())
}

fn shell_line<'a>(
    engine: &'a Engine,
    tx: &mut Option<Transaction<'a>>,
    line: &str,
) -> tidekv::Result<()> {
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match verb {
        "help" => println!("{}", SHELL_HELP),
        "begin" => {
            if tx.is_some() {
                return Err(TideError::Parse("transaction already open".to_string()));
            }
            *tx = Some(engine.begin());
            println!("OK");
        }
        "commit" => match tx.take() {
            Some(open) => println!("OK ({} write(s))", open.commit()?),
            None => return Err(TideError::Parse("no open transaction".to_string())),
        },
        "abort" => match tx.take() {
            Some(open) => {
                open.abort();
                println!("OK");
            }
            None => return Err(TideError::Parse("no open transaction".to_string())),
        },
        "set" => {
            let (key, value, ttl) = parse_set_args(rest)?;
            match tx.as_mut() {
                Some(open) => {
                    open.set(key, value, ttl);
                    println!("QUEUED");
                }
                None => print_response(engine.execute(Command::Set { key, value, ttl })?),
            }
        }
        "delete" | "del" => {
            let key = single_arg(verb, rest)?;
            match tx.as_mut() {
                Some(open) => {
                    open.delete(key);
                    println!("QUEUED");
                }
                None => print_response(engine.execute(Command::Delete { key })?),
            }
        }
        "get" => print_response(engine.execute(Command::Get {
            key: single_arg(verb, rest)?,
        })?),
        "exists" => print_response(engine.execute(Command::Exists {
            key: single_arg(verb, rest)?,
        })?),
        "ttl" => print_response(engine.execute(Command::Ttl {
            key: single_arg(verb, rest)?,
        })?),
        "query" => {
            let (field, value) = rest
                .split_once(' ')
                .ok_or_else(|| TideError::Parse("usage: query <field> <value>".to_string()))?;
            print_response(engine.execute(Command::Query {
                field: field.to_string(),
                value: parse_scalar(value.trim()),
            })?);
        }
        "purge" => print_response(engine.execute(Command::Purge)?),
        other => {
            return Err(TideError::Parse(format!(
                "unknown command {:?}, try `help`",
                other
            )))
        }
    }
    Ok(())
}

fn prompt(in_transaction: bool) -> io::Result<()> {
    let mut stdout = io::stdout();
    if in_transaction {
        write!(stdout, "tidekv(tx)> ")?;
    } else {
        write!(stdout, "tidekv> ")?;
    }
    stdout.flush()
}

// =============================================================================
// Parsing Helpers
// =============================================================================

/// Empty input means no expiry, not a zero TTL
fn parse_ttl(input: &str) -> tidekv::Result<Option<Duration>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let secs = input
        .parse::<f64>()
        .map_err(|e| TideError::Parse(format!("bad ttl {:?}: {}", input, e)))?;
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|e| TideError::Parse(format!("bad ttl {:?}: {}", input, e)))
}

/// JSON scalars (`30`, `true`, `"x"`) keep their type; anything else is text
fn parse_scalar(input: &str) -> Scalar {
    serde_json::from_str::<Scalar>(input).unwrap_or_else(|_| Scalar::Text(input.to_string()))
}

/// `<key> <value...> [ex <seconds>]`
fn parse_set_args(rest: &str) -> tidekv::Result<(String, Value, Option<Duration>)> {
    let (key, value) = rest
        .split_once(' ')
        .ok_or_else(|| TideError::Parse("usage: set <key> <value> [ex <seconds>]".to_string()))?;

    let value = value.trim();
    let (value, ttl) = match value.rsplit_once(" ex ") {
        Some((head, secs)) if secs.trim().parse::<f64>().is_ok() => (head.trim(), parse_ttl(secs)?),
        _ => (value, None),
    };

    Ok((key.to_string(), Value::parse_input(value), ttl))
}

fn single_arg(verb: &str, rest: &str) -> tidekv::Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(TideError::Parse(format!("usage: {} <key>", verb)));
    }
    Ok(rest.to_string())
}

// =============================================================================
// Output
// =============================================================================

fn print_response(response: Response) {
    match response {
        Response::Done => println!("OK"),
        Response::Value(Some(value)) => println!("{}", value),
        Response::Value(None) => println!("(nil)"),
        Response::Exists(found) => println!("{}", found),
        Response::Keys(keys) if keys.is_empty() => println!("(empty)"),
        Response::Keys(keys) => {
            for (i, key) in keys.iter().enumerate() {
                println!("{}) {}", i + 1, key);
            }
        }
        Response::Ttl(Some(left)) => println!("{:.3}s", left.as_secs_f64()),
        Response::Ttl(None) => println!("(none)"),
        Response::Purged(count) => println!("purged {}", count),
    }
}

fn print_history(config: &Config, limit: Option<usize>) -> tidekv::Result<()> {
    let entries = read_entries(&config.oplog_path)?;
    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));

    for entry in entries.iter().skip(skip) {
        let value = entry.value.as_ref().map(Value::to_string).unwrap_or_default();
        let ttl = entry
            .ttl
            .map(|t| format!(" ttl={}s", t.as_secs_f64()))
            .unwrap_or_default();
        println!("{} {} {} {}{}", entry.timestamp_ms, entry.kind, entry.key, value, ttl);
    }
    Ok(())
}
