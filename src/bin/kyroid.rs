//! Kyroid command line
//!
//! Runs identity operations against a roster kept in a data directory.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use kyroid::storage::{open_snapshot_store, PersistentConfig};
use kyroid::{EngineConfig, RosterEngine};

const DEFAULT_DATA_DIR: &str = "./kyroid-data";

/// Parsed command line.
struct Args {
    /// Data directory; overrides the config file
    data_dir: Option<PathBuf>,
    /// Optional TOML config file
    config: Option<PathBuf>,
    /// Threshold override for `duplicates`
    threshold: Option<f64>,
    command: Command,
}

enum Command {
    Resolve { name: String },
    List,
    Merge { from: String, to: String },
    Rename { current: String, new_canonical: String },
    MergeFinal { from: String, to: String, final_name: String },
    Unmerge { alias: String },
    Duplicates,
    Import { file: PathBuf },
    Export,
}

fn usage() {
    println!("kyroid - identity resolution for performance rosters");
    println!();
    println!("USAGE:");
    println!("    kyroid [OPTIONS] <COMMAND>");
    println!();
    println!("COMMANDS:");
    println!("    resolve <NAME>                    Print the canonical name for NAME");
    println!("    list                              List identities and their aliases");
    println!("    merge <FROM> <TO>                 Merge FROM's identity into TO's");
    println!("    rename <CURRENT> <ALIAS>          Promote ALIAS to canonical name");
    println!("    merge-final <FROM> <TO> <FINAL>   Merge and choose the final name");
    println!("    unmerge <ALIAS>                   Split ALIAS into its own identity (irreversible)");
    println!("    duplicates                        List likely duplicate identities");
    println!("    import <FILE>                     Reconcile a JSON roster into this one");
    println!("    export                            Print the roster as JSON");
    println!();
    println!("OPTIONS:");
    println!("    -d, --data-dir <DIR>      Data directory [default: {DEFAULT_DATA_DIR}]");
    println!("    -c, --config <FILE>       TOML config file");
    println!("    -t, --threshold <SCORE>   Duplicate threshold for `duplicates`");
    println!("    -h, --help                Print help information");
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut data_dir = None;
    let mut config = None;
    let mut threshold = None;
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" | "-d" => {
                let value = args.get(i + 1).unwrap_or_else(|| fail("--data-dir requires a value"));
                data_dir = Some(PathBuf::from(value));
                i += 2;
            }
            "--config" | "-c" => {
                let value = args.get(i + 1).unwrap_or_else(|| fail("--config requires a value"));
                config = Some(PathBuf::from(value));
                i += 2;
            }
            "--threshold" | "-t" => {
                let value = args.get(i + 1).unwrap_or_else(|| fail("--threshold requires a value"));
                let parsed: f64 = value
                    .parse()
                    .unwrap_or_else(|_| fail(&format!("invalid threshold: {value}")));
                threshold = Some(parsed);
                i += 2;
            }
            "--help" | "-h" => {
                usage();
                process::exit(0);
            }
            arg if arg.starts_with('-') => fail(&format!("unknown argument: {arg}")),
            arg => {
                positional.push(arg.to_string());
                i += 1;
            }
        }
    }

    let command = parse_command(positional);
    Args {
        data_dir,
        config,
        threshold,
        command,
    }
}

fn parse_command(positional: Vec<String>) -> Command {
    let mut words = positional.into_iter();
    let Some(name) = words.next() else {
        usage();
        process::exit(1);
    };
    let rest: Vec<String> = words.collect();
    let expect = |n: usize| {
        if rest.len() != n {
            fail(&format!("`{name}` takes {n} argument(s), got {}", rest.len()));
        }
    };

    match name.as_str() {
        "resolve" => {
            expect(1);
            Command::Resolve { name: rest[0].clone() }
        }
        "list" => {
            expect(0);
            Command::List
        }
        "merge" => {
            expect(2);
            Command::Merge { from: rest[0].clone(), to: rest[1].clone() }
        }
        "rename" => {
            expect(2);
            Command::Rename { current: rest[0].clone(), new_canonical: rest[1].clone() }
        }
        "merge-final" => {
            expect(3);
            Command::MergeFinal {
                from: rest[0].clone(),
                to: rest[1].clone(),
                final_name: rest[2].clone(),
            }
        }
        "unmerge" => {
            expect(1);
            Command::Unmerge { alias: rest[0].clone() }
        }
        "duplicates" => {
            expect(0);
            Command::Duplicates
        }
        "import" => {
            expect(1);
            Command::Import { file: PathBuf::from(&rest[0]) }
        }
        "export" => {
            expect(0);
            Command::Export
        }
        other => fail(&format!("unknown command: {other}")),
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let data_dir = args
        .data_dir
        .or_else(|| config.storage.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

    tracing::debug!(data_dir = %data_dir.display(), "opening roster");
    let store = open_snapshot_store(
        &data_dir,
        Some(PersistentConfig {
            sync_on_write: config.storage.sync_on_write,
        }),
    )?;
    let engine = RosterEngine::new(Arc::new(store), config);

    match args.command {
        Command::Resolve { name } => println!("{}", engine.resolve(&name)?),
        Command::List => {
            for identity in engine.identities()? {
                if identity.aliases.is_empty() {
                    println!("{}", identity.canonical_name);
                } else {
                    println!("{} ({})", identity.canonical_name, identity.aliases.join(", "));
                }
            }
        }
        Command::Merge { from, to } => {
            let outcome = engine.merge(&from, &to)?;
            println!(
                "merged {} into {} ({} record(s) moved)",
                outcome.absorbed, outcome.canonical, outcome.records_moved
            );
        }
        Command::Rename { current, new_canonical } => {
            let relabeled = engine.rename_canonical(&current, &new_canonical)?;
            println!("renamed {current} to {new_canonical} ({relabeled} record(s) relabeled)");
        }
        Command::MergeFinal { from, to, final_name } => {
            let canonical = engine.merge_with_final_name(&from, &to, &final_name)?;
            println!("merged {from} and {to} as {canonical}");
        }
        Command::Unmerge { alias } => {
            engine.unmerge_alias(&alias)?;
            println!("{}", unmerge_notice(&alias));
        }
        Command::Duplicates => {
            for candidate in engine.find_duplicates(args.threshold)? {
                println!(
                    "{:.3}  {} ({})  ~  {} ({})",
                    candidate.score,
                    candidate.name_a,
                    candidate.records_a,
                    candidate.name_b,
                    candidate.records_b
                );
            }
        }
        Command::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let result = engine.reconcile_json(&text)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Export => println!("{}", engine.export_json()?),
    }
    Ok(())
}

fn unmerge_notice(alias: &str) -> String {
    format!(
        "split {alias} into its own identity\n\
         records filed under {alias} stay with its former owner; this split cannot be undone"
    )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
