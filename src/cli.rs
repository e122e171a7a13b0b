use crate::daemon::daemon;
use crate::forward::forward_unseen;
use crate::maildir::Maildir;
use crate::store::SeenStore;
use crate::{Evaluator, Filter, HeaderLookup as _, MailInfo, MailInfoStorage};
use anyhow::{Context as _, anyhow};
use clap::Parser;
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};

/// Script for a forward run. A script that cannot be loaded is reported and
/// the run proceeds as if none were configured.
fn load_filter(path: Option<&Path>) -> Option<Filter> {
    let path = path?;
    match Filter::load(path) {
        Ok(filter) => Some(filter),
        Err(e) => {
            log::error!("ignoring filter script: {e:#}");
            None
        }
    }
}

fn cmd_check(script: &Path) -> anyhow::Result<()> {
    let filter = Filter::load(script)?;
    println!("{:#?}", filter.program());
    Ok(())
}

fn cmd_test(script: &Path, filename: &Path, trace: bool) -> anyhow::Result<()> {
    let filter = Filter::load(script)?;
    let storage = MailInfoStorage {
        id: filename.display().to_string(),
        mail_buffer: fs::read(filename).with_context(|| format!("reading {}", filename.display()))?,
    };
    let mail_info = MailInfo::parse(&storage).ok_or_else(|| anyhow!("parse error"))?;
    let print = |line: &str| println!("  {line}");
    let evaluator = if trace {
        Evaluator::with_trace(&print)
    } else {
        Evaluator::new()
    };
    let decision = evaluator.evaluate(filter.program(), &mail_info)?;
    println!("keep:     {}", decision.should_keep());
    println!("mailbox:  {}", decision.mailbox());
    let flags: Vec<&str> = decision.flags.iter().map(String::as_str).collect();
    println!("flags:    {}", flags.join(" "));
    Ok(())
}

/// Prints every header the way `header` and `address` tests see it.
fn cmd_dump(filename: &Path) -> anyhow::Result<()> {
    let storage = MailInfoStorage {
        id: filename.display().to_string(),
        mail_buffer: fs::read(filename).with_context(|| format!("reading {}", filename.display()))?,
    };
    let mail_info = MailInfo::parse(&storage).ok_or_else(|| anyhow!("parse error"))?;
    for name in mail_info.header_names() {
        for value in mail_info.lookup_header(&name) {
            println!("{name}: {}", value.text());
            for address in value.addresses() {
                println!("    address {:?}", address.address);
            }
        }
    }
    Ok(())
}

/// One forwarding pass from the source to the destination maildir.
pub fn cmd_forward(args: &ForwardArgs) -> anyhow::Result<()> {
    let filter = load_filter(args.script.as_deref());
    let mut store = SeenStore::load(&args.db)?;
    let source = Maildir::new(&args.source);
    let dest = Maildir::new(&args.dest);
    let stats = forward_unseen(&mut store, &source, &dest, filter.as_ref())?;
    log::info!(
        "forwarded {}, discarded {}, duplicates {}",
        stats.forwarded,
        stats.discarded,
        stats.duplicates
    );
    Ok(())
}

#[derive(clap::Parser)]
#[command(version, about)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ForwardArgs {
    /// Maildir to read unseen messages from
    #[arg(long, env = "SOURCE_MAILDIR")]
    pub source: PathBuf,
    /// Maildir to deliver into
    #[arg(long, env = "DEST_MAILDIR")]
    pub dest: PathBuf,
    /// File recording already forwarded message ids
    #[arg(long, env = "DB_FILE", default_value = "sievefwd.json")]
    pub db: PathBuf,
    /// Filter script; without one every message is kept
    #[arg(long, env = "FILTER_SCRIPT")]
    pub script: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct DaemonArgs {
    #[command(flatten)]
    pub forward: ForwardArgs,
    #[arg(long = "interval", env = "SYNC_INTERVAL_MS", default_value_t = 60000)]
    pub interval_ms: u64,
    #[arg(long = "timeout", env = "PROCESS_TIMEOUT_MS", default_value_t = 60000)]
    pub timeout_ms: u64,
    #[arg(long = "status", env = "STATUS_ADDRESS", default_value = "0.0.0.0:3000")]
    pub status_address: String,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Parse a filter script and print its syntax tree
    Check { script: PathBuf },
    /// Evaluate a filter script against a message file
    Test {
        script: PathBuf,
        filename: PathBuf,
        #[arg(long)]
        trace: bool,
    },
    /// Print a message's headers as filter tests see them
    Dump { filename: PathBuf },
    /// Forward unseen messages once
    Forward(ForwardArgs),
    /// Forward periodically and serve GET /status
    Daemon(DaemonArgs),
}

pub fn xmain() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Command::Check { script } => cmd_check(&script),
        Command::Test {
            script,
            filename,
            trace,
        } => cmd_test(&script, &filename, trace),
        Command::Dump { filename } => cmd_dump(&filename),
        Command::Forward(args) => cmd_forward(&args),
        Command::Daemon(args) => daemon(&args),
    }
}
