// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::select;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use evetail::config::ImportConfig;
use evetail::error::{Error, Result};
use evetail::import::Importer;
use evetail::sink::NdjsonSink;

#[derive(Debug, Parser)]
#[command(name = "evetail")]
#[command(version, about, long_about = None)]
struct Arguments {
    /// The EVE log file to follow
    input: PathBuf,

    /// Start at the end of the file when no valid bookmark exists
    #[arg(long, env = "EVETAIL_END", default_value = "false")]
    end: bool,

    /// One shot mode (exit on end of data)
    #[arg(long, env = "EVETAIL_ONESHOT", default_value = "false")]
    oneshot: bool,

    /// Record reader position so a restart resumes where it left off
    #[arg(long, env = "EVETAIL_BOOKMARK", default_value = "false")]
    bookmark: bool,

    /// Path to the bookmark file (defaults to <INPUT>.bookmark)
    #[arg(long, env = "EVETAIL_BOOKMARK_PATH")]
    bookmark_path: Option<PathBuf>,

    /// Write imported events to this file instead of stdout
    #[arg(long, env = "EVETAIL_OUTPUT")]
    output: Option<PathBuf>,

    /// Sleep this long after reaching end of data before retrying
    #[arg(long, env = "EVETAIL_BACKOFF", default_value = "100ms")]
    backoff: humantime::Duration,

    /// Interval between stats lines and sink flushes
    #[arg(long, env = "EVETAIL_STATS_INTERVAL", default_value = "1s")]
    stats_interval: humantime::Duration,

    /// Verbose output
    #[arg(short, long, env = "EVETAIL_VERBOSE", default_value = "false")]
    verbose: bool,
}

impl Arguments {
    fn into_config(self) -> ImportConfig {
        ImportConfig {
            input: self.input,
            end: self.end,
            oneshot: self.oneshot,
            bookmark: self.bookmark,
            bookmark_path: self.bookmark_path,
            output: self.output,
            backoff: self.backoff.into(),
            stats_interval: self.stats_interval.into(),
        }
    }
}

fn main() -> ExitCode {
    let opt = Arguments::parse();
    setup_logging(opt.verbose);

    match run_import(opt) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Failed to run import.");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run_import(opt: Arguments) -> Result<()> {
    let config = opt.into_config();
    let sink = NdjsonSink::create(config.output.as_deref())?;
    let mut importer = Importer::new(config, sink)?;

    let cancel = CancellationToken::new();

    // The import loop is blocking by design; run it off the runtime and
    // keep this task free to wait on shutdown signals.
    let loop_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || importer.run(loop_cancel));

    let joined = select! {
        _ = signal_wait() => {
            info!("Shutdown signal received.");
            cancel.cancel();
            (&mut handle).await
        }
        joined = &mut handle => joined,
    };

    let stats = joined.map_err(|e| Error::Io(std::io::Error::other(e)))??;
    info!(
        total = stats.total,
        malformed = stats.malformed,
        "Import finished."
    );
    Ok(())
}

async fn signal_wait() {
    let mut sig_term = sig(SignalKind::terminate());
    let mut sig_int = sig(SignalKind::interrupt());

    select! {
        _ = sig_term.recv() => {},
        _ = sig_int.recv() => {},
    }
}

fn sig(kind: SignalKind) -> Signal {
    signal(kind).unwrap()
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("EVETAIL_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_level(true)
        .compact();

    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).unwrap();
}
