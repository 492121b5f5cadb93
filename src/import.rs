// SPDX-License-Identifier: Apache-2.0

//! The import loop: drive the following reader into a sink, with periodic
//! stats, flush cadence, end-of-data back-off, and bookmarking.

use std::thread;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bookmark::Bookmarker;
use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::reader::{FollowingReader, ReadOutcome};
use crate::sink::EventSink;

/// Totals for a completed run.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportStats {
    pub total: u64,
    pub malformed: u64,
}

pub struct Importer<S> {
    config: ImportConfig,
    reader: FollowingReader,
    bookmarker: Option<Bookmarker>,
    sink: S,
}

impl<S: EventSink> Importer<S> {
    /// Open the input and position the reader. Failures here are fatal.
    pub fn new(config: ImportConfig, sink: S) -> Result<Self> {
        config.validate().map_err(Error::Config)?;

        let mut reader = match FollowingReader::open(&config.input) {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound(config.input.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let bookmarker = if config.bookmark {
            let bookmarker = Bookmarker::new(config.bookmark_path());
            bookmarker.init(&mut reader, config.end)?;
            Some(bookmarker)
        } else {
            if config.end {
                info!(path = %reader.path().display(), "jumping to end of file");
                reader.skip_to_end()?;
            }
            None
        };

        Ok(Self {
            config,
            reader,
            bookmarker,
            sink,
        })
    }

    /// Run until cancellation, or until the first end of data in oneshot
    /// mode. The sink is flushed once more on exit.
    pub fn run(&mut self, cancel: CancellationToken) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        let mut last_stats_at = Instant::now();
        let mut last_total = 0u64;
        let mut eofs = 0u64;
        // Rate-limit repeated failure logging to once per stats interval.
        let mut warned_malformed = false;
        let mut warned_bookmark = false;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let mut eof = false;
            match self.reader.next() {
                ReadOutcome::Event(event) => match self.sink.add(event) {
                    Ok(()) => {
                        stats.total += 1;
                        if let Err(e) = self.write_bookmark() {
                            if !warned_bookmark {
                                warn!(error = %e, "failed to write bookmark, continuing");
                                warned_bookmark = true;
                            }
                        }
                    }
                    Err(e) => {
                        // Not delivered: the bookmark stays behind this
                        // event, so a restart replays it.
                        warn!(error = %e, "sink rejected event");
                    }
                },
                ReadOutcome::Malformed(err) => {
                    stats.malformed += 1;
                    if !warned_malformed {
                        warn!(error = %err, "skipping malformed event");
                        warned_malformed = true;
                    }
                }
                ReadOutcome::EndOfData => {
                    eof = true;
                    eofs += 1;
                }
                ReadOutcome::Io(e) => {
                    warn!(
                        path = %self.reader.path().display(),
                        error = %e,
                        "read error, retrying"
                    );
                    thread::sleep(self.config.backoff);
                }
            }

            if last_stats_at.elapsed() >= self.config.stats_interval {
                let elapsed = last_stats_at.elapsed().as_secs_f64();
                let delta = stats.total - last_total;
                let rate = delta as f64 / elapsed;
                info!(
                    total = stats.total,
                    delta,
                    rate,
                    eofs,
                    malformed = stats.malformed,
                    epoch = self.reader.epoch(),
                    "import progress"
                );
                last_stats_at = Instant::now();
                last_total = stats.total;
                eofs = 0;
                warned_malformed = false;
                warned_bookmark = false;

                // Flush at least as often as stats are emitted.
                if let Err(e) = self.sink.flush() {
                    warn!(error = %e, "sink flush failed, retrying next interval");
                }
            }

            if eof {
                if self.config.oneshot {
                    break;
                }
                if let Err(e) = self.sink.flush() {
                    warn!(error = %e, "sink flush failed, retrying next interval");
                }
                if cancel.is_cancelled() {
                    break;
                }
                thread::sleep(self.config.backoff);
            }
        }

        self.sink.flush()?;
        debug!(
            total = stats.total,
            malformed = stats.malformed,
            "import loop exited"
        );
        Ok(stats)
    }

    fn write_bookmark(&mut self) -> Result<()> {
        if let Some(ref bookmarker) = self.bookmarker {
            let bookmark = bookmarker.get(&self.reader)?;
            bookmarker.write(&bookmark)?;
        }
        Ok(())
    }
}
