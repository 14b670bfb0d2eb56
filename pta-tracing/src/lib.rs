//! Logging setup shared by the pta crates.

use ansi_term::Colour;
use std::{env, io};
use tracing::{Level, Metadata};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::MakeWriter,
};

pub fn println_yellow_err(txt: &str) {
    println_std_err(txt, Colour::Yellow);
}

fn println_std_err(txt: &str, color: Colour) {
    tracing::warn!("{}", color.paint(txt));
}

const LOG_FILTER: &str = "RUST_LOG";

// Writes ERROR and WARN level logs to stderr and everything else to stdout, so the analysis
// report on stdout stays clean.
struct StdioTracingWriter {
    writer_mode: TracingWriterMode,
}

impl<'a> MakeWriter<'a> for StdioTracingWriter {
    type Writer = Box<dyn io::Write>;

    fn make_writer(&'a self) -> Self::Writer {
        if self.writer_mode == TracingWriterMode::Stderr {
            Box::new(io::stderr())
        } else {
            // Used when there is no metadata to go by.
            Box::new(io::stdout())
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        if self.writer_mode == TracingWriterMode::Stderr
            || (self.writer_mode == TracingWriterMode::Stdio && meta.level() <= &Level::WARN)
        {
            return Box::new(io::stderr());
        }
        Box::new(io::stdout())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingWriterMode {
    /// Write ERROR and WARN to stderr and everything else to stdout.
    Stdio,
    /// Write everything to stdout.
    Stdout,
    /// Write everything to stderr.
    Stderr,
}

#[derive(Debug, Default)]
pub struct TracingSubscriberOptions {
    pub verbosity: Option<u8>,
    pub silent: Option<bool>,
    pub log_level: Option<LevelFilter>,
    pub writer_mode: Option<TracingWriterMode>,
}

impl TracingSubscriberOptions {
    /// The level requested on the command line, if any.  An explicit level wins over verbosity,
    /// which wins over silence.
    pub fn level_filter(&self) -> Option<LevelFilter> {
        self.log_level
            .or_else(|| {
                self.verbosity.and_then(|verbosity| match verbosity {
                    0 => None,
                    1 => Some(LevelFilter::DEBUG), // -v
                    _ => Some(LevelFilter::TRACE), // -vv
                })
            })
            .or_else(|| match self.silent {
                Some(true) => Some(LevelFilter::OFF),
                _ => None,
            })
    }
}

/// Install a global fmt subscriber whose output looks like plain `println!`s.
///
/// `RUST_LOG` sets the minimum level, `INFO` by default.  A level from `options` overrides it.
pub fn init_tracing_subscriber(options: TracingSubscriberOptions) {
    let env_filter = match env::var_os(LOG_FILTER) {
        Some(_) => EnvFilter::try_from_default_env().unwrap_or_else(|err| {
            eprintln!("Ignoring invalid `{LOG_FILTER}`: {err}");
            EnvFilter::new("info")
        }),
        None => EnvFilter::new("info"),
    };
    let level_filter = options.level_filter();

    let builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_level(false)
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .with_target(false)
        .with_writer(StdioTracingWriter {
            writer_mode: options.writer_mode.unwrap_or(TracingWriterMode::Stdio),
        });

    if let Some(level_filter) = level_filter {
        builder.with_max_level(level_filter).init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        let opts = |verbosity| TracingSubscriberOptions {
            verbosity: Some(verbosity),
            ..Default::default()
        };
        assert_eq!(opts(0).level_filter(), None);
        assert_eq!(opts(1).level_filter(), Some(LevelFilter::DEBUG));
        assert_eq!(opts(2).level_filter(), Some(LevelFilter::TRACE));
        assert_eq!(opts(5).level_filter(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn silent_is_overridden_by_verbosity() {
        let silent = TracingSubscriberOptions {
            silent: Some(true),
            ..Default::default()
        };
        assert_eq!(silent.level_filter(), Some(LevelFilter::OFF));

        let both = TracingSubscriberOptions {
            silent: Some(true),
            verbosity: Some(1),
            ..Default::default()
        };
        assert_eq!(both.level_filter(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn explicit_level_wins() {
        let opts = TracingSubscriberOptions {
            verbosity: Some(2),
            log_level: Some(LevelFilter::WARN),
            ..Default::default()
        };
        assert_eq!(opts.level_filter(), Some(LevelFilter::WARN));
    }
}
