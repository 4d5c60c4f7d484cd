use std::io::Write;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use tokio::sync::broadcast;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::LoggingConfig;

/// Buffered log lines kept for slow `/api/logs/stream` subscribers.
pub const LOG_CHANNEL_CAPACITY: usize = 500;

/// Tees formatted log output to stdout and, one event line per message, to
/// the channel behind the SSE log stream.
#[derive(Clone)]
pub struct LogTee {
    feed: broadcast::Sender<String>,
    stdout: bool,
}

impl LogTee {
    pub fn new(feed: broadcast::Sender<String>, stdout: bool) -> Self {
        Self { feed, stdout }
    }

    fn publish(&self, buf: &[u8]) {
        // Formatting is skipped entirely while nobody is streaming.
        if self.feed.receiver_count() == 0 {
            return;
        }
        for line in String::from_utf8_lossy(buf).lines() {
            let line = line.trim_end();
            if !line.is_empty() {
                let _ = self.feed.send(line.to_string());
            }
        }
    }
}

impl<'a> MakeWriter<'a> for LogTee {
    type Writer = LogTee;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for LogTee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.publish(buf);
        if self.stdout {
            std::io::stdout().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if self.stdout {
            std::io::stdout().flush()?;
        }
        Ok(())
    }
}

pub fn parse_level(raw: &str) -> Result<Level> {
    Level::from_str(raw.trim()).map_err(|_| anyhow!("unknown log level '{}'", raw))
}

/// Install the process-wide subscriber. Returns the sender feeding the SSE stream.
pub fn init(config: &LoggingConfig) -> Result<broadcast::Sender<String>> {
    let (log_tx, _) = broadcast::channel::<String>(LOG_CHANNEL_CAPACITY);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&config.level)?)
        .with_ansi(false)
        .with_writer(LogTee::new(log_tx.clone(), config.stdout))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(log_tx)
}
