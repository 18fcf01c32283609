use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::{error, warn};

use super::error::ForwardError;

/// Capped record of writes that could not be delivered.
///
/// Holds the line-protocol lines of the most recent failures, oldest evicted
/// first. With a path configured the whole log is mirrored to that file after
/// every change, one line per entry, so it can be replayed with `influx write`.
#[derive(Debug)]
pub struct DeadLetterLog {
    entries: VecDeque<String>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl DeadLetterLog {
    pub fn new(capacity: usize, path: Option<PathBuf>) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            path,
        }
    }

    pub async fn record(&mut self, line: String, cause: &ForwardError) {
        error!(target: "dead_letter", "Write lost ({}): {}", cause, line);

        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line);

        if let Some(path) = &self.path {
            let mut contents = self.entries.iter().cloned().collect::<Vec<_>>().join("\n");
            contents.push('\n');
            if let Err(e) = tokio::fs::write(path, contents).await {
                warn!("Failed to mirror dead-letter log to {}: {}", path.display(), e);
            }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
