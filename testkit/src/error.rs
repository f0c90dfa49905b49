use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::interrupt::Interrupted;

#[derive(Debug, Error)]
pub enum Error {
    /// A blocking helper was interrupted. The interrupt status has been
    /// restored on the thread before this error was returned.
    #[error("interrupted during {during}")]
    Interrupted {
        during: &'static str,
        #[source]
        source: Interrupted,
    },
    #[error("timed out after {budget:?}")]
    TimedOut { budget: Duration },
    #[error("invalid thread name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("executor has been shut down")]
    Rejected,
    #[error("worker dropped the task without completing it")]
    WorkerLost,
}

impl Error {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}
