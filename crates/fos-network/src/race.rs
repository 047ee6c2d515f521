//! First-Success Race
//!
//! Runs several independent fallible operations concurrently, each
//! under its own deadline, and settles on the first one to succeed.
//! Losers are aborted once a winner exists; if every entrant fails
//! the race fails with the full list of per-entrant failures.
//!
//! Ties are decided by completion order, never by list order.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, trace};

/// One contender: a label, its own deadline and the work to run.
pub struct Entrant<F> {
    /// Identifies the entrant in logs and results
    pub label: String,
    /// Per-entrant deadline
    pub timeout: Duration,
    /// The operation itself
    pub future: F,
}

impl<F> Entrant<F> {
    /// Create a new entrant
    pub fn new(label: impl Into<String>, timeout: Duration, future: F) -> Self {
        Self {
            label: label.into(),
            timeout,
            future,
        }
    }
}

/// Winning entrant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Win<T> {
    /// Label of the entrant that won
    pub label: String,
    /// Its value
    pub value: T,
}

/// Why a single entrant lost
#[derive(Debug)]
pub enum Failure<E> {
    /// The operation returned an error
    Failed(E),
    /// The deadline elapsed first
    TimedOut(Duration),
    /// The task panicked or was cancelled by the runtime
    Aborted,
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::TimedOut(after) => write!(f, "timed out after {:?}", after),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Race outcome when nobody won
#[derive(Debug, Error)]
pub enum RaceError<E: fmt::Debug + fmt::Display> {
    #[error("All {} entrants failed", .0.len())]
    AllFailed(Vec<(String, Failure<E>)>),
}

impl<E: fmt::Debug + fmt::Display> RaceError<E> {
    /// Per-entrant failures, in completion order
    pub fn failures(&self) -> &[(String, Failure<E>)] {
        match self {
            Self::AllFailed(failures) => failures,
        }
    }
}

/// Run all entrants concurrently and return the first success.
///
/// Must be called from within a tokio runtime.
pub async fn first_success<T, E, F>(entrants: Vec<Entrant<F>>) -> Result<Win<T>, RaceError<E>>
where
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Debug + fmt::Display + Send + 'static,
{
    let mut set = JoinSet::new();

    for entrant in entrants {
        let Entrant {
            label,
            timeout,
            future,
        } = entrant;

        set.spawn(async move {
            let outcome = match tokio::time::timeout(timeout, future).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(Failure::Failed(e)),
                Err(_) => Err(Failure::TimedOut(timeout)),
            };
            (label, outcome)
        });
    }

    let mut failures = Vec::new();

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((label, Ok(value))) => {
                trace!("Race won by {} ({} still pending)", label, set.len());
                set.abort_all();
                return Ok(Win { label, value });
            }
            Ok((label, Err(failure))) => {
                debug!("Race entrant {} lost: {}", label, failure);
                failures.push((label, failure));
            }
            Err(e) => {
                debug!("Race entrant task ended abnormally: {}", e);
                failures.push((String::from("<aborted>"), Failure::Aborted));
            }
        }
    }

    Err(RaceError::AllFailed(failures))
}
