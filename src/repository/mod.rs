mod http;
mod memory;

pub use http::HttpRepository;
pub use memory::MemoryRepository;

use std::fmt;

use async_trait::async_trait;

use crate::model::{BlockId, Interval, ScheduleKey, TimeBlock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    NotFound(BlockId),
    /// The server refused a booking that raced with someone else's.
    /// Carries the competing block when the server names it.
    Conflict(Option<BlockId>),
    Unauthorized,
    Server { status: u16, message: String },
    Transport(String),
    Decode(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::NotFound(id) => write!(f, "time block not found: {id}"),
            RepositoryError::Conflict(Some(id)) => {
                write!(f, "slot was just booked by someone else (block {id})")
            }
            RepositoryError::Conflict(None) => write!(f, "slot was just booked by someone else"),
            RepositoryError::Unauthorized => write!(f, "not authorized"),
            RepositoryError::Server { status, message } => {
                write!(f, "server error {status}: {message}")
            }
            RepositoryError::Transport(e) => write!(f, "transport error: {e}"),
            RepositoryError::Decode(e) => write!(f, "unexpected response: {e}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Persistence boundary for time blocks.
///
/// `list` returns the schedule for one (location, day) ordered by start.
/// `create` assigns the block id. Implementations own retries and timeouts.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn list(&self, key: &ScheduleKey) -> Result<Vec<TimeBlock>, RepositoryError>;

    async fn create(&self, interval: &Interval) -> Result<TimeBlock, RepositoryError>;

    async fn delete(&self, id: &BlockId) -> Result<(), RepositoryError>;
}
