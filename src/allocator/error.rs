use std::path::PathBuf;

/// Errors surfaced by the plot allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocatorError {
    /// A durable read or write failed. The attempted change was not committed.
    StorageIo(PathBuf, String),
    /// A reservation log line could not be understood. `load` skips these.
    CorruptLogEntry { line: usize, reason: String },
    /// Spacing or spawn exclusion make progress impossible.
    ExhaustedConfiguration(String),
    /// A write that would break the reservation state machine.
    InvalidTransition(String),
    /// Config file unreadable or malformed.
    Config(String),
    /// A caller panicked while holding the allocator lock.
    Poisoned,
}

impl std::fmt::Display for AllocatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocatorError::StorageIo(path, msg) => {
                write!(f, "reservation storage failed for {}: {}", path.display(), msg)
            }
            AllocatorError::CorruptLogEntry { line, reason } => {
                write!(f, "corrupt reservation log entry at line {}: {}", line, reason)
            }
            AllocatorError::ExhaustedConfiguration(msg) => {
                write!(f, "allocator configuration leaves no usable plots: {}", msg)
            }
            AllocatorError::InvalidTransition(msg) => write!(f, "invalid transition: {}", msg),
            AllocatorError::Config(msg) => write!(f, "allocator config error: {}", msg),
            AllocatorError::Poisoned => write!(f, "allocator lock poisoned"),
        }
    }
}

impl std::error::Error for AllocatorError {}

impl From<AllocatorError> for String {
    fn from(err: AllocatorError) -> Self {
        err.to_string()
    }
}
