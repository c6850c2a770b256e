#[derive(Debug)]
pub enum CronError {
    /// Another replica holds the lock for this occurrence. Expected outcome
    /// of the protocol, not a fault.
    AlreadyLocked,
    /// Communication with the lock store failed (or timed out).
    Store(String),
    InvalidCronExpression { expr: String, reason: String },
    /// The expression parsed but has no occurrence after the reference time.
    ScheduleExhausted { expr: String },
    /// A job with this name is already registered; the name is the sole lock
    /// identity, so a second registration would be indistinguishable.
    DuplicateJob { name: String },
}

impl std::fmt::Display for CronError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyLocked => write!(f, "lock already held by another replica"),
            Self::Store(msg) => write!(f, "lock store error: {msg}"),
            Self::InvalidCronExpression { expr, reason } => {
                write!(f, "Invalid cron expression '{expr}': {reason}")
            }
            Self::ScheduleExhausted { expr } => {
                write!(f, "cron expression '{expr}' has no future occurrence")
            }
            Self::DuplicateJob { name } => {
                write!(f, "job '{name}' is already registered")
            }
        }
    }
}

impl std::error::Error for CronError {}

impl CronError {
    /// Distinguishes the recoverable "someone else owns this occurrence"
    /// signal from genuine transport faults.
    pub fn is_already_locked(&self) -> bool {
        matches!(self, Self::AlreadyLocked)
    }
}
