use std::{
    fmt,
    time::{Duration, Instant},
};

use super::error::{ExcType, Exception};

/// Largest list, string or range materialization a single operation may produce.
pub const MAX_SEQUENCE_LEN: usize = 1_000_000;

/// Largest integer a single operation may produce, in bits (64 KiB of digits).
pub const MAX_INT_BITS: u64 = 64 * 1024 * 8;

/// Wall-clock time is sampled once per this many operations.
const TIME_CHECK_INTERVAL: usize = 1024;

/// Execution budget applied to a single run.
///
/// Exceeding any limit ends the run with an exception student code cannot catch
/// (`TimeoutError`, `MemoryError`), except the call depth which raises an ordinary
/// `RecursionError` like CPython does.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Statements, loop iterations and calls executed.
    pub max_operations: usize,
    pub max_duration: Duration,
    /// Nested user function calls.
    pub max_call_depth: usize,
    /// Bytes printed to stdout.
    pub max_output_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_operations: 2_000_000,
            max_duration: Duration::from_secs(2),
            max_call_depth: 200,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl ResourceLimits {
    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = limit;
        self
    }

    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = limit;
        self
    }

    #[must_use]
    pub fn max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    #[must_use]
    pub fn max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }
}

/// A limit that was hit during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    Operation { limit: usize },
    Time { limit: Duration },
    Recursion { limit: usize },
    Sequence { len: usize },
    IntSize { bits: u64 },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { limit } => write!(f, "operation limit exceeded ({limit} steps), possible infinite loop"),
            Self::Time { limit } => write!(f, "time limit exceeded ({} ms)", limit.as_millis()),
            Self::Recursion { .. } => write!(f, "maximum recursion depth exceeded"),
            Self::Sequence { len } => write!(f, "sequence of {len} items exceeds the sandbox limit"),
            Self::IntSize { bits } => write!(f, "integer of about {bits} bits exceeds the sandbox limit"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for Exception {
    fn from(err: ResourceError) -> Self {
        let message = err.to_string();
        match err {
            ResourceError::Operation { .. } | ResourceError::Time { .. } => {
                Self::fatal(ExcType::TimeoutError, message)
            }
            ResourceError::Sequence { .. } | ResourceError::IntSize { .. } => Self::fatal(ExcType::MemoryError, message),
            ResourceError::Recursion { .. } => Self::new(ExcType::RecursionError, message),
        }
    }
}

/// Rejects a materialization longer than [`MAX_SEQUENCE_LEN`].
pub(crate) fn check_len(len: usize) -> Result<(), ResourceError> {
    if len > MAX_SEQUENCE_LEN {
        Err(ResourceError::Sequence { len })
    } else {
        Ok(())
    }
}

/// Rejects an integer result wider than [`MAX_INT_BITS`]. Callers pass an
/// estimate before computing, so the check runs ahead of the allocation.
pub(crate) fn check_int_bits(bits: u64) -> Result<(), ResourceError> {
    if bits > MAX_INT_BITS {
        Err(ResourceError::IntSize { bits })
    } else {
        Ok(())
    }
}

/// Counts work done by one run against its [`ResourceLimits`].
#[derive(Debug)]
pub(crate) struct ResourceTracker {
    limits: ResourceLimits,
    started: Instant,
    operations: usize,
    depth: usize,
}

impl ResourceTracker {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            operations: 0,
            depth: 0,
        }
    }

    pub fn tick(&mut self) -> Result<(), ResourceError> {
        self.operations += 1;
        if self.operations > self.limits.max_operations {
            return Err(ResourceError::Operation {
                limit: self.limits.max_operations,
            });
        }
        if self.operations % TIME_CHECK_INTERVAL == 0 && self.started.elapsed() > self.limits.max_duration {
            return Err(ResourceError::Time {
                limit: self.limits.max_duration,
            });
        }
        Ok(())
    }

    pub fn enter_call(&mut self) -> Result<(), ResourceError> {
        if self.depth >= self.limits.max_call_depth {
            return Err(ResourceError::Recursion {
                limit: self.limits.max_call_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn check_len(&self, len: usize) -> Result<(), ResourceError> {
        check_len(len)
    }

    pub fn operations(&self) -> usize {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_budget_is_enforced() {
        let mut tracker = ResourceTracker::new(ResourceLimits::default().max_operations(3));
        for _ in 0..3 {
            tracker.tick().expect("within budget");
        }
        let err = tracker.tick().unwrap_err();
        assert_eq!(err, ResourceError::Operation { limit: 3 });
        let exc = Exception::from(err);
        assert_eq!(exc.exc_type, ExcType::TimeoutError);
        assert!(exc.fatal);
    }

    #[test]
    fn recursion_error_is_catchable() {
        let mut tracker = ResourceTracker::new(ResourceLimits::default().max_call_depth(1));
        tracker.enter_call().expect("first call");
        let exc = Exception::from(tracker.enter_call().unwrap_err());
        assert_eq!(exc.exc_type, ExcType::RecursionError);
        assert!(!exc.fatal);
        tracker.leave_call();
        tracker.enter_call().expect("depth released");
    }

    #[test]
    fn oversized_integers_are_memory_errors() {
        check_int_bits(MAX_INT_BITS).expect("at the limit");
        let exc = Exception::from(check_int_bits(MAX_INT_BITS + 1).unwrap_err());
        assert_eq!(exc.exc_type, ExcType::MemoryError);
        assert!(exc.fatal);
    }
}
