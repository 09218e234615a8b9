//! Operation kinds and diagnostic payloads

use std::fmt;
use std::sync::Arc;

/// Kind of transactional operation being timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Shared read transaction
    Read,
    /// Exclusive write transaction
    Write,
}

impl OpKind {
    /// Name used in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Read => "View",
            OpKind::Write => "Update",
        }
    }

    /// Whether this operation takes the store's write lock
    pub fn is_exclusive(&self) -> bool {
        matches!(self, OpKind::Write)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque caller-supplied value attached to a write
///
/// Rendered verbatim with its `Debug` form in slow-call diagnostics.
pub type Payload = Arc<dyn fmt::Debug + Send + Sync>;

/// Wrap a value as a [`Payload`]
pub fn payload<T>(value: T) -> Payload
where
    T: fmt::Debug + Send + Sync + 'static,
{
    Arc::new(value)
}
