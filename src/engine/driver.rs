//! Pointer movement capability
//!
//! The engine treats synthetic input as an opaque `move_by` operation
//! provided by the hosting platform. The trait is the seam: production wires
//! a real injector, development runs dry against the tracing driver.

use tracing::trace;

/// A pointer move was not carried out
#[derive(Debug, thiserror::Error)]
pub enum InjectionError {
    #[error("pointer injection rejected: {0}")]
    Rejected(String),
}

/// Relative pointer movement, fire-and-forget with a success/failure result
pub trait PointerDriver: Send + Sync {
    fn move_by(&self, dx: i32, dy: i32) -> Result<(), InjectionError>;
}

/// Dry-run driver: logs every delta instead of injecting it
#[derive(Debug, Default)]
pub struct TracingPointerDriver;

impl PointerDriver for TracingPointerDriver {
    fn move_by(&self, dx: i32, dy: i32) -> Result<(), InjectionError> {
        trace!(dx, dy, "pointer move");
        Ok(())
    }
}
