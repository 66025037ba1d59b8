use crate::error::SchedulingError;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A caller-supplied "should I stop now?" predicate.
///
/// Polled before every simulation step and between root-finder iterations.
#[derive(Clone)]
pub struct Interrupter(Arc<dyn Fn() -> bool + Send + Sync>);

impl Interrupter {
    pub fn new(predicate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Never interrupts.
    pub fn never() -> Self {
        Self::new(|| false)
    }

    /// Interrupts once `flag` is set.
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self::new(move || flag.load(Ordering::SeqCst))
    }

    pub fn is_interrupted(&self) -> bool {
        (self.0)()
    }

    /// Fails with [SchedulingError::Interrupted] if the predicate is true.
    pub fn check(&self) -> Result<(), SchedulingError> {
        if self.is_interrupted() {
            Err(SchedulingError::Interrupted)
        } else {
            Ok(())
        }
    }
}

impl Default for Interrupter {
    fn default() -> Self {
        Self::never()
    }
}

impl Debug for Interrupter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Interrupter").finish_non_exhaustive()
    }
}
