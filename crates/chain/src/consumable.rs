use crate::error::ChainError;
use std::sync::atomic::{AtomicBool, Ordering};

/// A one-shot guard embedded in every builder.
///
/// Operations that produce a new builder or terminate a chain call [`consume`](Self::consume)
/// before doing anything else; operations that only spawn endpoints call
/// [`check_usable`](Self::check_usable).
#[derive(Debug)]
pub struct Consumable {
    builder: &'static str,
    consumed: AtomicBool,
}

impl Consumable {
    pub fn new(builder: &'static str) -> Self {
        Self { builder, consumed: AtomicBool::new(false) }
    }

    pub fn check_usable(&self) -> Result<(), ChainError> {
        if self.is_consumed() {
            return Err(ChainError::UseAfterConsume { builder: self.builder });
        }
        Ok(())
    }

    /// Marks the guard consumed. Only the first call succeeds.
    pub fn consume(&self) -> Result<(), ChainError> {
        self.consumed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ChainError::UseAfterConsume { builder: self.builder })
    }

    #[inline]
    pub fn is_consumed(&self) -> bool {
        self.consumed.load(Ordering::Acquire)
    }
}
