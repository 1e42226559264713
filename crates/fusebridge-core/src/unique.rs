use fusebridge_types::Unique;

use crate::error::{ChannelError, Result};

/// Hands out request IDs for one connection.
///
/// IDs count up from 1. After `u32::MAX` the counter wraps back to 1 and from
/// then on skips any value still held by an in-flight request. Zero is never
/// returned.
#[derive(Debug)]
pub(crate) struct UniqueAllocator {
    next: u32,
    wrapped: bool,
}

impl Default for UniqueAllocator {
    fn default() -> Self {
        Self {
            next: 1,
            wrapped: false,
        }
    }
}

impl UniqueAllocator {
    #[cfg(test)]
    pub(crate) fn starting_at(next: u32) -> Self {
        Self {
            next: next.max(1),
            wrapped: false,
        }
    }

    /// `in_flight` is the number of IDs currently held; `in_use` tells
    /// whether a particular one is.
    pub(crate) fn allocate(&mut self, in_flight: usize, in_use: impl Fn(Unique) -> bool) -> Result<Unique> {
        if in_flight >= u32::MAX as usize {
            return Err(ChannelError::IdSpaceExhausted);
        }
        loop {
            let candidate = Unique(self.next);
            self.advance();
            // Before the first wrap every value is fresh.
            if !self.wrapped || !in_use(candidate) {
                return Ok(candidate);
            }
        }
    }

    fn advance(&mut self) {
        self.next = match self.next.checked_add(1) {
            Some(next) => next,
            None => {
                self.wrapped = true;
                1
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_one() {
        let mut ids = UniqueAllocator::default();
        assert_eq!(ids.allocate(0, |_| false).unwrap(), Unique(1));
        assert_eq!(ids.allocate(1, |_| false).unwrap(), Unique(2));
    }

    #[test]
    fn test_wrap_skips_zero() {
        let mut ids = UniqueAllocator::starting_at(u32::MAX);
        assert_eq!(ids.allocate(0, |_| false).unwrap(), Unique(u32::MAX));
        assert_eq!(ids.allocate(0, |_| false).unwrap(), Unique(1));
    }

    #[test]
    fn test_wrap_skips_in_use() {
        let mut ids = UniqueAllocator::starting_at(u32::MAX - 1);
        ids.allocate(0, |_| false).unwrap();
        ids.allocate(0, |_| false).unwrap();
        let held = [Unique(1), Unique(2), Unique(4)];
        let in_use = |u: Unique| held.contains(&u);
        assert_eq!(ids.allocate(3, in_use).unwrap(), Unique(3));
        assert_eq!(ids.allocate(3, in_use).unwrap(), Unique(5));
    }

    #[test]
    fn test_exhausted() {
        let mut ids = UniqueAllocator::default();
        assert_eq!(
            ids.allocate(u32::MAX as usize, |_| true),
            Err(ChannelError::IdSpaceExhausted)
        );
    }
}
