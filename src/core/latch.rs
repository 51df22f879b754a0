//! Single-fire latch used for per-step completion signals and for settling
//! the coordinator.

use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be tripped exactly once.
///
/// `trip` returns `true` only for the caller that flipped it; every other
/// caller, concurrent or later, gets `false`.
#[derive(Debug, Default)]
pub struct Latch {
    fired: AtomicBool,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch, reporting whether this call was the first
    pub fn trip(&self) -> bool {
        self.fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_tripped(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_trips_once() {
        let latch = Latch::new();
        assert!(!latch.is_tripped());
        assert!(latch.trip());
        assert!(latch.is_tripped());
        assert!(!latch.trip());
    }

    #[test]
    fn test_single_winner_across_threads() {
        let latch = Arc::new(Latch::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let latch = latch.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    if latch.trip() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
