//! Process-wide interrupt flags (C5/C7 cancellation). Reflects OS signal
//! delivery, so it has to be a process-wide flag, but call sites read it
//! through these functions rather than touching an `AtomicBool` directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

static SOFT_KILLED: AtomicBool = AtomicBool::new(false);
static HARD_KILLED: AtomicBool = AtomicBool::new(false);
static INSTALL: Once = Once::new();

/// Installs the Ctrl-C handler. First signal flips the soft flag; a second
/// flips the hard flag. Idempotent — safe to call from every entry point.
pub fn install() {
    INSTALL.call_once(|| {
        let _ = ctrlc::set_handler(|| {
            if SOFT_KILLED.swap(true, Ordering::SeqCst) {
                HARD_KILLED.store(true, Ordering::SeqCst);
            }
        });
    });
}

pub fn soft_killed() -> bool {
    SOFT_KILLED.load(Ordering::SeqCst)
}

pub fn hard_killed() -> bool {
    HARD_KILLED.load(Ordering::SeqCst)
}

/// Test-only reset, since the flags are process-wide statics.
#[cfg(test)]
pub fn reset() {
    SOFT_KILLED.store(false, Ordering::SeqCst);
    HARD_KILLED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        reset();
        assert!(!soft_killed());
        assert!(!hard_killed());
    }
}
