//! Best-effort operator interrupt.
//!
//! The handler only flips a flag; the control loops notice it at the next
//! safe point and persist an interrupted snapshot before exiting. An
//! in-flight worker invocation is not aborted.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Install the Ctrl+C handler. Call once, before the project loop starts.
pub fn install_handler() -> Result<()> {
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst))
        .context("set Ctrl+C handler")
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the flag. Only tests drive repeated runs in one process.
#[doc(hidden)]
pub fn clear() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
