//! Process-wide shutdown request flag.
//!
//! The signal handler does exactly one thing: set an atomic flag. The
//! reactor reads the flag once per wait cycle; the signal interrupting the
//! blocked poll call is what makes the request visible promptly. No
//! cleanup logic runs in interrupt context.

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Register SIGINT and SIGTERM handlers that set the returned flag.
pub fn install() -> io::Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    flag::register(SIGINT, Arc::clone(&stop))?;
    flag::register(SIGTERM, Arc::clone(&stop))?;
    Ok(stop)
}
