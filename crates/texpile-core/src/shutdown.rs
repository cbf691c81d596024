//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Route SIGINT/SIGTERM to the shutdown flag.
///
/// First signal: workers finish their current member and drop the in-flight
/// shard. Second signal: exit immediately with 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        // SAFETY: AtomicBool::swap and low_level::exit (`_exit`) are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    signal_hook::low_level::exit(130);
                }
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_install_without_tripping_the_flag() {
        install_signal_handlers().unwrap();
        install_signal_handlers().unwrap();
        assert!(!is_shutdown_requested());
    }
}
