//! Process-wide panic hook
//!
//! Call `install_panic_handler()` early in main():
//!
//! ```no_run
//! use costflow_core::resilience::install_panic_handler;
//!
//! fn main() {
//!     install_panic_handler();
//! }
//! ```

use std::panic;
use std::process;
use tracing::error;

/// Log panics through tracing, then exit non-zero
///
/// A panicking worker would otherwise die silently while its unit stays
/// counted as in flight. This does NOT catch panics.
pub fn install_panic_handler() {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "<unknown location>".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "<no message>".to_string()
        };

        let thread = std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string();

        error!(%location, %message, %thread, "PANIC: recalculation engine crashed");
        eprintln!("FATAL PANIC in thread '{}' at {}: {}", thread, location, message);

        default_hook(panic_info);

        // Give tracing time to flush
        std::thread::sleep(std::time::Duration::from_millis(100));
        process::exit(1);
    }));

    tracing::info!("Panic handler installed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_handler_installation() {
        install_panic_handler();
        // Installing twice replaces the previous hook
        install_panic_handler();
        // Leave the default hook in place for the rest of the test binary
        let _ = panic::take_hook();
    }
}
