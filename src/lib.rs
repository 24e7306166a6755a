pub mod error;
pub mod config;
pub mod persist;
pub mod security;
pub mod paths;
pub mod history;
pub mod users;
pub mod engine;
pub mod diff;
pub mod service;
pub mod server;

#[cfg(test)]
mod test_support;

pub use error::{AppError, AppResult};
pub use service::SyncService;

// Test-only printing helper: prints during tests and debug builds, no-op otherwise.
// Usage in tests: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        if false { let _ = format!($($arg)*); }
    });
}
