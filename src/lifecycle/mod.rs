//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl-C received → trigger broadcast
//!         → health monitor loop exits
//!         → config watcher loop exits
//!         → admin server stops accepting and drains
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
