//! A content-addressed patcher for a Toontown Rewritten-style game
//! install, plus the ambient login/credential/menu collaborators that
//! make the CLI runnable end to end.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod platform;
pub mod hash;
pub mod compress;
pub mod mirror;
pub mod config;
pub mod http;
pub mod manifest;
pub mod planner;
pub mod progress;
pub mod pool;
pub mod executor;
pub mod driver;

// Login/credential/menu collaborators: small modules, but real ones --
// `menu::run_interactive` is what `main.rs` calls for a normal (non
// `--patch-only`) run.
pub mod login;
pub mod credentials;
pub mod menu;
