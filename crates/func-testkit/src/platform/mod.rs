//! Platform abstraction layer for cross-platform compatibility.
//!
//! All `#[cfg]` blocks for OS-specific process behavior live here rather than
//! being scattered throughout the codebase.
//!
//! - `parent` - Parent-pid resolution and process enumeration
//! - `process` - Liveness checks and termination

pub mod parent;
pub mod process;

pub use parent::{platform_lookup, running_pids, ParentLookup};
pub use process::{is_process_alive, kill_process};
