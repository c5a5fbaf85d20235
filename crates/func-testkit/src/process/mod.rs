//! Process supervision.
//!
//! - `executable` - Spawning, output streaming, exit tracking
//! - `tree` - Leaf-first termination of a process and its descendants

mod executable;
pub mod tree;

pub use executable::{Executable, ExecutableOptions, ExitProbe, LineCallback, ProcessExit};
pub use tree::ProcessTree;
