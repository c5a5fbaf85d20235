//! Command-line option model.
//!
//! Parses the switch grammar understood by `func` (`-s`, `--switch`, `/s`,
//! `-s+`, `-s:value`, `--s=value`, bare commands) into [`CommandOption`]s and
//! turns them back into an argument vector without loss.
//!
//! # Example
//!
//! ```rust
//! use func_testkit::cmdline;
//!
//! let options = cmdline::parse(["start", "--port", "7072", "--verbose"]);
//! assert_eq!(options[1].key(), "port");
//! assert_eq!(options[1].value(), Some("7072"));
//!
//! let args = cmdline::serialize(&options);
//! assert_eq!(cmdline::parse(&args), options);
//! ```

mod option;
mod parser;

pub use option::{CommandOption, FALSE_VALUE, TRUE_VALUE};
pub use parser::{is_switch, parse, serialize, to_command_line, END_OF_OPTIONS};
