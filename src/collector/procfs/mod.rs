//! Readers for the Linux `/proc` filesystem.
//!
//! `parser` holds pure functions over file contents; `process` wires them to
//! a [`FileSystem`](crate::collector::traits::FileSystem) as a
//! [`ProcessTable`](crate::collector::traits::ProcessTable).

pub mod parser;
pub mod process;

pub use parser::{MemoryInfo, ParseError};
pub use process::{CollectError, ProcfsTable};
