//! Test doubles for the process layer.
//!
//! `MockFs` fakes `/proc` at the file level and is used to exercise the real
//! parsers; `MockProcessTable` fakes the process table directly, for tests
//! that need exact byte counts or injected faults on a specific read.

mod filesystem;
mod scenarios;
mod table;

pub use filesystem::MockFs;
pub use scenarios::{NOTEBOOK_KERNEL_A, NOTEBOOK_KERNEL_B};
pub use table::{Fault, MockProcessTable};
