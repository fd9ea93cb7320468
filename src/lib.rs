//! Integration test harness for the PagePilot workspace.
//!
//! The implementation lives in the member crates under `crates/`; this
//! package only hosts the cross-crate scenario tests in `tests/`.
