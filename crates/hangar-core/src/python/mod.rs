//! Isolated Python environment orchestration.

pub mod venv;

pub use venv::VenvRunner;
