//! Process supervision and console-output parsing.

pub mod console;
pub mod supervisor;

pub use console::{ConsoleOutputParser, StartupEvent};
pub use supervisor::{ProcessEvent, ProcessState, ProcessSupervisor};
