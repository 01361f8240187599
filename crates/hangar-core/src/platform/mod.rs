//! Platform-specific process and filesystem abstractions.

pub mod fs;
pub mod process;

pub use fs::{create_dir_link, remove_dir_all_with_retry};
pub use process::{is_process_alive, terminate_process_tree};
