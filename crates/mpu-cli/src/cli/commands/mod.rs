//! CLI command handlers, one file per command.

mod completions;
mod control;
mod man;
mod plan;
mod upload;

pub use crate::cli::control_socket::ControlAction;
pub use completions::run_completions;
pub use control::run_control;
pub use man::run_man;
pub use plan::{parse_size, run_plan};
pub use upload::{read_urls_file, run_upload, UploadArgs};
