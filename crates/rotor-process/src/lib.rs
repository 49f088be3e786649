//! Transfer process management: command rendering, credential injection,
//! spawning through a shell, and process-tree termination.

pub mod command;
pub mod inject;
pub mod supervisor;
pub mod tree;

pub use command::{shell_line, transfer_args};
pub use inject::{ConfigSection, CredentialInjector, RuntimeFlag, injector_for};
pub use supervisor::{ProcessControl, ProcessSupervisor};
pub use tree::{is_process_alive, matching_children, terminate_tree};
