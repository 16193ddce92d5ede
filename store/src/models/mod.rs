//! The data models shared by the store's backend and the controller built on
//! top of it

mod task;
mod template;
mod user;
mod vnc;
mod workspace;

pub use task::{Task, TaskStatus};
pub use template::{ContainerConfig, PersistentVolumeConfig, TaskTemplate};
pub use user::UserRef;
pub use vnc::VncWorkspace;
pub use workspace::Workspace;
