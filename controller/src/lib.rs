//! The task execution controller: Pool Reconciler, Lease Manager, Reaper,
//! Job Dispatcher, Job Watcher and IPC Service, wired together by
//! [`controller::Controller`]

pub mod args;
mod controller;
pub mod dispatcher;
pub mod ipc;
pub mod k8s;
pub mod lease;
pub mod pool;
pub mod reaper;
pub mod schedule;
pub mod watcher;

pub use controller::Controller;
