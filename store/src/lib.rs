//! The data model and relational store backend for the task execution
//! controller
//!
//! Binary crates built on top of this one never touch SQL directly; they go
//! through [`Store`]'s per-entity methods.

pub mod conf;
pub mod db;
pub mod error;
pub mod models;

pub use conf::Conf;
pub use db::Store;
pub use error::Error;
