#![doc = "shot-lifter: lifts a local tree of screenshots into an object-storage bucket."]

//! The library holds the whole upload pipeline; the binary in `main.rs` is
//! only CLI glue around [`cli::run`].
//!
//! # Layout
//! - [`contract`]: `ObjectStore` and `Filesystem` collaborator traits (mockable).
//! - [`keymap`]: local path to storage key derivation.
//! - [`walker`]: two-level cell/shot enumeration.
//! - [`resilience`]: retry plus circuit breaker, as an `ObjectStore` decorator.
//! - [`synchronise`]: the upload engine and its report.
//! - [`lister`]: paginated listing for audits and exports.
//! - [`store`], [`local_fs`]: production implementations of the traits.
//! - [`config`], [`load_config`], [`cli`]: configuration and entrypoint.

pub mod cli;
pub mod config;
pub mod contract;
pub mod error;
pub mod keymap;
pub mod lister;
pub mod load_config;
pub mod local_fs;
pub mod resilience;
pub mod store;
pub mod synchronise;
pub mod walker;

pub use cli::{run, Cli, Commands};
