//! Slipway library exports.
//!
//! The binary is a thin clap front-end over these modules; integration
//! tests use them directly.

pub mod cache;
pub mod clean;
pub mod commands;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod preflight;
pub mod process;
pub mod rebuild;
pub mod recipe;
pub mod source;
pub mod timing;

pub use error::BuildError;
