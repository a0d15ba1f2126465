//! Sitepipe - front-end asset build pipeline
//!
//! This library provides functionality to:
//! - Build HTML pages, stylesheets, scripts and images through named,
//!   ordered pipeline steps
//! - Watch the source tree and rebuild only the steps a change affects
//! - Signal browsers to reload or hot-swap stylesheets after a rebuild

pub mod asset;
pub mod build;
pub mod cli;
pub mod config;
pub mod reload;
#[cfg(feature = "serve")]
pub mod serve;
pub mod transforms;
pub mod watch;
