//! Command-line front end for jsbridge.
//!
//! Resolves options from flags and the settings file, launches the browser,
//! brings the bridge up through `jsbridge-runtime`, and then either runs a
//! shell or waits for the browser to exit.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod run;
pub mod shell;
