//! UI module for consistent CLI output
//!
//! Uses `cliclack` for styled logging in interactive terminals with
//! automatic fallback to plain output in CI/non-interactive environments.
//! Progress and summaries go to stderr so that stdout can carry content.

mod context;
mod output;

pub use context::UiContext;
pub use output::{remark, stat, step_ok, step_ok_detail, step_warn_hint};
