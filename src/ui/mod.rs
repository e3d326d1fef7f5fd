//! Terminal output
//!
//! User-facing status lines go through this module: cliclack framing and
//! spinners in an interactive terminal, plain prefixed lines in CI. Diagnostic
//! detail stays in `tracing`.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, outro_warn, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{format_bytes, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, JobCacheTheme};
