//! UI layer: the line-based chat shell and transcript rendering.

pub mod render;
pub mod shell;

/// Returns the UI module name for smoke checks.
pub fn module_name() -> &'static str {
    "ui"
}
