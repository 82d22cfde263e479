//! Use case layer: the chat session engine and application workflows.

pub mod bootstrap;
pub mod context;
pub mod contracts;
pub mod normalize;
pub mod session;
pub mod unread;

/// Returns the usecases module name for smoke checks.
pub fn module_name() -> &'static str {
    "usecases"
}
