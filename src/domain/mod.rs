//! Domain layer: core entities and business rules.

pub mod composer;
pub mod events;
pub mod message;
pub mod session_state;
pub mod typing;

/// Returns the domain module name for smoke checks.
pub fn module_name() -> &'static str {
    "domain"
}
