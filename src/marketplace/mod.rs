//! Marketplace integration layer: REST API and realtime channel adapters.

pub mod api;
pub mod channel;

pub use api::HttpChatApi;
pub use channel::WsChatChannel;

/// Returns the marketplace module name for smoke checks.
pub fn module_name() -> &'static str {
    "marketplace"
}
