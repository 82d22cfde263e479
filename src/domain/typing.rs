use std::time::{SystemTime, UNIX_EPOCH};

/// How long a typing indicator stays visible without a fresh signal.
const TYPING_EXPIRY_MS: u128 = 3_000;

/// Transient "other participant is typing" state.
///
/// Whisper-style typing signals are not persisted, so the indicator is a
/// pure timer: each signal rearms a 3-second window. Callers pass the
/// clock in, which keeps expiry testable without sleeping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypingIndicator {
    last_signal_at_ms: Option<u128>,
}

impl TypingIndicator {
    pub fn signal(&mut self, now_ms: u128) {
        self.last_signal_at_ms = Some(now_ms);
    }

    pub fn is_active(&self, now_ms: u128) -> bool {
        match self.last_signal_at_ms {
            Some(at) => now_ms.saturating_sub(at) < TYPING_EXPIRY_MS,
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.last_signal_at_ms = None;
    }
}

pub fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
