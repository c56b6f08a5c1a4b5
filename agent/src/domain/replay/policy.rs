//! Dead-letter policy for entries upstream keeps rejecting.

/// When to stop retrying an entry.
///
/// With `abandon_after: None` (the default) every entry is retried until it
/// succeeds, and a rejected entry blocks its queue. With `Some(n)` an entry
/// that receives a permanent rejection `n` times is marked abandoned and the
/// drain moves past it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayPolicy {
    pub abandon_after: Option<u32>,
}

impl ReplayPolicy {
    /// Retry forever.
    #[must_use]
    pub const fn retry_forever() -> Self {
        Self {
            abandon_after: None,
        }
    }

    /// Abandon after `attempts` permanent rejections. Zero is treated as one.
    #[must_use]
    pub const fn abandon_after(attempts: u32) -> Self {
        Self {
            abandon_after: Some(if attempts == 0 { 1 } else { attempts }),
        }
    }
}

/// Client errors that will not succeed on retry. `408` and `429` are
/// transient by definition and never count.
#[must_use]
pub const fn is_permanent_rejection(status: u16) -> bool {
    status >= 400 && status < 500 && status != 408 && status != 429
}
