//! Session configuration.

/// What the data ledger records about read attempts that are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadAuditPolicy {
    /// Only authorized requests are committed. A refused reader leaves no
    /// trace; a forged commit stays on the ledger but yields no token.
    #[default]
    AuthorizedOnly,

    /// A refused reader is also recorded, as a `DeniedRead` block, before
    /// the request fails.
    RecordDenials,
}

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub read_audit: ReadAuditPolicy,
}

impl SessionConfig {
    /// Configuration that records refused reads.
    pub fn recording_denials() -> Self {
        Self {
            read_audit: ReadAuditPolicy::RecordDenials,
        }
    }
}
