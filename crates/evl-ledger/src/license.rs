/// Entitlement state consulted at commit time.
///
/// Licensing itself lives outside the ledger; this is the question the
/// commit path asks of it.
pub trait LicenseState: Send + Sync {
    /// Returns `true` if the event cap does not apply.
    fn is_licensed(&self) -> bool;
}

/// Licensed: no event cap.
#[derive(Clone, Copy, Debug, Default)]
pub struct Licensed;

impl LicenseState for Licensed {
    fn is_licensed(&self) -> bool {
        true
    }
}

/// Unlicensed: commits are capped at `LedgerConfig::unlicensed_event_cap`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unlicensed;

impl LicenseState for Unlicensed {
    fn is_licensed(&self) -> bool {
        false
    }
}
