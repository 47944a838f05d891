use serde::{Deserialize, Serialize};

/// Who is calling, as established by the transport.
///
/// The ledger does not interpret identities; it only requires one to be
/// present for every operation except `Ping`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub name: String,
}

impl CallerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
