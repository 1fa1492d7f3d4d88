use std::fmt;

/// Lifecycle states of an object adapter, in the order they are passed through.
///
/// The ordering is meaningful: "at least deactivating" is `state >= Deactivating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdapterState {
    Uninitialized,
    Held,
    Activating,
    Active,
    Deactivating,
    Deactivated,
    Destroying,
    Destroyed,
}

impl AdapterState {
    /// New dispatches and configuration changes are refused from here on.
    pub fn is_deactivating(self) -> bool {
        self >= AdapterState::Deactivating
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Uninitialized => "uninitialized",
            AdapterState::Held => "held",
            AdapterState::Activating => "activating",
            AdapterState::Active => "active",
            AdapterState::Deactivating => "deactivating",
            AdapterState::Deactivated => "deactivated",
            AdapterState::Destroying => "destroying",
            AdapterState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}
