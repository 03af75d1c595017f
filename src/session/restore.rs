//! Power-on restore policy for the programmer enable state

/// Governs whether the enabled state survives a power cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestoreMode {
    RestoreDefaultOff,
    RestoreDefaultOn,
    #[default]
    AlwaysOff,
    AlwaysOn,
    RestoreInvertedDefaultOff,
    RestoreInvertedDefaultOn,
    RestoreAndOff,
    RestoreAndOn,
}

/// Backing store for the persisted enable flag.
pub trait StateStore {
    /// Last persisted value, `None` when nothing was ever stored.
    fn load(&mut self) -> Option<bool>;

    fn save(&mut self, enabled: bool);
}

/// Store for hosts without persistent memory. Never remembers anything,
/// which makes the restore modes collapse to their defaults.
#[derive(Default)]
pub struct NullStore;

impl StateStore for NullStore {
    fn load(&mut self) -> Option<bool> {
        None
    }

    fn save(&mut self, _enabled: bool) {}
}

/// Enable state to apply at startup. Pure; evaluated once by setup.
pub fn initial_enabled(mode: RestoreMode, last: Option<bool>) -> bool {
    match mode {
        RestoreMode::AlwaysOff => false,
        RestoreMode::AlwaysOn => true,
        RestoreMode::RestoreDefaultOff => last.unwrap_or(false),
        RestoreMode::RestoreDefaultOn => last.unwrap_or(true),
        RestoreMode::RestoreInvertedDefaultOff => last.map(|v| !v).unwrap_or(false),
        RestoreMode::RestoreInvertedDefaultOn => last.map(|v| !v).unwrap_or(true),
        RestoreMode::RestoreAndOff => false,
        RestoreMode::RestoreAndOn => last.unwrap_or(false),
    }
}
