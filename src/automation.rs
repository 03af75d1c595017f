//! Action/condition surface for an external automation layer

use heapless::FnvIndexMap;

use crate::isp::Programmer;
use crate::link::Link;
use crate::session::{OtaSession, StateStore};

/// State-mutating operations an automation can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Enable,
    Disable,
    Toggle,
    Reset,
}

impl SessionAction {
    pub fn execute<L, P, S>(&self, session: &mut OtaSession<L, P, S>)
    where
        L: Link,
        P: Programmer,
        S: StateStore,
    {
        match self {
            SessionAction::Enable => {
                session.enable();
            }
            SessionAction::Disable => session.disable(),
            SessionAction::Toggle => session.toggle(),
            SessionAction::Reset => session.reset(),
        }
    }
}

/// Read-only predicates over the session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCondition {
    IsEnabled,
    IsDisabled,
    IsIdle,
    IsPending,
    IsActive,
    IsError,
}

impl SessionCondition {
    pub fn evaluate<L, P, S>(&self, session: &OtaSession<L, P, S>) -> bool
    where
        L: Link,
        P: Programmer,
        S: StateStore,
    {
        match self {
            SessionCondition::IsEnabled => session.is_enabled(),
            SessionCondition::IsDisabled => session.is_disabled(),
            SessionCondition::IsIdle => session.is_idle(),
            SessionCondition::IsPending => session.is_pending(),
            SessionCondition::IsActive => session.is_active(),
            SessionCondition::IsError => session.is_error(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Action(SessionAction),
    Condition(SessionCondition),
}

const REGISTRY_CAPACITY: usize = 16;

/// Name-keyed registry the automation layer resolves its bindings
/// against. Pre-populated with the session's own capabilities; hosts
/// may register more until the fixed capacity runs out.
pub struct Registry {
    entries: FnvIndexMap<&'static str, Capability, REGISTRY_CAPACITY>,
}

impl Registry {
    pub fn new() -> Self {
        let mut registry = Self {
            entries: FnvIndexMap::new(),
        };

        registry.register("avr_ota.enable", Capability::Action(SessionAction::Enable));
        registry.register("avr_ota.disable", Capability::Action(SessionAction::Disable));
        registry.register("avr_ota.toggle", Capability::Action(SessionAction::Toggle));
        registry.register("avr_ota.reset", Capability::Action(SessionAction::Reset));

        registry.register(
            "avr_ota.is_enabled",
            Capability::Condition(SessionCondition::IsEnabled),
        );
        registry.register(
            "avr_ota.is_disabled",
            Capability::Condition(SessionCondition::IsDisabled),
        );
        registry.register(
            "avr_ota.is_idle",
            Capability::Condition(SessionCondition::IsIdle),
        );
        registry.register(
            "avr_ota.is_pending",
            Capability::Condition(SessionCondition::IsPending),
        );
        registry.register(
            "avr_ota.is_active",
            Capability::Condition(SessionCondition::IsActive),
        );
        registry.register(
            "avr_ota.is_error",
            Capability::Condition(SessionCondition::IsError),
        );

        registry
    }

    /// Bind a name. Returns false when the capacity is exhausted.
    pub fn register(&mut self, name: &'static str, capability: Capability) -> bool {
        self.entries.insert(name, capability).is_ok()
    }

    pub fn lookup(&self, name: &str) -> Option<Capability> {
        self.entries.get(name).copied()
    }

    pub fn action(&self, name: &str) -> Option<SessionAction> {
        match self.lookup(name) {
            Some(Capability::Action(action)) => Some(action),
            _ => None,
        }
    }

    pub fn condition(&self, name: &str) -> Option<SessionCondition> {
        match self.lookup(name) {
            Some(Capability::Condition(condition)) => Some(condition),
            _ => None,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testutil::idle_session;

    #[test]
    fn actions_and_conditions_drive_the_session() {
        let registry = Registry::new();
        let mut session = idle_session();

        assert!(registry
            .condition("avr_ota.is_disabled")
            .unwrap()
            .evaluate(&session));

        registry
            .action("avr_ota.enable")
            .unwrap()
            .execute(&mut session);
        assert!(registry
            .condition("avr_ota.is_pending")
            .unwrap()
            .evaluate(&session));

        registry
            .action("avr_ota.toggle")
            .unwrap()
            .execute(&mut session);
        assert!(session.is_idle());
    }

    #[test]
    fn default_bindings_resolve() {
        let registry = Registry::new();
        assert_eq!(registry.action("avr_ota.toggle"), Some(SessionAction::Toggle));
        assert_eq!(
            registry.condition("avr_ota.is_error"),
            Some(SessionCondition::IsError)
        );
        assert_eq!(registry.action("avr_ota.is_error"), None);
        assert_eq!(registry.lookup("light.toggle"), None);
    }
}
