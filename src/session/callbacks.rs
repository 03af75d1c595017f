//! Lifecycle edge callbacks for the automation layer

use heapless::Vec;

use super::OtaState;

/// Callbacks registered per edge.
pub const MAX_CALLBACKS: usize = 4;

/// One list of externally supplied callbacks, invoked synchronously and
/// in registration order. Registrations live for the process lifetime.
#[derive(Default)]
pub struct CallbackList {
    entries: Vec<fn(), MAX_CALLBACKS>,
}

impl CallbackList {
    /// Register a callback. Returns false when the list is full.
    pub fn add(&mut self, callback: fn()) -> bool {
        self.entries.push(callback).is_ok()
    }

    pub fn call(&self) {
        for callback in &self.entries {
            callback();
        }
    }
}

/// The six edges an automation can bind to.
#[derive(Default)]
pub struct Callbacks {
    pub on_enable: CallbackList,
    pub on_disable: CallbackList,
    pub on_avr_idle: CallbackList,
    pub on_avr_pending: CallbackList,
    pub on_avr_active: CallbackList,
    pub on_avr_failure: CallbackList,
}

impl Callbacks {
    /// Fire the state-entry list matching the transition target.
    pub fn dispatch_entry(&self, state: OtaState) {
        match state {
            OtaState::Idle => self.on_avr_idle.call(),
            OtaState::Pending => self.on_avr_pending.call(),
            OtaState::Active => self.on_avr_active.call(),
            OtaState::ForcedShutdown => self.on_avr_failure.call(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_run_once_per_call() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn count() {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let mut list = CallbackList::default();
        assert!(list.add(count));
        assert!(list.add(count));

        list.call();
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn registration_is_bounded() {
        fn noop() {}

        let mut list = CallbackList::default();
        for _ in 0..MAX_CALLBACKS {
            assert!(list.add(noop));
        }
        assert!(!list.add(noop));
    }

    #[test]
    fn dispatch_targets_the_entered_state() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn count() {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let mut callbacks = Callbacks::default();
        callbacks.on_avr_failure.add(count);

        callbacks.dispatch_entry(OtaState::Idle);
        callbacks.dispatch_entry(OtaState::Active);
        assert_eq!(CALLS.load(Ordering::SeqCst), 0);

        callbacks.dispatch_entry(OtaState::ForcedShutdown);
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
