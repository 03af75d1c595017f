//! OTA session lifecycle and control surface

pub mod callbacks;
pub mod restore;
mod serve;

pub use callbacks::{CallbackList, Callbacks};
pub use restore::{initial_enabled, NullStore, RestoreMode, StateStore};

use log::{debug, info, warn};

use crate::config;
use crate::isp::Programmer;
use crate::link::{Link, LinkStatus, TransportError};
use crate::stk::DeviceParameters;
use crate::Error;

/// Session lifecycle states. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    /// Programmer disabled, port released
    Idle,
    /// Port claimed, waiting for an updater to attach
    Pending,
    /// Updater attached, programmer owns the target
    Active,
    /// Unrecoverable programming fault; exits only via reset
    ForcedShutdown,
}

/// One target device's update session. Owns the transport link and the
/// programmer exclusively; created once at startup and polled from the
/// host event loop.
pub struct OtaSession<L, P, S> {
    link: L,
    programmer: P,
    store: S,
    state: OtaState,
    restore_mode: RestoreMode,
    port: u16,
    callbacks: Callbacks,
    // Programming context, owned by the updater while Active.
    params: DeviceParameters,
    addr: u16,
    sync_errors: u8,
}

impl<L, P, S> OtaSession<L, P, S>
where
    L: Link,
    P: Programmer,
    S: StateStore,
{
    pub fn new(link: L, programmer: P, store: S) -> Self {
        Self {
            link,
            programmer,
            store,
            state: OtaState::Idle,
            restore_mode: RestoreMode::default(),
            port: config::DEFAULT_PORT,
            callbacks: Callbacks::default(),
            params: DeviceParameters::default(),
            addr: 0,
            sync_errors: 0,
        }
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn set_restore_mode(&mut self, mode: RestoreMode) {
        self.restore_mode = mode;
    }

    pub fn add_on_enable_callback(&mut self, callback: fn()) -> bool {
        self.callbacks.on_enable.add(callback)
    }

    pub fn add_on_disable_callback(&mut self, callback: fn()) -> bool {
        self.callbacks.on_disable.add(callback)
    }

    pub fn add_on_avr_idle_callback(&mut self, callback: fn()) -> bool {
        self.callbacks.on_avr_idle.add(callback)
    }

    pub fn add_on_avr_pending_callback(&mut self, callback: fn()) -> bool {
        self.callbacks.on_avr_pending.add(callback)
    }

    pub fn add_on_avr_active_callback(&mut self, callback: fn()) -> bool {
        self.callbacks.on_avr_active.add(callback)
    }

    pub fn add_on_avr_failure_callback(&mut self, callback: fn()) -> bool {
        self.callbacks.on_avr_failure.add(callback)
    }

    /// Bring the session up: assert the target enable line and apply
    /// the restore policy. A port that cannot be claimed here is fatal.
    pub fn setup(&mut self) -> Result<(), Error> {
        self.programmer.set_enable(true)?;

        let last = self.store.load();
        if initial_enabled(self.restore_mode, last) && !self.enable() {
            return Err(TransportError::LinkUnavailable.into());
        }
        Ok(())
    }

    /// Claim the port and start waiting for an updater. Returns true
    /// when the session is enabled afterwards; already-enabled sessions
    /// are left alone.
    pub fn enable(&mut self) -> bool {
        if self.state != OtaState::Idle {
            return true;
        }

        debug!("enabling AVR programmer");
        if let Err(err) = self.link.open() {
            warn!("could not claim updater port {}: {:?}", self.port, err);
            return false;
        }

        info!("updater port open:");
        info!("  port: {}", self.port);
        info!(
            "  $ avrdude -c stk500v1 -p m328p -P net:<host>:{} -b 19200 ...",
            self.port
        );

        self.store.save(true);
        self.callbacks.on_enable.call();
        self.transition(OtaState::Pending);
        true
    }

    /// Release the port and stop any programming in progress. No-op
    /// unless the session is Pending or Active.
    pub fn disable(&mut self) {
        if !matches!(self.state, OtaState::Pending | OtaState::Active) {
            return;
        }

        debug!("disabling AVR programmer");
        self.abort_programming();
        self.link.close();
        self.store.save(false);
        self.callbacks.on_disable.call();
        self.transition(OtaState::Idle);
    }

    /// Disable when Pending or Active, enable otherwise.
    pub fn toggle(&mut self) {
        match self.state {
            OtaState::Pending | OtaState::Active => self.disable(),
            _ => {
                self.enable();
            }
        }
    }

    /// Recover from a forced shutdown: drop everything, restart the
    /// target and return to Idle. No-op in every other state.
    pub fn reset(&mut self) {
        if self.state != OtaState::ForcedShutdown {
            return;
        }

        self.abort_programming();
        self.link.close();
        if self.programmer.reset_target().is_err() {
            warn!("target reset pulse failed");
        }
        self.store.save(false);
        self.transition(OtaState::Idle);
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != OtaState::Idle
    }

    pub fn is_disabled(&self) -> bool {
        !self.is_enabled()
    }

    pub fn is_idle(&self) -> bool {
        self.state == OtaState::Idle
    }

    pub fn is_pending(&self) -> bool {
        self.state == OtaState::Pending
    }

    pub fn is_active(&self) -> bool {
        self.state == OtaState::Active
    }

    pub fn is_error(&self) -> bool {
        self.state == OtaState::ForcedShutdown
    }

    /// One scheduler tick. Never blocks beyond a single updater command.
    pub fn poll(&mut self) {
        match self.state {
            OtaState::Idle | OtaState::ForcedShutdown => {}
            OtaState::Pending => {
                if self.link.status() == LinkStatus::Down {
                    warn!("updater port went down while pending");
                    self.fail();
                } else if self.link.poll_accept() {
                    self.transition(OtaState::Active);
                }
            }
            OtaState::Active => {
                if self.link.status() != LinkStatus::Connected {
                    self.complete();
                } else if self.link.has_pending() {
                    if let Err(err) = self.serve_command() {
                        warn!("programming fault: {:?}", err);
                        self.fail();
                    }
                }
            }
        }
    }

    pub fn dump_config(&self) {
        info!("AVR OTA session:");
        info!("  port: {}", self.port);
        info!("  restore mode: {:?}", self.restore_mode);
        info!("  state: {:?}", self.state);
    }

    fn transition(&mut self, next: OtaState) {
        if next == self.state {
            return;
        }
        let prev = self.state;
        self.state = next;

        match next {
            OtaState::Idle => {
                if prev == OtaState::Active {
                    info!("programming complete, now idle");
                } else {
                    info!("now idle");
                }
            }
            OtaState::Pending => info!("updater connection pending"),
            OtaState::Active => info!("programming mode"),
            OtaState::ForcedShutdown => info!("forced shutdown"),
        }

        self.callbacks.dispatch_entry(next);
    }

    /// Successful end of a programming session: the updater hung up.
    fn complete(&mut self) {
        self.abort_programming();
        if self.programmer.set_enable(true).is_err() {
            warn!("could not reassert target enable line");
        }
        self.link.close();
        self.store.save(false);
        self.callbacks.on_disable.call();
        self.transition(OtaState::Idle);
    }

    /// Unrecoverable fault: shut the programmer down hard. The port
    /// stays claimed until an explicit reset or disable decision.
    fn fail(&mut self) {
        self.abort_programming();
        self.link.disconnect();
        self.transition(OtaState::ForcedShutdown);
    }

    fn abort_programming(&mut self) {
        if self.programmer.in_session() && self.programmer.end_session().is_err() {
            warn!("could not leave programming mode cleanly");
        }
        self.sync_errors = 0;
    }
}

#[cfg(test)]
impl<L, P, S> OtaSession<L, P, S> {
    pub(crate) fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub(crate) fn programmer_ref(&self) -> &P {
        &self.programmer
    }

    pub(crate) fn programmer_ref_mut(&mut self) -> &mut P {
        &mut self.programmer
    }
}


#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::testutil::{active_session, idle_session};
    use super::*;

    #[test]
    fn starts_idle_and_disabled() {
        let session = idle_session();
        assert_eq!(session.state(), OtaState::Idle);
        assert!(session.is_idle());
        assert!(session.is_disabled());
        assert!(!session.is_enabled());
        assert!(!session.is_error());
    }

    #[test]
    fn enable_moves_idle_to_pending() {
        static ENABLES: AtomicUsize = AtomicUsize::new(0);
        static PENDINGS: AtomicUsize = AtomicUsize::new(0);

        let mut session = idle_session();
        session.add_on_enable_callback(|| {
            ENABLES.fetch_add(1, Ordering::SeqCst);
        });
        session.add_on_avr_pending_callback(|| {
            PENDINGS.fetch_add(1, Ordering::SeqCst);
        });

        assert!(session.enable());
        assert!(session.is_pending());
        assert!(session.is_enabled());
        assert_eq!(ENABLES.load(Ordering::SeqCst), 1);
        assert_eq!(PENDINGS.load(Ordering::SeqCst), 1);

        // Enabling an enabled session is left alone.
        assert!(session.enable());
        assert_eq!(ENABLES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn enable_stays_idle_when_the_port_cannot_be_claimed() {
        let mut session = idle_session();
        session.link_mut().fail_open = true;

        assert!(!session.enable());
        assert!(session.is_idle());
    }

    #[test]
    fn pending_goes_active_when_the_updater_attaches() {
        let mut session = idle_session();
        session.enable();

        session.poll();
        assert!(session.is_pending());

        session.link_mut().accept_next = true;
        session.poll();
        assert!(session.is_active());
    }

    #[test]
    fn disable_from_active_fires_disable_then_idle() {
        static DISABLES: AtomicUsize = AtomicUsize::new(0);
        static IDLES: AtomicUsize = AtomicUsize::new(0);

        let mut session = active_session();
        session.add_on_disable_callback(|| {
            DISABLES.fetch_add(1, Ordering::SeqCst);
        });
        session.add_on_avr_idle_callback(|| {
            IDLES.fetch_add(1, Ordering::SeqCst);
        });

        session.disable();
        assert!(session.is_idle());
        assert_eq!(DISABLES.load(Ordering::SeqCst), 1);
        assert_eq!(IDLES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn toggle_from_idle_matches_enable() {
        let mut session = idle_session();
        session.toggle();
        assert!(session.is_pending());
    }

    #[test]
    fn toggle_from_pending_or_active_matches_disable() {
        let mut session = idle_session();
        session.enable();
        session.toggle();
        assert!(session.is_idle());

        let mut session = active_session();
        session.toggle();
        assert!(session.is_idle());
    }

    #[test]
    fn reset_is_a_no_op_outside_forced_shutdown() {
        let mut session = idle_session();
        session.reset();
        assert!(session.is_idle());
        assert_eq!(session.programmer_ref().resets, 0);

        let mut session = active_session();
        session.reset();
        assert!(session.is_active());
        assert_eq!(session.programmer_ref().resets, 0);
    }

    #[test]
    fn transport_failure_forces_shutdown_then_reset_recovers() {
        static FAILURES: AtomicUsize = AtomicUsize::new(0);

        let mut session = active_session();
        session.add_on_avr_failure_callback(|| {
            FAILURES.fetch_add(1, Ordering::SeqCst);
        });

        // An unknown command with no trailing sync byte: the read times
        // out and the session must route to ForcedShutdown.
        session.link_mut().push(&[0xF7]);
        session.poll();

        assert!(session.is_error());
        assert!(session.is_enabled());
        assert_eq!(FAILURES.load(Ordering::SeqCst), 1);

        // Polling in ForcedShutdown changes nothing.
        session.poll();
        assert!(session.is_error());
        assert_eq!(FAILURES.load(Ordering::SeqCst), 1);

        session.reset();
        assert!(session.is_idle());
        assert_eq!(session.programmer_ref().resets, 1);
    }

    #[test]
    fn port_loss_while_pending_forces_shutdown() {
        static FAILURES: AtomicUsize = AtomicUsize::new(0);

        let mut session = idle_session();
        session.add_on_avr_failure_callback(|| {
            FAILURES.fetch_add(1, Ordering::SeqCst);
        });
        session.enable();
        assert!(session.is_pending());

        // The port drops out from under the session before anyone
        // attaches.
        session.link_mut().close();
        session.poll();

        assert!(session.is_error());
        assert_eq!(FAILURES.load(Ordering::SeqCst), 1);

        session.reset();
        assert!(session.is_idle());
    }

    #[test]
    fn updater_hangup_completes_the_session() {
        static DISABLES: AtomicUsize = AtomicUsize::new(0);

        let mut session = active_session();
        session.add_on_disable_callback(|| {
            DISABLES.fetch_add(1, Ordering::SeqCst);
        });

        session.link_mut().disconnect();
        session.poll();

        assert!(session.is_idle());
        assert_eq!(DISABLES.load(Ordering::SeqCst), 1);
        assert!(session.programmer_ref().enable_line);
    }

    #[test]
    fn setup_applies_the_restore_policy() {
        let mut session = idle_session();
        session.set_restore_mode(RestoreMode::AlwaysOn);
        session.setup().unwrap();
        assert!(session.is_enabled());

        let mut session = idle_session();
        session.set_restore_mode(RestoreMode::AlwaysOff);
        session.setup().unwrap();
        assert!(session.is_disabled());
    }

    #[test]
    fn setup_restores_the_persisted_state() {
        let mut session = idle_session();
        session.set_restore_mode(RestoreMode::RestoreAndOn);
        session.store.value = Some(true);
        session.setup().unwrap();
        assert!(session.is_enabled());

        let mut session = idle_session();
        session.set_restore_mode(RestoreMode::RestoreAndOn);
        session.store.value = Some(false);
        session.setup().unwrap();
        assert!(session.is_disabled());
    }

    #[test]
    fn setup_fails_when_the_port_cannot_be_claimed() {
        let mut session = idle_session();
        session.set_restore_mode(RestoreMode::AlwaysOn);
        session.link_mut().fail_open = true;

        assert_eq!(
            session.setup(),
            Err(Error::Transport(TransportError::LinkUnavailable))
        );
    }

    #[test]
    fn setup_asserts_the_target_enable_line() {
        let mut session = idle_session();
        session.setup().unwrap();
        assert!(session.programmer_ref().enable_line);
    }

    #[test]
    fn enabled_state_is_persisted_across_transitions() {
        let mut session = idle_session();
        session.enable();
        assert_eq!(session.store.value, Some(true));

        session.disable();
        assert_eq!(session.store.value, Some(false));
    }
}
