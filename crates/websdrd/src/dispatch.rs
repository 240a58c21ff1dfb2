//! Applies decoded client commands to a session.
//!
//! Keys are applied in a fixed order: `freq_offset`, `hw_freq`,
//! `auto_gain`, `gain`, `demod`, `source`, then `login`/`logout`. Credentials
//! therefore take effect for the next message, not for hardware keys in the
//! same one.
//!
//! Every mutation is independent. A violated precondition (not privileged,
//! no source attached, index out of range) skips that key only and sets no
//! dirty flag. Engine and driver failures are logged and skip the key.
//!
//! Hardware parameter writes go straight to the driver without the graph's
//! structural lock; concurrent writes to a shared source are last-write-wins.
//! Demod and source swaps always take the lock.

use std::sync::Arc;

use tracing::{debug, info, warn};
use websdr_core::{Demod, DomainError};
use websdr_protocol::ClientCommand;

use crate::auth::Authenticator;
use crate::graph::GraphGuard;
use crate::hardware::{HardwareSource, SourceTable};
use crate::registry::Session;

/// Shared resources a command may touch.
pub struct DispatchContext<'a> {
    pub graph: &'a mut GraphGuard,
    pub sources: &'a SourceTable,
    pub auth: &'a dyn Authenticator,
}

/// What a dispatched command changed beyond its own session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// A hardware parameter was written; every viewer should be refreshed.
    pub hardware_changed: bool,
}

/// Applies every recognized key of `command` to `session`.
pub fn apply(
    command: &ClientCommand,
    session: &mut Session,
    ctx: DispatchContext<'_>,
) -> DispatchOutcome {
    let mut outcome = DispatchOutcome::default();

    if let Some(offset) = command.freq_offset {
        session.receiver.set_freq_offset(offset);
        session.dirty.offset = true;
    }

    if let Some(freq) = command.hw_freq {
        if let Some(driver) = privileged_driver(session, ctx.sources, "hw_freq") {
            match driver.set_center_freq(freq) {
                Ok(()) => {
                    debug!(session_id = %session.id, freq, "Hardware frequency set");
                    outcome.hardware_changed = true;
                }
                Err(e) => {
                    warn!(session_id = %session.id, error = %e, "Hardware frequency rejected")
                }
            }
        }
    }

    if command.auto_gain.is_some() || command.gain.is_some() {
        if let Some(driver) = privileged_driver(session, ctx.sources, "gain") {
            outcome.hardware_changed |=
                apply_gain(session, driver.as_ref(), command.auto_gain, command.gain);
        }
    }

    if let Some(demod) = command.demod {
        change_demod(session, ctx.graph, demod);
    }

    if let Some(index) = command.source {
        change_source(session, ctx.graph, ctx.sources, index);
    }

    if let Some(creds) = &command.login {
        if ctx.auth.authenticate(&creds.user, &creds.pass) {
            info!(session_id = %session.id, user = %creds.user, "Session privileged");
            session.receiver.set_privileged(true);
        } else {
            // Existing privilege survives a failed attempt
            warn!(
                session_id = %session.id,
                user = %creds.user,
                privileged = session.receiver.privileged(),
                "Login rejected"
            );
        }
        session.dirty.privileged = true;
    } else if command.logout {
        debug!(session_id = %session.id, "Session logged out");
        session.receiver.set_privileged(false);
        session.dirty.privileged = true;
    }

    outcome
}

/// Driver of the session's source, if the session may write to it.
fn privileged_driver<'a>(
    session: &Session,
    sources: &'a SourceTable,
    key: &'static str,
) -> Option<&'a Arc<dyn HardwareSource>> {
    if !session.receiver.privileged() {
        debug!(session_id = %session.id, key, "Ignoring hardware write: not privileged");
        return None;
    }
    let driver = session.receiver.source_ix().and_then(|ix| sources.driver(ix));
    if driver.is_none() {
        debug!(session_id = %session.id, key, "Ignoring hardware write: no source attached");
    }
    driver
}

/// Applies gain mode, then manual gain. Returns true if anything was written.
fn apply_gain(
    session: &Session,
    driver: &dyn HardwareSource,
    auto_gain: Option<bool>,
    gain: Option<f64>,
) -> bool {
    let mut written = false;

    if let Some(automatic) = auto_gain {
        match driver.set_gain_mode(automatic) {
            Ok(()) => written = true,
            Err(e) => warn!(session_id = %session.id, error = %e, "Gain mode rejected"),
        }
    }

    if let Some(gain) = gain {
        let result = driver.set_gain_mode(false).and_then(|()| driver.set_gain(gain));
        match result {
            Ok(()) => written = true,
            Err(e) => warn!(session_id = %session.id, error = %e, "Gain rejected"),
        }
    }

    written
}

fn change_demod(session: &mut Session, graph: &mut GraphGuard, demod: Demod) {
    let lock = graph.lock();
    match session.receiver.change_demod(&lock, demod) {
        Ok(()) => {
            debug!(session_id = %session.id, %demod, "Demodulator changed");
            session.dirty.demod = true;
        }
        Err(e) => warn!(session_id = %session.id, error = %e, "Demodulator change failed"),
    }
}

fn change_source(session: &mut Session, graph: &mut GraphGuard, sources: &SourceTable, index: i64) {
    let Some(descriptor) = sources.checked_index(index).and_then(|ix| sources.descriptor(ix)) else {
        let err = DomainError::SourceOutOfRange {
            index,
            len: sources.len(),
        };
        debug!(session_id = %session.id, error = %err, "Ignoring source");
        return;
    };

    let lock = graph.lock();
    match session.receiver.set_source(&lock, descriptor) {
        Ok(()) => {
            debug!(session_id = %session.id, source = %descriptor.label, "Source changed");
            session.dirty.source = true;
            session.dirty.offset = true;
        }
        Err(e) => warn!(session_id = %session.id, error = %e, "Source change failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use websdr_core::{SessionId, SourceDescriptor};
    use websdr_protocol::Credentials;

    use crate::auth::StaticCredentials;
    use crate::engine::EngineFactory;
    use crate::graph::GraphGuard;
    use crate::loopback::{GraphEvent, LoopbackEngineFactory, LoopbackFlowGraph, LoopbackSource};
    use crate::receiver::Receiver;
    use crate::registry::{DirtyFlags, WritableSignal};

    struct Fixture {
        graph: Arc<LoopbackFlowGraph>,
        guard: GraphGuard,
        sources: SourceTable,
        drivers: Vec<Arc<LoopbackSource>>,
        auth: StaticCredentials,
        session: Session,
    }

    impl Fixture {
        fn new() -> Self {
            let graph = Arc::new(LoopbackFlowGraph::new());
            let guard = GraphGuard::new(graph.clone());
            let mut sources = SourceTable::new();
            let drivers = vec![
                Arc::new(LoopbackSource::new(7_000_000, 1_024_000)),
                Arc::new(LoopbackSource::new(145_000_000, 2_048_000)),
            ];
            sources.add(SourceDescriptor::new(0, "hf", "HF"), drivers[0].clone());
            sources.add(
                SourceDescriptor::new(0, "vhf", "VHF")
                    .with_converter_offset(-100_000_000)
                    .with_default_offset(12_500),
                drivers[1].clone(),
            );

            let id = SessionId::new("0000");
            let engine = LoopbackEngineFactory::new().build(&id, Demod::Fm).unwrap();
            let receiver = Receiver::new(engine, Demod::Fm, sources.descriptor(0));
            let mut session = Session::new(id, receiver, WritableSignal::new());
            session.dirty = DirtyFlags::default();

            Self {
                graph,
                guard,
                sources,
                drivers,
                auth: StaticCredentials::new("admin", "pw"),
                session,
            }
        }

        fn apply(&mut self, command: &ClientCommand) -> DispatchOutcome {
            let ctx = DispatchContext {
                graph: &mut self.guard,
                sources: &self.sources,
                auth: &self.auth,
            };
            apply(command, &mut self.session, ctx)
        }

        fn apply_json(&mut self, json: &str) -> DispatchOutcome {
            let command = ClientCommand::parse(json.as_bytes()).unwrap();
            self.apply(&command)
        }

        fn login(&mut self) {
            self.apply_json(r#"{"login":{"user":"admin","pass":"pw"}}"#);
            self.session.dirty = DirtyFlags::default();
        }
    }

    #[test]
    fn test_freq_offset_sets_flag() {
        let mut fx = Fixture::new();
        let outcome = fx.apply_json(r#"{"freq_offset":100}"#);
        assert_eq!(fx.session.receiver.freq_offset(), 100);
        assert!(fx.session.dirty.offset);
        assert!(!outcome.hardware_changed);
    }

    #[test]
    fn test_login_success() {
        let mut fx = Fixture::new();
        fx.apply_json(r#"{"login":{"user":"admin","pass":"pw"}}"#);
        assert!(fx.session.receiver.privileged());
        assert!(fx.session.dirty.privileged);
    }

    #[test]
    fn test_failed_login_still_reports_state() {
        let mut fx = Fixture::new();
        fx.apply_json(r#"{"login":{"user":"admin","pass":"nope"}}"#);
        assert!(!fx.session.receiver.privileged());
        assert!(fx.session.dirty.privileged);
    }

    #[test]
    fn test_failed_login_keeps_existing_privilege() {
        let mut fx = Fixture::new();
        fx.login();
        fx.apply_json(r#"{"login":{"user":"admin","pass":"typo"}}"#);
        assert!(fx.session.receiver.privileged());
        assert!(fx.session.dirty.privileged);

        let outcome = fx.apply_json(r#"{"hw_freq":7100000}"#);
        assert!(outcome.hardware_changed);
    }

    #[test]
    fn test_login_wins_over_logout() {
        let mut fx = Fixture::new();
        let command = ClientCommand {
            login: Some(Credentials {
                user: "admin".to_string(),
                pass: "pw".to_string(),
            }),
            logout: true,
            ..ClientCommand::default()
        };
        fx.apply(&command);
        assert!(fx.session.receiver.privileged());
    }

    #[test]
    fn test_logout() {
        let mut fx = Fixture::new();
        fx.login();
        fx.apply_json(r#"{"logout":null}"#);
        assert!(!fx.session.receiver.privileged());
        assert!(fx.session.dirty.privileged);
    }

    #[test]
    fn test_hw_freq_requires_privilege() {
        let mut fx = Fixture::new();
        let outcome = fx.apply_json(r#"{"hw_freq":7100000}"#);
        assert!(!outcome.hardware_changed);
        assert_eq!(fx.drivers[0].center_freq(), 7_000_000);
        assert!(!fx.session.dirty.any());

        fx.login();
        let outcome = fx.apply_json(r#"{"hw_freq":7100000}"#);
        assert!(outcome.hardware_changed);
        assert_eq!(fx.drivers[0].center_freq(), 7_100_000);
        assert!(!fx.session.dirty.any());
    }

    #[test]
    fn test_login_applies_to_next_message_only() {
        let mut fx = Fixture::new();
        let outcome = fx.apply_json(r#"{"hw_freq":7100000,"login":{"user":"admin","pass":"pw"}}"#);
        assert!(!outcome.hardware_changed);
        assert_eq!(fx.drivers[0].center_freq(), 7_000_000);
        assert!(fx.session.receiver.privileged());
    }

    #[test]
    fn test_hardware_write_without_structural_lock() {
        let mut fx = Fixture::new();
        fx.login();
        fx.graph.clear_events();
        fx.apply_json(r#"{"hw_freq":7100000,"gain":12.5}"#);
        assert!(fx.graph.events().is_empty());
    }

    #[test]
    fn test_driver_rejection_is_noop() {
        let mut fx = Fixture::new();
        fx.login();
        let outcome = fx.apply_json(r#"{"hw_freq":-5}"#);
        assert!(!outcome.hardware_changed);
        assert_eq!(fx.drivers[0].center_freq(), 7_000_000);
    }

    #[test]
    fn test_gain_disables_auto_gain() {
        let mut fx = Fixture::new();
        fx.login();
        fx.apply_json(r#"{"auto_gain":true}"#);
        assert!(fx.drivers[0].gain_mode());

        let outcome = fx.apply_json(r#"{"gain":30.5}"#);
        assert!(outcome.hardware_changed);
        assert!(!fx.drivers[0].gain_mode());
        assert_eq!(fx.drivers[0].gain(), 30.5);
    }

    #[test]
    fn test_auto_gain_applied_before_gain() {
        let mut fx = Fixture::new();
        fx.login();
        fx.apply_json(r#"{"gain":10,"auto_gain":true}"#);
        assert!(!fx.drivers[0].gain_mode());
        assert_eq!(fx.drivers[0].gain(), 10.0);
    }

    #[test]
    fn test_demod_swap_under_lock() {
        let mut fx = Fixture::new();
        fx.apply_json(r#"{"demod":"USB"}"#);
        assert_eq!(fx.session.receiver.demod(), Demod::Usb);
        assert!(fx.session.dirty.demod);
        assert_eq!(fx.graph.events(), vec![GraphEvent::Lock, GraphEvent::Unlock]);
    }

    #[test]
    fn test_source_bounds() {
        let mut fx = Fixture::new();
        let len = fx.sources.len() as i64;

        fx.apply_json(&format!(r#"{{"source":{len}}}"#));
        assert_eq!(fx.session.receiver.source_ix(), Some(0));
        assert!(!fx.session.dirty.source);
        assert!(!fx.session.dirty.offset);
        assert!(fx.graph.events().is_empty());

        fx.apply_json(r#"{"source":-1}"#);
        assert_eq!(fx.session.receiver.source_ix(), Some(0));

        fx.apply_json(&format!(r#"{{"source":{}}}"#, len - 1));
        assert_eq!(fx.session.receiver.source_ix(), Some(1));
        assert_eq!(fx.session.receiver.freq_offset(), 12_500);
        assert!(fx.session.dirty.source);
        assert!(fx.session.dirty.offset);
    }

    #[test]
    fn test_wrong_typed_key_ignored_alone() {
        let mut fx = Fixture::new();
        fx.apply_json(r#"{"freq_offset":"loud","demod":"AM"}"#);
        assert_eq!(fx.session.receiver.freq_offset(), 0);
        assert!(!fx.session.dirty.offset);
        assert_eq!(fx.session.receiver.demod(), Demod::Am);
    }
}
