//! Global hotkey listener
//!
//! Owns the OS keyboard hook. The hook runs on a dedicated
//! "hotkey-listener" thread under a supervisor loop that restarts it when it
//! dies unexpectedly. Key-downs are matched against the registry and fired
//! callbacks are dispatched off the hook thread; key-ups re-arm combos.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::dispatch::Dispatcher;
use super::hook::{
    EventSink, HookError, KeyEventKind, KeyboardHook, RawKeyEvent, ReadySignal,
};
use super::keys::ModifierMask;
use super::registry::HotkeyRegistry;
use crate::events::ServiceEvent;
use crate::permission::PermissionGate;
use crate::state::{ListenerLifecycle, ListenerState};

/// How the supervisor reacts to a hook that died
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Consecutive automatic restarts before giving up until the next
    /// `ensure_running`
    pub max_restarts: u32,
    /// Delay before each automatic restart
    pub backoff: Duration,
    /// A hook that ran at least this long counts as healthy again
    pub stable_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            backoff: Duration::from_millis(500),
            stable_after: Duration::from_secs(30),
        }
    }
}

struct Shared {
    registry: Arc<HotkeyRegistry>,
    hook: Arc<dyn KeyboardHook>,
    gate: Arc<dyn PermissionGate>,
    dispatcher: Dispatcher,
    events: broadcast::Sender<ServiceEvent>,
    policy: RestartPolicy,
    lifecycle: Mutex<ListenerLifecycle>,
    /// Stop flag of the current hook thread
    stop: Mutex<Option<Arc<AtomicBool>>>,
    disposed: AtomicBool,
    /// `ensure_running` arrived while the hook was Faulted
    restart_requested: AtomicBool,
    /// Logical modifiers seen in the latest key event
    held: AtomicU16,
}

/// Process-wide keyboard listener feeding the hotkey registry
pub struct GlobalListener {
    shared: Arc<Shared>,
}

impl GlobalListener {
    /// Create a listener. The hook is not installed until `ensure_running`.
    pub fn new(
        registry: Arc<HotkeyRegistry>,
        hook: Arc<dyn KeyboardHook>,
        gate: Arc<dyn PermissionGate>,
        dispatcher: Dispatcher,
        events: broadcast::Sender<ServiceEvent>,
        policy: RestartPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                hook,
                gate,
                dispatcher,
                events,
                policy,
                lifecycle: Mutex::new(ListenerLifecycle::new()),
                stop: Mutex::new(None),
                disposed: AtomicBool::new(false),
                restart_requested: AtomicBool::new(false),
                held: AtomicU16::new(0),
            }),
        }
    }

    /// Start the hook unless it is already starting or running.
    ///
    /// Permission is re-checked on every call. Returns whether a hook is
    /// (now) active; never blocks on the hook itself.
    pub fn ensure_running(&self) -> bool {
        let shared = &self.shared;
        if shared.disposed.load(Ordering::SeqCst) {
            return false;
        }
        if matches!(
            shared.lifecycle.lock().state(),
            ListenerState::Starting | ListenerState::Running
        ) {
            return true;
        }

        if !shared.gate.has_permission(false) {
            warn!("global hook not started because the input permission is missing");
            let _ = shared.events.send(ServiceEvent::PermissionMissing);
            return false;
        }

        let mut lifecycle = shared.lifecycle.lock();
        if shared.disposed.load(Ordering::SeqCst) {
            return false;
        }
        if lifecycle.state() == ListenerState::Faulted {
            // The supervisor owns the hook thread; it picks this up before
            // deciding to give up
            shared.restart_requested.store(true, Ordering::SeqCst);
            return true;
        }
        if !lifecycle.begin_start() {
            // Another caller won the race
            return lifecycle.state().is_active();
        }

        shared.restart_requested.store(false, Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));
        *shared.stop.lock() = Some(Arc::clone(&stop));

        let thread_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || supervise(thread_shared, stop));

        match spawned {
            Ok(_) => true,
            Err(e) => {
                error!(?e, "failed to spawn hotkey listener thread");
                shared.stop.lock().take();
                lifecycle.reset();
                false
            }
        }
    }

    /// Tear down the hook and drop all active state. Idempotent; the
    /// listener never restarts afterwards.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut lifecycle = shared.lifecycle.lock();
            lifecycle.stop();
            if let Some(stop) = shared.stop.lock().take() {
                stop.store(true, Ordering::SeqCst);
            }
        }

        shared.registry.clear_active();
        shared.held.store(0, Ordering::SeqCst);
        let _ = shared.events.send(ServiceEvent::ListenerStopped);
        info!("hotkey listener disposed");
    }

    pub fn state(&self) -> ListenerState {
        self.shared.lifecycle.lock().state()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }

    /// Logical modifiers held as of the latest key event
    pub fn held_modifiers(&self) -> ModifierMask {
        ModifierMask::from_bits(self.shared.held.load(Ordering::SeqCst))
    }
}

impl Drop for GlobalListener {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Shared {
    fn handle_event(&self, event: RawKeyEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        match event.kind {
            KeyEventKind::KeyDown => {
                self.held
                    .store(event.modifiers.logical().bits(), Ordering::SeqCst);
                for fired in self.registry.try_fire(event.modifiers, event.key) {
                    info!(combo = %fired.combo, "hotkey fired");
                    let _ = self.events.send(ServiceEvent::HotkeyFired {
                        combo: fired.combo.clone(),
                    });
                    self.dispatcher.dispatch(fired);
                }
            }
            KeyEventKind::KeyUp => {
                let after = event.modifiers.without_key(event.key);
                self.held.store(after.logical().bits(), Ordering::SeqCst);
                self.registry.release(event.key);
            }
        }
    }

    fn stopping(&self, stop: &AtomicBool) -> bool {
        stop.load(Ordering::SeqCst) || self.disposed.load(Ordering::SeqCst)
    }

    /// Sleep for the backoff in short slices, returns false if stopped meanwhile
    fn wait_backoff(&self, stop: &AtomicBool) -> bool {
        let slice = Duration::from_millis(20);
        let mut remaining = self.policy.backoff;
        while !remaining.is_zero() {
            if self.stopping(stop) {
                return false;
            }
            let step = remaining.min(slice);
            thread::sleep(step);
            remaining -= step;
        }
        !self.stopping(stop)
    }
}

fn event_sink(shared: &Arc<Shared>) -> EventSink {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    Arc::new(move |event| {
        if let Some(shared) = weak.upgrade() {
            shared.handle_event(event);
        }
    })
}

/// Flips the lifecycle to Running once the hook reports it is installed
fn ready_signal(shared: &Arc<Shared>, stop: &Arc<AtomicBool>) -> ReadySignal {
    let shared = Arc::clone(shared);
    let stop = Arc::clone(stop);
    Box::new(move || {
        {
            let mut lifecycle = shared.lifecycle.lock();
            if shared.stopping(&stop) || lifecycle.mark_running().is_err() {
                return;
            }
        }
        info!(backend = shared.hook.name(), "global hook started");
        let _ = shared.events.send(ServiceEvent::ListenerStarted);
    })
}

/// Body of the hook thread: run the hook, restart it on faults
fn supervise(shared: Arc<Shared>, stop: Arc<AtomicBool>) {
    let sink = event_sink(&shared);

    loop {
        if shared.stopping(&stop) {
            break;
        }

        let result = shared.hook.run(
            Arc::clone(&stop),
            Arc::clone(&sink),
            ready_signal(&shared, &stop),
        );

        shared.registry.clear_active();
        shared.held.store(0, Ordering::SeqCst);

        if shared.stopping(&stop) {
            debug!("global hook stopped on request");
            break;
        }

        let reason = match result {
            Ok(()) => HookError::UnexpectedExit.to_string(),
            Err(e) => e.to_string(),
        };
        error!(%reason, "global hook stopped unexpectedly");

        let within_budget = {
            let mut lifecycle = shared.lifecycle.lock();
            if shared.stopping(&stop) {
                break;
            }
            let _ = lifecycle.mark_faulted(shared.policy.stable_after);
            lifecycle.restarts() < shared.policy.max_restarts
        };
        let restart = within_budget && shared.gate.has_permission(false);

        let _ = shared.events.send(ServiceEvent::ListenerFaulted {
            reason,
            restart_in_ms: restart.then(|| shared.policy.backoff.as_millis() as u64),
        });

        if !restart {
            let mut lifecycle = shared.lifecycle.lock();
            if shared.stopping(&stop) {
                break;
            }
            // An ensure_running that came in while Faulted gets a fresh start
            // with a permission answer from now, not from before the fault
            if shared.restart_requested.swap(false, Ordering::SeqCst)
                && shared.gate.has_permission(false)
            {
                info!("start requested while faulted, restarting global hook");
                lifecycle.reset();
                if !lifecycle.begin_start() {
                    break;
                }
                continue;
            }
            warn!(
                within_budget,
                "global hook not restarted automatically, waiting for next registration"
            );
            lifecycle.reset();
            break;
        }

        if !shared.wait_backoff(&stop) {
            break;
        }

        let mut lifecycle = shared.lifecycle.lock();
        if shared.stopping(&stop) {
            break;
        }
        match lifecycle.restart() {
            Ok(attempt) => {
                shared.restart_requested.store(false, Ordering::SeqCst);
                info!(attempt, "restarting global hook");
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use super::*;
    use crate::hotkey::hook::scripted::{Script, ScriptedHook};
    use crate::hotkey::keys::{KeyCode, Modifier};
    use crate::hotkey::registry::HotkeyCallback;
    use crate::permission::toggle::ToggleGate;

    fn fast_policy() -> RestartPolicy {
        RestartPolicy {
            max_restarts: 2,
            backoff: Duration::from_millis(10),
            stable_after: Duration::from_secs(60),
        }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    struct Fixture {
        registry: Arc<HotkeyRegistry>,
        hook: Arc<ScriptedHook>,
        script: std::sync::mpsc::Sender<Script>,
        gate: Arc<ToggleGate>,
        listener: GlobalListener,
        events: broadcast::Receiver<ServiceEvent>,
    }

    fn fixture(granted: bool) -> Fixture {
        let registry = Arc::new(HotkeyRegistry::new());
        let (hook, script) = ScriptedHook::new();
        let gate = Arc::new(ToggleGate::new(granted));
        let (tx, events) = broadcast::channel(64);
        let listener = GlobalListener::new(
            Arc::clone(&registry),
            hook.clone(),
            gate.clone(),
            Dispatcher::default(),
            tx,
            fast_policy(),
        );
        Fixture {
            registry,
            hook,
            script,
            gate,
            listener,
            events,
        }
    }

    fn counter() -> (HotkeyCallback, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            Arc::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
            count,
        )
    }

    fn ctrl() -> ModifierMask {
        Modifier::Control.mask() | Modifier::Control.left_mask()
    }

    #[test]
    fn test_listener_creation() {
        let f = fixture(true);
        assert_eq!(f.listener.state(), ListenerState::NotRunning);
        assert_eq!(f.hook.runs(), 0);
    }

    #[test]
    fn test_permission_denied_then_granted() {
        let mut f = fixture(false);
        assert!(!f.listener.ensure_running());
        assert_eq!(f.listener.state(), ListenerState::NotRunning);
        assert_eq!(f.events.try_recv().unwrap(), ServiceEvent::PermissionMissing);

        f.gate.set(true);
        assert!(f.listener.ensure_running());
        assert!(wait_until(|| f.hook.is_running()));
        assert_eq!(f.listener.state(), ListenerState::Running);
        assert!(f.gate.checks() >= 2);
    }

    #[test]
    fn test_press_cycle_fires_once_per_press() {
        let f = fixture(true);
        let (callback, count) = counter();
        f.registry.register("Control+K", callback).unwrap();
        assert!(f.listener.ensure_running());

        let events = [
            RawKeyEvent::down(KeyCode::LeftControl, ctrl()),
            RawKeyEvent::down(KeyCode::K, ctrl()),
            // auto-repeat
            RawKeyEvent::down(KeyCode::K, ctrl()),
            RawKeyEvent::up(KeyCode::K, ctrl()),
            RawKeyEvent::up(KeyCode::LeftControl, ctrl()),
            RawKeyEvent::down(KeyCode::LeftControl, ctrl()),
            RawKeyEvent::down(KeyCode::K, ctrl()),
        ];
        for event in events {
            f.script.send(Script::Event(event)).unwrap();
        }

        assert!(wait_until(|| count.load(Ordering::SeqCst) >= 2));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(f.registry.is_active("control+k"));
        assert!(f.listener.held_modifiers().has(Modifier::Control));
    }

    #[test]
    fn test_release_events_never_fire() {
        let f = fixture(true);
        let (callback, count) = counter();
        f.registry.register("Ctrl+K", callback).unwrap();
        f.listener.ensure_running();

        f.script
            .send(Script::Event(RawKeyEvent::up(KeyCode::K, ctrl())))
            .unwrap();
        f.script
            .send(Script::Event(RawKeyEvent::up(KeyCode::LeftControl, ctrl())))
            .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(f.listener.held_modifiers().is_empty());
    }

    #[test]
    fn test_fault_restarts_hook_and_clears_active() {
        let f = fixture(true);
        f.registry.register("F13", Arc::new(|| {})).unwrap();
        f.listener.ensure_running();

        f.script
            .send(Script::Event(RawKeyEvent::down(KeyCode::F13, ModifierMask::NONE)))
            .unwrap();
        assert!(wait_until(|| f.registry.is_active("f13")));

        f.script.send(Script::Fail("tap disabled".to_string())).unwrap();
        assert!(wait_until(|| f.hook.runs() == 2 && f.hook.is_running()));
        assert!(!f.registry.is_active("f13"));
        assert_eq!(f.listener.state(), ListenerState::Running);
    }

    #[test]
    fn test_exhausted_restarts_wait_for_next_ensure_running() {
        let f = fixture(true);
        f.hook.fail_installs(10);
        f.listener.ensure_running();

        // initial run plus max_restarts attempts
        assert!(wait_until(|| f.listener.state() == ListenerState::NotRunning
            && f.hook.runs() == 3));

        f.hook.fail_installs(0);
        assert!(f.listener.ensure_running());
        assert!(wait_until(|| f.hook.is_running()));
        assert_eq!(f.hook.runs(), 4);
    }

    #[test]
    fn test_no_restart_without_permission() {
        let f = fixture(true);
        f.listener.ensure_running();
        assert!(wait_until(|| f.hook.is_running()));

        f.gate.set(false);
        f.script.send(Script::Fail("revoked".to_string())).unwrap();
        assert!(wait_until(|| f.listener.state() == ListenerState::NotRunning));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(f.hook.runs(), 1);
    }

    #[test]
    fn test_concurrent_ensure_running_starts_once() {
        let f = fixture(true);
        let listener = Arc::new(f.listener);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let listener = Arc::clone(&listener);
                thread::spawn(move || listener.ensure_running())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }

        assert!(wait_until(|| f.hook.is_running()));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(f.hook.runs(), 1);
    }

    #[test]
    fn test_dispose_is_idempotent_and_terminal() {
        let mut f = fixture(true);
        f.registry.register("F13", Arc::new(|| {})).unwrap();
        f.listener.ensure_running();
        assert!(wait_until(|| f.hook.is_running()));
        f.script
            .send(Script::Event(RawKeyEvent::down(KeyCode::F13, ModifierMask::NONE)))
            .unwrap();
        assert!(wait_until(|| f.registry.is_active("f13")));

        f.listener.dispose();
        f.listener.dispose();

        assert_eq!(f.listener.state(), ListenerState::Stopped);
        assert!(!f.registry.is_active("f13"));
        assert!(wait_until(|| !f.hook.is_running()));
        assert!(!f.listener.ensure_running());
        assert_eq!(f.hook.runs(), 1);

        let mut stopped = 0;
        while let Ok(event) = f.events.try_recv() {
            if event == ServiceEvent::ListenerStopped {
                stopped += 1;
            }
        }
        assert_eq!(stopped, 1);
    }
    /// Denies the supervisor's first post-fault check and holds it until
    /// released; every other check is granted
    struct StallingGate {
        entered: parking_lot::Mutex<Option<std::sync::mpsc::Sender<()>>>,
        release: parking_lot::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl PermissionGate for StallingGate {
        fn has_permission(&self, _prompt_user: bool) -> bool {
            if thread::current().name() != Some("hotkey-listener") {
                return true;
            }
            let Some(entered) = self.entered.lock().take() else {
                return true;
            };
            let _ = entered.send(());
            if let Some(release) = self.release.lock().take() {
                let _ = release.recv();
            }
            false
        }

        fn request_permission(&self) -> bool {
            true
        }

        fn is_restricted(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_ensure_running_while_faulted_is_not_lost() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let gate = Arc::new(StallingGate {
            entered: parking_lot::Mutex::new(Some(entered_tx)),
            release: parking_lot::Mutex::new(Some(release_rx)),
        });
        let (hook, script) = ScriptedHook::new();
        let (tx, _events) = broadcast::channel(64);
        let listener = GlobalListener::new(
            Arc::new(HotkeyRegistry::new()),
            hook.clone(),
            gate,
            Dispatcher::default(),
            tx,
            fast_policy(),
        );

        assert!(listener.ensure_running());
        assert!(wait_until(|| hook.is_running()));

        // Supervisor faults, then stalls on a stale "denied" answer
        script.send(Script::Fail("tap disabled".to_string())).unwrap();
        entered_rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(listener.state(), ListenerState::Faulted);

        // Permission granted meanwhile
        assert!(listener.ensure_running());
        release_tx.send(()).unwrap();

        assert!(wait_until(|| hook.runs() == 2 && hook.is_running()));
        assert_eq!(listener.state(), ListenerState::Running);
    }

    #[test]
    fn test_failed_install_never_reports_started() {
        let mut f = fixture(true);
        f.hook.fail_installs(10);
        f.listener.ensure_running();
        assert!(wait_until(|| f.listener.state() == ListenerState::NotRunning
            && f.hook.runs() == 3));

        let mut started = 0;
        let mut faulted = 0;
        while let Ok(event) = f.events.try_recv() {
            match event {
                ServiceEvent::ListenerStarted => started += 1,
                ServiceEvent::ListenerFaulted { .. } => faulted += 1,
                _ => {}
            }
        }
        assert_eq!(started, 0);
        assert_eq!(faulted, 3);
    }

    #[test]
    fn test_running_is_reported_after_install() {
        let mut f = fixture(true);
        f.listener.ensure_running();
        assert!(wait_until(|| f.hook.is_running()));
        assert_eq!(f.listener.state(), ListenerState::Running);
        assert_eq!(f.events.try_recv().unwrap(), ServiceEvent::ListenerStarted);
    }
}
