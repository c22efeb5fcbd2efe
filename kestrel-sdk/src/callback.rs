//! Listener registry and synchronous event dispatch.

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::{Command, CommandSink};
use crate::error::{ParserError, SendError};
use crate::event::{Event, EventKind};
use crate::modes::ModeRegistry;
use crate::state::Network;

/// A registered event handler.
///
/// Handlers run on the connection task, in registration order, while the
/// line that caused the event is still being processed. Returning `Err`
/// (or panicking) is reported as an [`Event::ErrorInfo`] and does not stop
/// delivery to the remaining handlers.
pub type Handler = Box<dyn FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Which events a listener receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Kind(EventKind),
    All,
}

/// Read-only view of the connection handed to every handler, plus a send
/// queue. Commands sent here are written once the current line is done.
pub struct Context<'a> {
    network: &'a Network,
    modes: &'a ModeRegistry,
    outbox: &'a RefCell<Vec<Command>>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(
        network: &'a Network,
        modes: &'a ModeRegistry,
        outbox: &'a RefCell<Vec<Command>>,
    ) -> Self {
        Self {
            network,
            modes,
            outbox,
        }
    }

    pub fn network(&self) -> &Network {
        self.network
    }

    pub fn modes(&self) -> &ModeRegistry {
        self.modes
    }
}

impl CommandSink for Context<'_> {
    fn send(&self, command: Command) -> Result<(), SendError> {
        self.outbox.borrow_mut().push(command);
        Ok(())
    }
}

struct Listener {
    id: ListenerId,
    filter: Filter,
    target: Option<String>,
    handler: Handler,
}

impl Listener {
    fn matches(&self, event: &Event, network: &Network) -> bool {
        let kind_ok = match self.filter {
            Filter::All => true,
            Filter::Kind(kind) => kind == event.kind(),
        };
        kind_ok
            && match &self.target {
                None => true,
                Some(target) => event
                    .channel()
                    .is_some_and(|c| network.casemap.eq(c, target)),
            }
    }
}

pub struct CallbackManager {
    listeners: Vec<Listener>,
    next_id: Arc<AtomicU64>,
}

impl Default for CallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackManager {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The id counter, shared with remote handles so they can hand out ids
    /// for registrations that are applied later on the connection task.
    pub fn id_source(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.next_id)
    }

    pub(crate) fn allocate_id(source: &AtomicU64) -> ListenerId {
        ListenerId(source.fetch_add(1, Ordering::Relaxed))
    }

    pub fn register<F>(&mut self, kind: EventKind, handler: F) -> ListenerId
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(Filter::Kind(kind), None, Box::new(handler))
    }

    /// One listener for every event kind. [`Self::unregister`] on the
    /// returned id removes it from all of them at once.
    pub fn register_all<F>(&mut self, handler: F) -> ListenerId
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(Filter::All, None, Box::new(handler))
    }

    /// Only receive `kind` events about `channel`.
    pub fn register_for_target<F>(&mut self, kind: EventKind, channel: &str, handler: F) -> ListenerId
    where
        F: FnMut(&Event, &Context<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.add(Filter::Kind(kind), Some(channel.to_string()), Box::new(handler))
    }

    fn add(&mut self, filter: Filter, target: Option<String>, handler: Handler) -> ListenerId {
        let id = Self::allocate_id(&self.next_id);
        self.insert(id, filter, target, handler);
        id
    }

    /// Register under an id that was allocated elsewhere.
    pub(crate) fn insert(
        &mut self,
        id: ListenerId,
        filter: Filter,
        target: Option<String>,
        handler: Handler,
    ) {
        self.listeners.push(Listener {
            id,
            filter,
            target,
            handler,
        });
    }

    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Drop every listener registered for exactly `kind`.
    pub fn unregister_every(&mut self, kind: EventKind) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.filter != Filter::Kind(kind));
        before - self.listeners.len()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every matching listener. Returns whether a
    /// listener registered for this specific kind ran; catch-all listeners
    /// observe but never count as handling.
    pub fn fire(&mut self, event: &Event, ctx: &Context<'_>) -> bool {
        let kind = event.kind();
        let mut handled = false;
        let mut failures = Vec::new();

        for listener in &mut self.listeners {
            if !listener.matches(event, ctx.network) {
                continue;
            }
            handled |= listener.filter != Filter::All;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (listener.handler)(event, ctx)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failures.push(
                    ParserError::error(format!("listener for {kind:?} failed")).with_cause(e),
                ),
                Err(payload) => failures.push(ParserError::error(format!(
                    "listener for {kind:?} panicked: {}",
                    panic_message(payload.as_ref())
                ))),
            }
        }

        for failure in failures {
            tracing::error!(%failure, "event listener failed");
            // A failing error listener must not re-enter itself.
            if kind != EventKind::ErrorInfo {
                self.fire(&Event::ErrorInfo(failure), ctx);
            }
        }
        handled
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Fixture {
        network: Network,
        modes: ModeRegistry,
        outbox: RefCell<Vec<Command>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                network: Network::new("me"),
                modes: ModeRegistry::new(),
                outbox: RefCell::new(Vec::new()),
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context::new(&self.network, &self.modes, &self.outbox)
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&log), log)
    }

    #[test]
    fn fires_in_registration_order() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        let (log, seen) = recorder();
        for name in ["first", "second", "third"] {
            let log = Arc::clone(&log);
            cb.register(EventKind::Post005, move |_, _| {
                log.lock().unwrap().push(name.to_string());
                Ok(())
            });
        }
        assert!(cb.fire(&Event::Post005, &fx.ctx()));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn returns_false_when_nobody_listens() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        cb.register(EventKind::Post005, |_, _| Ok(()));
        assert!(!cb.fire(&Event::PasswordRequired, &fx.ctx()));
    }

    #[test]
    fn failing_handler_becomes_error_info() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        let (log, seen) = recorder();

        cb.register(EventKind::Post005, |_, _| anyhow::bail!("nope"));
        cb.register(EventKind::Post005, |_, _| panic!("kaboom"));
        let l = Arc::clone(&log);
        cb.register(EventKind::Post005, move |_, _| {
            l.lock().unwrap().push("survivor".into());
            Ok(())
        });
        let l = Arc::clone(&log);
        cb.register(EventKind::ErrorInfo, move |ev, _| {
            if let Event::ErrorInfo(err) = ev {
                l.lock().unwrap().push(err.to_string());
            }
            Ok(())
        });

        assert!(cb.fire(&Event::Post005, &fx.ctx()));
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], "survivor");
        assert_eq!(seen[1], "[error] listener for Post005 failed: nope");
        assert_eq!(seen[2], "[error] listener for Post005 panicked: kaboom");
    }

    #[test]
    fn failing_error_listener_does_not_recurse() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        cb.register(EventKind::ErrorInfo, |_, _| anyhow::bail!("again"));
        assert!(cb.fire(&Event::ErrorInfo(ParserError::warning("w")), &fx.ctx()));
    }

    #[test]
    fn target_listener_only_sees_its_channel() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        let (log, seen) = recorder();
        cb.register_for_target(EventKind::ChannelGotNames, "#Rust", move |ev, _| {
            log.lock().unwrap().push(ev.channel().unwrap_or_default().to_string());
            Ok(())
        });

        assert!(!cb.fire(&Event::ChannelGotNames { channel: "#go".into() }, &fx.ctx()));
        assert!(cb.fire(&Event::ChannelGotNames { channel: "#rust".into() }, &fx.ctx()));
        assert_eq!(*seen.lock().unwrap(), vec!["#rust"]);
    }

    #[test]
    fn register_all_and_unregister() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        let (log, seen) = recorder();
        let id = cb.register_all(move |ev, _| {
            log.lock().unwrap().push(format!("{:?}", ev.kind()));
            Ok(())
        });
        cb.fire(&Event::Post005, &fx.ctx());
        cb.fire(&Event::PasswordRequired, &fx.ctx());
        assert!(cb.unregister(id));
        assert!(!cb.fire(&Event::Post005, &fx.ctx()));
        assert_eq!(*seen.lock().unwrap(), vec!["Post005", "PasswordRequired"]);
        assert!(!cb.unregister(id));
    }

    #[test]
    fn catch_all_listener_does_not_handle() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        cb.register_all(|_, _| Ok(()));
        assert!(!cb.fire(&Event::NickInUse { nickname: "me".into() }, &fx.ctx()));
        cb.register(EventKind::NickInUse, |_, _| Ok(()));
        assert!(cb.fire(&Event::NickInUse { nickname: "me".into() }, &fx.ctx()));
    }

    #[test]
    fn unregister_every_kind() {
        let mut cb = CallbackManager::new();
        cb.register(EventKind::Post005, |_, _| Ok(()));
        cb.register(EventKind::Post005, |_, _| Ok(()));
        cb.register_all(|_, _| Ok(()));
        assert_eq!(cb.unregister_every(EventKind::Post005), 2);
        assert_eq!(cb.len(), 1);
    }

    #[test]
    fn handlers_can_queue_commands() {
        let fx = Fixture::new();
        let mut cb = CallbackManager::new();
        cb.register(EventKind::Post005, |_, ctx| {
            ctx.join_channel("#rust", None)?;
            Ok(())
        });
        cb.fire(&Event::Post005, &fx.ctx());
        assert_eq!(
            *fx.outbox.borrow(),
            vec![Command::Join { channel: "#rust".into(), key: None }]
        );
    }
}
