/// Content-script bridge between the extension and the page-injected agent
use crate::error::HandshakeError;
use crate::pending::PendingMap;
use crate::protocol::{BridgeMessage, ConnectReply, ExtensionRequest, PageMessage, PagePort, PingReply, Reply};
use crate::request_id::RequestId;
use crate::timer::Timer;
use futures::future::{self, LocalBoxFuture};
use log::{debug, info, warn};
use std::rc::Rc;
use std::time::Duration;

/// `id` of the agent's script element
pub const AGENT_SCRIPT_ID: &str = "tabdex-wallet-agent";
/// Bundled resource loaded into the page
pub const AGENT_SCRIPT_PATH: &str = "agent.js";

/// `document.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

impl ReadyState {
    pub fn parse(s: &str) -> ReadyState {
        match s {
            "interactive" => ReadyState::Interactive,
            "complete" => ReadyState::Complete,
            _ => ReadyState::Loading,
        }
    }

    /// Inject now, or wait for DOMContentLoaded
    pub fn can_inject(self) -> bool {
        !matches!(self, ReadyState::Loading)
    }
}

pub trait ScriptInjector {
    fn is_injected(&self) -> bool;

    /// Append the agent's script element; the injector announces readiness
    /// once the script has loaded
    fn inject(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Injection {
    Injected,
    AlreadyPresent,
    Failed(String),
}

pub fn inject_agent(injector: &dyn ScriptInjector) -> Injection {
    if injector.is_injected() {
        debug!("agent script already present");
        return Injection::AlreadyPresent;
    }
    match injector.inject() {
        Ok(()) => Injection::Injected,
        Err(e) => {
            warn!("failed to inject agent script: {}", e);
            Injection::Failed(e)
        }
    }
}

pub struct Bridge<P: PagePort> {
    pending: PendingMap<RequestId, ConnectReply>,
    port: P,
    timer: Rc<dyn Timer>,
    page_reply_timeout: Duration,
}

impl<P: PagePort> Bridge<P> {
    pub fn new(port: P, timer: Rc<dyn Timer>, page_reply_timeout: Duration) -> Self {
        Bridge {
            pending: PendingMap::new(),
            port,
            timer,
            page_reply_timeout,
        }
    }

    /// Extension-channel entry point
    pub fn handle_request(&self, request: ExtensionRequest) -> Reply {
        match request {
            ExtensionRequest::Ping => Reply::now(&self.ping()),
            ExtensionRequest::Connect => Reply::later(self.connect()),
            // coordinator and popup traffic
            ExtensionRequest::OpenConnectTab { .. }
            | ExtensionRequest::ConnectTab { .. }
            | ExtensionRequest::OpenTabs { .. }
            | ExtensionRequest::WalletConnected { .. } => Reply::Ignored,
        }
    }

    pub fn ping(&self) -> PingReply {
        PingReply { ok: true }
    }

    /// Ask the agent to connect. The returned future resolves once the agent
    /// answers or the page reply deadline passes.
    pub fn connect(&self) -> LocalBoxFuture<'static, ConnectReply> {
        let request_id = RequestId::generate(self.timer.now_ms());
        let waiter = match self.pending.register(request_id.clone()) {
            Ok(waiter) => waiter,
            Err(e) => return Box::pin(future::ready(ConnectReply::failed(e))),
        };

        if let Err(e) = self.port.post(&PageMessage::request_connect(request_id.clone())) {
            warn!("connect {}: could not reach page: {}", request_id, e);
            return Box::pin(future::ready(ConnectReply::failed(HandshakeError::Message(e))));
        }
        info!("connect {}: sent to page", request_id);

        let timer = self.timer.clone();
        let deadline = self.page_reply_timeout;
        Box::pin(async move {
            waiter
                .wait(timer.as_ref(), deadline)
                .await
                .unwrap_or_else(ConnectReply::failed)
        })
    }

    /// Window-channel entry point
    pub fn handle_page_message(&self, message: PageMessage) {
        match message {
            PageMessage::ToBridge(BridgeMessage::AgentConnectResult {
                request_id,
                address,
                error,
            }) => {
                if !self.pending.resolve(&request_id, ConnectReply { address, error }) {
                    debug!("connect {}: unmatched page reply dropped", request_id);
                }
            }
            PageMessage::ToBridge(BridgeMessage::AgentReady) => {
                info!("wallet agent ready");
            }
            // our own broadcast echoing back
            PageMessage::ToAgent(_) => {}
        }
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::RecordingPort;
    use crate::error::ErrorCode;
    use crate::protocol::AgentMessage;
    use crate::timer::testing::ManualTimer;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    const DEADLINE: Duration = Duration::from_secs(120);

    struct Harness {
        bridge: Bridge<RecordingPort>,
        port: RecordingPort,
        timer: Rc<ManualTimer>,
        pool: LocalPool,
    }

    impl Harness {
        fn new() -> Self {
            let port = RecordingPort::default();
            let timer = Rc::new(ManualTimer::default());
            Harness {
                bridge: Bridge::new(port.clone(), timer.clone(), DEADLINE),
                port,
                timer,
                pool: LocalPool::new(),
            }
        }

        /// Start a connect and return where its reply lands
        fn start_connect(&mut self) -> (RequestId, Rc<RefCell<Option<ConnectReply>>>) {
            let slot = Rc::new(RefCell::new(None));
            let work = self.bridge.connect();
            {
                let slot = slot.clone();
                self.pool
                    .spawner()
                    .spawn_local(async move {
                        *slot.borrow_mut() = Some(work.await);
                    })
                    .unwrap();
            }
            self.pool.run_until_stalled();

            let sent = self.port.take();
            let request_id = match sent.as_slice() {
                [PageMessage::ToAgent(AgentMessage::RequestConnect { request_id })] => request_id.clone(),
                other => panic!("expected one RequestConnect, got {:?}", other),
            };
            (request_id, slot)
        }

        fn page_reply(&mut self, request_id: &RequestId, address: Option<&str>, error: Option<&str>) {
            self.bridge.handle_page_message(PageMessage::ToBridge(BridgeMessage::AgentConnectResult {
                request_id: request_id.clone(),
                address: address.map(str::to_string),
                error: error.map(str::to_string),
            }));
            self.pool.run_until_stalled();
        }
    }

    struct FakeInjector {
        present: Cell<bool>,
        injections: Cell<u32>,
    }

    impl ScriptInjector for FakeInjector {
        fn is_injected(&self) -> bool {
            self.present.get()
        }

        fn inject(&self) -> Result<(), String> {
            self.present.set(true);
            self.injections.set(self.injections.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_ping_answers_synchronously() {
        let harness = Harness::new();
        match harness.bridge.handle_request(ExtensionRequest::Ping) {
            Reply::Now(body) => assert_eq!(body, json!({"ok": true})),
            _ => panic!("ping must answer immediately"),
        }
    }

    #[test]
    fn test_connect_keeps_channel_open() {
        let harness = Harness::new();
        let reply = harness.bridge.handle_request(ExtensionRequest::Connect);

        assert!(reply.keeps_channel_open());
        assert_eq!(harness.bridge.outstanding(), 1);
    }

    #[test]
    fn test_connect_reply_body_carries_address() {
        let mut harness = Harness::new();
        let Reply::Later(work) = harness.bridge.handle_request(ExtensionRequest::Connect) else {
            panic!("connect must answer later");
        };
        let body = Rc::new(RefCell::new(None));
        {
            let body = body.clone();
            harness
                .pool
                .spawner()
                .spawn_local(async move {
                    *body.borrow_mut() = Some(work.await);
                })
                .unwrap();
        }
        harness.pool.run_until_stalled();

        let request_id = match harness.port.take().as_slice() {
            [PageMessage::ToAgent(AgentMessage::RequestConnect { request_id })] => request_id.clone(),
            other => panic!("expected one RequestConnect, got {:?}", other),
        };
        harness.page_reply(&request_id, Some("Addr123"), None);

        assert_eq!(*body.borrow(), Some(json!({"address": "Addr123"})));
    }

    #[test]
    fn test_coordinator_kinds_are_not_answered() {
        let harness = Harness::new();
        let reply = harness.bridge.handle_request(ExtensionRequest::OpenConnectTab { url: None });
        assert!(matches!(reply, Reply::Ignored));
    }

    #[test]
    fn test_page_reply_routes_to_its_request() {
        let mut harness = Harness::new();
        let (id, slot) = harness.start_connect();
        assert!(slot.borrow().is_none());

        harness.page_reply(&id, Some("Addr123"), None);

        assert_eq!(*slot.borrow(), Some(ConnectReply::connected("Addr123")));
        assert_eq!(harness.bridge.outstanding(), 0);
    }

    #[test]
    fn test_concurrent_connects_resolve_independently() {
        let mut harness = Harness::new();
        let (first, first_slot) = harness.start_connect();
        let (second, second_slot) = harness.start_connect();
        assert_ne!(first, second);

        harness.page_reply(&second, None, Some("User rejected"));
        assert!(first_slot.borrow().is_none());
        assert_eq!(second_slot.borrow().as_ref().and_then(|r| r.error.clone()), Some("User rejected".to_string()));

        harness.page_reply(&first, Some("Addr123"), None);
        assert_eq!(*first_slot.borrow(), Some(ConnectReply::connected("Addr123")));
    }

    #[test]
    fn test_duplicate_and_unknown_replies_are_dropped() {
        let mut harness = Harness::new();
        let (id, slot) = harness.start_connect();

        harness.page_reply(&RequestId::from("not-ours"), Some("Evil"), None);
        assert!(slot.borrow().is_none());
        assert_eq!(harness.bridge.outstanding(), 1);

        harness.page_reply(&id, Some("Addr123"), None);
        harness.page_reply(&id, Some("Other"), None);
        assert_eq!(*slot.borrow(), Some(ConnectReply::connected("Addr123")));
    }

    #[test]
    fn test_silent_page_times_out_and_clears_entry() {
        let mut harness = Harness::new();
        let (id, slot) = harness.start_connect();

        harness.timer.fire_all();
        harness.pool.run_until_stalled();

        assert_eq!(*slot.borrow(), Some(ConnectReply::failed(ErrorCode::Timeout)));
        assert_eq!(harness.bridge.outstanding(), 0);

        // the agent answering late changes nothing
        harness.page_reply(&id, Some("Addr123"), None);
        assert_eq!(*slot.borrow(), Some(ConnectReply::failed(ErrorCode::Timeout)));
    }

    #[test]
    fn test_own_broadcast_and_ready_are_harmless() {
        let harness = Harness::new();
        harness.bridge.handle_page_message(PageMessage::request_connect(RequestId::from("x")));
        harness.bridge.handle_page_message(PageMessage::ToBridge(BridgeMessage::AgentReady));
        assert_eq!(harness.bridge.outstanding(), 0);
    }

    #[test]
    fn test_ready_state_gates_injection() {
        assert!(!ReadyState::parse("loading").can_inject());
        assert!(ReadyState::parse("interactive").can_inject());
        assert!(ReadyState::parse("complete").can_inject());
    }

    #[test]
    fn test_inject_agent_only_once() {
        let injector = FakeInjector {
            present: Cell::new(false),
            injections: Cell::new(0),
        };

        assert_eq!(inject_agent(&injector), Injection::Injected);
        assert_eq!(inject_agent(&injector), Injection::AlreadyPresent);
        assert_eq!(injector.injections.get(), 1);
    }
}
