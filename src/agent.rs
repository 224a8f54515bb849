/// Page-injected agent: the only code that can reach the page's wallet object.
///
/// It answers `RequestConnect` with exactly one `AgentConnectResult` carrying
/// the same request id, whether the wallet is missing, approves, or refuses.
use crate::error::{ErrorCode, HandshakeError};
use crate::protocol::{AgentMessage, ConnectReply, PageMessage, PagePort};
use crate::request_id::RequestId;
use async_trait::async_trait;
use log::{debug, info, warn};
use thiserror::Error;

#[async_trait(?Send)]
pub trait WalletProvider {
    /// Ask the wallet for its public key. `only_if_trusted = false` means the
    /// user may be shown an approval prompt.
    async fn connect(&self, only_if_trusted: bool) -> Result<String, HandshakeError>;
}

/// Finds the wallet on the page, if one is installed
pub trait ProviderLocator {
    type Provider: WalletProvider;

    fn locate(&self) -> Option<Self::Provider>;
}

/// Realm-wide "agent installed" marker
pub trait RealmFlag {
    fn is_set(&self) -> bool;
    fn set(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wallet agent is already installed in this realm")]
pub struct AlreadyInstalled;

pub struct Agent<L: ProviderLocator, P: PagePort> {
    locator: L,
    port: P,
}

impl<L: ProviderLocator, P: PagePort> Agent<L, P> {
    /// Claims the realm flag. A second install in the same realm fails and
    /// the caller must not attach another listener.
    pub fn install(flag: &dyn RealmFlag, locator: L, port: P) -> Result<Self, AlreadyInstalled> {
        if flag.is_set() {
            return Err(AlreadyInstalled);
        }
        flag.set();
        info!("wallet agent installed");
        Ok(Agent { locator, port })
    }

    /// Handle one window message. Messages for the bridge are not ours.
    pub async fn handle(&self, message: PageMessage) {
        match message {
            PageMessage::ToAgent(AgentMessage::RequestConnect { request_id }) => {
                let reply = self.connect(&request_id).await;
                self.reply(request_id, reply);
            }
            PageMessage::ToBridge(_) => {}
        }
    }

    async fn connect(&self, request_id: &RequestId) -> ConnectReply {
        let Some(provider) = self.locator.locate() else {
            warn!("connect {}: no wallet provider on this page", request_id);
            return ConnectReply::failed(ErrorCode::ProviderNotFound);
        };

        debug!("connect {}: waiting on wallet approval", request_id);
        match provider.connect(false).await {
            Ok(address) => ConnectReply::connected(address),
            Err(e) => {
                info!("connect {}: wallet refused: {}", request_id, e);
                ConnectReply::failed(e)
            }
        }
    }

    fn reply(&self, request_id: RequestId, reply: ConnectReply) {
        let request = request_id.to_string();
        if let Err(e) = self.port.post(&PageMessage::connect_result(request_id, reply)) {
            warn!("connect {}: could not post result: {}", request, e);
        }
    }
}
