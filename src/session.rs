/// Popup login state and what to show the user after a connect attempt
use crate::error::ErrorCode;
use crate::protocol::{ConnectReply, ExtensionRequest};
use crate::store::WalletSession;
use crate::tabs::TabId;

#[derive(Debug, Clone, PartialEq)]
pub enum LoginState {
    LoggedOut,
    Connecting,
    LoggedIn { address: String },
}

/// User-facing result of one connect attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected(String),
    /// No wallet on the page: offer the install page
    OfferInstall,
    /// Anything else: tell the user and stay logged out
    Alert(String),
}

/// Where the popup asks the coordinator to run the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Open the helper page in a new tab
    HelperTab,
    /// The page the user is on, which already runs the content script
    OpenTab(TabId),
}

impl ConnectTarget {
    pub fn request(self) -> ExtensionRequest {
        match self {
            ConnectTarget::HelperTab => ExtensionRequest::OpenConnectTab { url: None },
            ConnectTarget::OpenTab(tab_id) => ExtensionRequest::ConnectTab { tab_id },
        }
    }
}

pub const INSTALL_PROMPT: &str = "Phantom wallet not found. Open install page?";
pub const NO_ADDRESS_ALERT: &str = "No address returned from Phantom.";

impl ConnectOutcome {
    pub fn from_reply(reply: &ConnectReply) -> ConnectOutcome {
        if let Some(error) = &reply.error {
            return match ErrorCode::parse(error) {
                Some(code) if code.is_provider_missing() => ConnectOutcome::OfferInstall,
                _ => ConnectOutcome::Alert(format!("Failed to connect: {}", error)),
            };
        }
        match reply.address() {
            Some(address) => ConnectOutcome::Connected(address.to_string()),
            None => ConnectOutcome::Alert(NO_ADDRESS_ALERT.to_string()),
        }
    }
}

impl LoginState {
    /// State at popup startup
    pub fn from_session(session: Option<&WalletSession>) -> LoginState {
        match session {
            Some(session) => LoginState::LoggedIn {
                address: session.address.clone(),
            },
            None => LoginState::LoggedOut,
        }
    }

    pub fn after(&self, outcome: &ConnectOutcome) -> LoginState {
        match outcome {
            ConnectOutcome::Connected(address) => LoginState::LoggedIn {
                address: address.clone(),
            },
            // a failed retry does not log out an existing session
            ConnectOutcome::OfferInstall | ConnectOutcome::Alert(_) => match self {
                LoginState::LoggedIn { .. } => self.clone(),
                LoginState::LoggedOut | LoginState::Connecting => LoginState::LoggedOut,
            },
        }
    }

    /// `WalletConnected` broadcast from the coordinator
    pub fn on_wallet_connected(&self, address: &str) -> LoginState {
        if address.is_empty() {
            return self.clone();
        }
        LoginState::LoggedIn {
            address: address.to_string(),
        }
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(self, LoginState::LoggedIn { .. })
    }
}

/// `AbCdEf…WxYz` style for display
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
