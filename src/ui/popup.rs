/// Popup UI: login state and the connect button
use crate::config::HandshakeConfig;
use crate::error::HandshakeError;
use crate::protocol::{ConnectReply, ExtensionRequest, Inbound, Reply};
use crate::session::{ConnectOutcome, ConnectTarget, INSTALL_PROMPT, LoginState, short_address};
use crate::store::WalletSession;
use crate::web::chrome::{ChromeStore, active_tab, listen_extension_requests, open_tab, send_runtime_message};
use log::{info, warn};
use patternfly_yew::prelude::*;
use std::rc::Rc;
use wasm_bindgen_futures::spawn_local;
use yew::prelude::*;

#[derive(Clone, PartialEq)]
struct Login(LoginState);

enum LoginAction {
    Restored(Option<WalletSession>),
    Started,
    Finished { previous: LoginState, outcome: ConnectOutcome },
    Broadcast(String),
}

impl Reducible for Login {
    type Action = LoginAction;

    fn reduce(self: Rc<Self>, action: LoginAction) -> Rc<Self> {
        let next = match action {
            // a connect that finished first wins over the stored session
            LoginAction::Restored(session) => match &self.0 {
                LoginState::LoggedOut => LoginState::from_session(session.as_ref()),
                state => state.clone(),
            },
            LoginAction::Started => LoginState::Connecting,
            LoginAction::Finished { previous, outcome } => previous.after(&outcome),
            LoginAction::Broadcast(address) => self.0.on_wallet_connected(&address),
        };
        Rc::new(Login(next))
    }
}

#[function_component(App)]
pub fn app() -> Html {
    let login = use_reducer(|| Login(LoginState::LoggedOut));

    // Restore the session and follow WalletConnected broadcasts
    {
        let login = login.dispatcher();
        use_effect_with((), move |_| {
            {
                let login = login.clone();
                spawn_local(async move {
                    let session = WalletSession::load(&ChromeStore).await.unwrap_or_else(|e| {
                        warn!("could not read wallet session: {}", e);
                        None
                    });
                    login.dispatch(LoginAction::Restored(session));
                });
            }

            listen_extension_requests(move |inbound| {
                if let Inbound::Request(ExtensionRequest::WalletConnected { address }) = inbound {
                    login.dispatch(LoginAction::Broadcast(address));
                }
                Reply::Ignored
            });
            || ()
        });
    }

    // One handler per button; `in_page` runs the handshake in the active tab
    let connect_handler = {
        let login = login.clone();
        move |in_page: bool| {
            let login = login.clone();
            Callback::from(move |_: MouseEvent| {
                let previous = login.0.clone();
                let login = login.dispatcher();
                login.dispatch(LoginAction::Started);

                spawn_local(async move {
                    let reply = if in_page {
                        match active_tab().await {
                            Ok(tab_id) => request_connect(ConnectTarget::OpenTab(tab_id)).await,
                            Err(e) => ConnectReply::failed(HandshakeError::Message(e)),
                        }
                    } else {
                        request_connect(ConnectTarget::HelperTab).await
                    };
                    let outcome = ConnectOutcome::from_reply(&reply);
                    present(&outcome).await;
                    login.dispatch(LoginAction::Finished { previous, outcome });
                });
            })
        }
    };

    let connecting = login.0 == LoginState::Connecting;

    html! {
        <div class="padding-20">
            <h1 class="popup-title">{"TabDex"}</h1>

            {match &login.0 {
                LoginState::LoggedIn { address } => html! {
                    <div class="message-top-margin">
                        <p class="message-text">{"Connected wallet"}</p>
                        <p class="wallet-address" title={address.clone()}>{short_address(address)}</p>
                    </div>
                },
                LoginState::LoggedOut | LoginState::Connecting => html! {
                    <div class="flex-column-gap">
                        <p class="message-text">{"Connect your Phantom wallet to get started."}</p>
                        <Button onclick={connect_handler(false)} disabled={connecting} variant={ButtonVariant::Primary} block={true}>
                            {"Connect Phantom"}
                        </Button>
                        <Button onclick={connect_handler(true)} disabled={connecting} variant={ButtonVariant::Secondary} block={true}>
                            {"Connect on this page"}
                        </Button>
                        if connecting {
                            <div class="loading-text-center">
                                <Spinner />
                                <p class="loading-text">{"Waiting for Phantom..."}</p>
                            </div>
                        }
                    </div>
                },
            }}

            <p class="footer-popup">
                {"TabDex v0.1.0"}
            </p>
        </div>
    }
}

// Helper functions

async fn request_connect(target: ConnectTarget) -> ConnectReply {
    match send_runtime_message(&target.request()).await {
        Ok(Some(body)) => serde_json::from_value(body).unwrap_or_else(|e| {
            warn!("unreadable connect reply: {}", e);
            ConnectReply::default()
        }),
        Ok(None) => ConnectReply::default(),
        Err(e) => ConnectReply::failed(HandshakeError::Message(e)),
    }
}

/// Dialogs for the outcome; a confirmed install offer opens the install page
async fn present(outcome: &ConnectOutcome) {
    let Some(window) = web_sys::window() else {
        return;
    };

    match outcome {
        ConnectOutcome::Connected(address) => info!("connected {}", short_address(address)),
        ConnectOutcome::OfferInstall => {
            if window.confirm_with_message(INSTALL_PROMPT).unwrap_or(false) {
                let config = HandshakeConfig::load(&ChromeStore).await;
                if let Err(e) = open_tab(&config.install_url).await {
                    warn!("could not open install page: {}", e);
                }
            }
        }
        ConnectOutcome::Alert(message) => {
            let _ = window.alert_with_message(message);
        }
    }
}
