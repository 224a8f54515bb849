/// TabDex wallet bridge - Chrome extension that connects a Phantom wallet
/// Built with Rust + WASM + Yew

pub mod agent;
pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pending;
pub mod protocol;
pub mod request_id;
pub mod session;
pub mod store;
pub mod tabs;
pub mod timer;
mod web;
pub mod ui;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Service worker: coordinator
#[wasm_bindgen]
pub fn start_background() {
    web::background::start();
}

// Content script: bridge plus agent injection
#[wasm_bindgen]
pub fn start_bridge() {
    web::content::start();
}

// Page realm: wallet agent
#[wasm_bindgen]
pub fn start_agent() {
    web::inpage::start();
}

// Start the Yew app for the popup
#[wasm_bindgen]
pub fn start_popup() {
    yew::Renderer::<ui::popup::App>::new().render();
}
