//! ComfyUI workflow nodes.
//!
//! Modules:
//! - `dispatcher`: action node issuing queue and model inventory calls.
//! - `listener`: trigger node holding a reconnecting event-stream socket.
//! - `comfyui`: HTTP client with the `/api` fallback policy.
//! - `auth`: manual-vs-credential auth header resolution.
//! - `host`: parameter, credential and emit seams owned by the workflow host.
//! - `api`: Axum handlers exposing both nodes over HTTP.
//! - `config`: Env-driven configuration loader.
//! - `error`: Common error type and alias.
//!
//! Re-exports are provided for common types: `Config`, `ComfyUIClient`,
//! `Dispatcher` and `ListenerHandle`.
pub mod api;
pub mod auth;
pub mod comfyui;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod listener;

pub use config::Config;
pub use comfyui::client::ComfyUIClient;
pub use dispatcher::Dispatcher;
pub use listener::ListenerHandle;
