//! Env-driven configuration for the host binaries.
//!
//! Values are read from the process environment; `dotenv` is loaded on demand
//! by the binaries. `COMFYUI_HEADER_KEY` / `COMFYUI_HEADER_VALUE` play the role
//! of the stored credential that manual header parameters can override.
use std::env;

use crate::host::HeaderCredential;

pub struct Config {
    pub comfyui_url: String,
    pub header_key: Option<String>,
    pub header_value: Option<String>,
    pub api_host: String,
    pub api_port: String,
}

impl Config {
    pub fn dotenv_load() {
        dotenv::dotenv().ok();
    }

    pub fn new() -> Self {
        Config {
            comfyui_url: env::var("COMFYUI_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".to_string()),
            header_key: env::var("COMFYUI_HEADER_KEY").ok().filter(|v| !v.trim().is_empty()),
            header_value: env::var("COMFYUI_HEADER_VALUE").ok().filter(|v| !v.trim().is_empty()),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            api_port: env::var("API_PORT").unwrap_or_else(|_| "8189".to_string()),
        }
    }

    /// The stored credential, if the environment provides a header value.
    pub fn credential(&self) -> Option<HeaderCredential> {
        self.header_value.as_ref().map(|value| HeaderCredential {
            name: self.header_key.clone(),
            value: Some(value.clone()),
        })
    }

    pub fn log_env_vars() {
        for key in ["COMFYUI_URL", "COMFYUI_HEADER_KEY", "API_HOST", "API_PORT"] {
            let value = env::var(key).unwrap_or_else(|_| "<unset>".to_string());
            tracing::info!("{}: {}", key, value);
        }
        let header_value = if env::var("COMFYUI_HEADER_VALUE").is_ok() { "<set>" } else { "<unset>" };
        tracing::info!("COMFYUI_HEADER_VALUE: {}", header_value);
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
