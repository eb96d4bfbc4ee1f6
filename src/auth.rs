//! Auth header resolution.
//!
//! A manually supplied key or value wins over the stored credential whenever it
//! is non-blank; the two fields are resolved independently. The key defaults to
//! `Authorization`. No header is produced when no source yields a value.
use crate::host::HeaderCredential;

pub const DEFAULT_HEADER_KEY: &str = "Authorization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOrigin {
    Manual,
    Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeader {
    pub name: String,
    pub value: String,
    pub origin: HeaderOrigin,
}

pub fn resolve_auth_header(
    manual_key: &str,
    manual_value: &str,
    credential: Option<&HeaderCredential>,
) -> Option<AuthHeader> {
    let stored_key = credential
        .and_then(|c| c.name.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .unwrap_or(DEFAULT_HEADER_KEY);
    let stored_value = credential
        .and_then(|c| c.value.as_deref())
        .map(str::trim)
        .unwrap_or("");

    let name = match manual_key.trim() {
        "" => stored_key,
        key => key,
    };
    let (value, origin) = match manual_value.trim() {
        "" => (stored_value, HeaderOrigin::Credential),
        value => (value, HeaderOrigin::Manual),
    };

    if value.is_empty() {
        return None;
    }
    Some(AuthHeader { name: name.to_string(), value: value.to_string(), origin })
}
