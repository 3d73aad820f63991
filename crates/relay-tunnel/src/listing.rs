//! Tunnel identifier discovery from `cloudflared tunnel list`
//!
//! The structured (`--output json`) listing is preferred. The text listing is
//! a fallback for clients that do not support it; it relies on the
//! identifier being the first whitespace-delimited field of the line that
//! carries the tunnel name.

use regex::Regex;
use relay_core::{RelayError, Result};
use serde::Deserialize;
use std::sync::LazyLock;

const TUNNEL_ID_PATTERN: &str =
    r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";

#[allow(clippy::expect_used)]
static TUNNEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TUNNEL_ID_PATTERN).expect("tunnel id pattern is a valid regex"));

/// One entry of the JSON tunnel listing
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelEntry {
    pub id: String,
    pub name: String,
}

/// Whether `s` looks like a tunnel identifier (UUID)
pub fn is_tunnel_id(s: &str) -> bool {
    TUNNEL_ID.is_match(s)
}

/// Parse the JSON listing, `None` when the output is not a JSON array of tunnels
pub fn parse_tunnel_list_json(output: &str) -> Option<Vec<TunnelEntry>> {
    serde_json::from_str(output.trim()).ok()
}

/// Find the identifier of `name` among structured entries
pub fn find_tunnel_id(entries: &[TunnelEntry], name: &str) -> Result<String> {
    let entry = entries
        .iter()
        .find(|entry| entry.name == name)
        .ok_or_else(|| RelayError::TunnelNotFound(name.to_string()))?;

    validated(&entry.id)
}

/// Extract the identifier of `name` from the text listing
///
/// The first line having `name` as one of its fields (after the first)
/// wins, and its first field must be a UUID.
pub fn parse_tunnel_list(output: &str, name: &str) -> Result<String> {
    let id = output
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.iter().skip(1).any(|field| *field == name))
        .and_then(|fields| fields.first().map(|id| (*id).to_string()))
        .ok_or_else(|| RelayError::TunnelNotFound(name.to_string()))?;

    validated(&id)
}

fn validated(id: &str) -> Result<String> {
    if is_tunnel_id(id) {
        Ok(id.to_string())
    } else {
        Err(RelayError::InvalidTunnelId(id.to_string()))
    }
}
