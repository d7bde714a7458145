//! WebSocket subprotocol names.

/// Subprotocol spoken by this adapter server.
pub const ADAPTER_SERVER_PROTOCOL: &str = "fs.webfuse.adapter-server";

/// Subprotocol spoken by the remote provider client.
pub const PROVIDER_CLIENT_PROTOCOL: &str = "fs.webfuse.provider-client";

/// Pick the subprotocol to answer with from one `Sec-WebSocket-Protocol`
/// header value (a comma-separated list of offers).
pub(crate) fn select_subprotocol(offered: &str) -> Option<&'static str> {
    offered
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == ADAPTER_SERVER_PROTOCOL)
        .then_some(ADAPTER_SERVER_PROTOCOL)
}
