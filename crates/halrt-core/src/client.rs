//! Host clients attached to a device.

/// Identity of a client process as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClientInfo {
    /// Host-assigned client id, unique per device.
    pub client_id: u32,
    /// Process id of the client.
    pub process_id: i32,
    /// Whether the client runs with the plugin's native byte order.
    pub is_native_endian: bool,
    /// Bundle id of the client application, if known.
    pub bundle_id: String,
}

impl ClientInfo {
    /// Info with only a client id set.
    pub fn new(client_id: u32) -> Self {
        Self {
            client_id,
            is_native_endian: true,
            ..Self::default()
        }
    }
}

/// A client tracked by a device.
///
/// Created by [`ControlRequestHandler::on_add_client`]; handlers that need
/// per-client state keep it keyed by [`Client::id`].
///
/// [`ControlRequestHandler::on_add_client`]: crate::ControlRequestHandler::on_add_client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    info: ClientInfo,
}

impl Client {
    /// Wrap client info.
    pub fn new(info: ClientInfo) -> Self {
        Self { info }
    }

    /// Host client id.
    pub fn id(&self) -> u32 {
        self.info.client_id
    }

    /// Client process id.
    pub fn process_id(&self) -> i32 {
        self.info.process_id
    }

    /// Client bundle id.
    pub fn bundle_id(&self) -> &str {
        &self.info.bundle_id
    }

    /// Full client info.
    pub fn info(&self) -> &ClientInfo {
        &self.info
    }
}
