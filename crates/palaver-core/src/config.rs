//! Client configuration.

use std::time::Duration;

/// Default service endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://web.palaver.im/ws";

/// Authentication handshake variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    /// Scannable visual code rendered from the server reference.
    #[default]
    VisualCode,
    /// Out-of-band short code delivered to the user's device.
    ShortCode,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the service.
    pub endpoint: String,

    /// Client version string advertised in the init message.
    pub version: String,

    /// Authentication handshake variant.
    pub auth_method: AuthMethod,

    /// Reconnect automatically after an unexpected transport closure.
    pub auto_reconnect: bool,

    /// Maximum reconnection attempts before giving up.
    pub max_reconnects: u32,

    /// Base reconnection delay; attempt `n` waits `delay * 1.5^(n-1)`.
    pub reconnect_delay: Duration,

    /// Visual-code expirations tolerated before the handshake is fatal.
    pub qr_max_retries: u32,

    /// Visual-code lifetime when the server does not advertise one.
    pub qr_timeout: Duration,

    /// Default deadline for a tagged request.
    pub request_timeout: Duration,

    /// Settle delay between `Authenticated` and `Ready`.
    pub ready_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            auth_method: AuthMethod::default(),
            auto_reconnect: true,
            max_reconnects: 5,
            reconnect_delay: Duration::from_millis(3000),
            qr_max_retries: 3,
            qr_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(60),
            ready_delay: Duration::from_secs(1),
        }
    }
}
