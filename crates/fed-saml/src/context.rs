//! The HTTP request a message arrived on.

/// Transport facts needed to validate an incoming message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// URL the message was received at, without query string.
    pub current_url: String,

    /// Whether the request arrived over TLS.
    pub https: bool,

    /// DER-encoded TLS client certificate, if one was presented.
    pub client_certificate: Option<Vec<u8>>,
}

impl RequestContext {
    /// Creates a context for a request received at `current_url`.
    ///
    /// TLS is assumed when the URL scheme is `https`.
    #[must_use]
    pub fn new(current_url: impl Into<String>) -> Self {
        let current_url = current_url.into();
        let https = current_url.starts_with("https://");
        Self {
            current_url,
            https,
            client_certificate: None,
        }
    }

    /// Overrides TLS detection.
    #[must_use]
    pub const fn with_https(mut self, https: bool) -> Self {
        self.https = https;
        self
    }

    /// Sets the client certificate presented during the TLS handshake.
    #[must_use]
    pub fn with_client_certificate(mut self, der: Vec<u8>) -> Self {
        self.client_certificate = Some(der);
        self
    }
}
