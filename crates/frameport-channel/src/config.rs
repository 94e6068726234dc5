use std::fmt;

/// Configuration for a new channel.
#[derive(Clone, Default)]
pub struct ChannelConfig {
    /// Origin of the remote context, if known up front. Without it the
    /// channel is unbound and authenticates first contact by token.
    pub target_origin: Option<String>,
    /// Token to use while unbound instead of a freshly generated one, for
    /// when the token is shared with the remote side out of band.
    /// Redacted in debug output.
    pub handshake_token: Option<String>,
}

impl ChannelConfig {
    /// Config for a remote context whose origin is known.
    pub fn with_target_origin(origin: impl Into<String>) -> Self {
        Self {
            target_origin: Some(origin.into()),
            handshake_token: None,
        }
    }

    /// Config for an unbound channel using a preset token.
    pub fn with_handshake_token(token: impl Into<String>) -> Self {
        Self {
            target_origin: None,
            handshake_token: Some(token.into()),
        }
    }
}

impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("ChannelConfig");
        dbg.field("target_origin", &self.target_origin);
        if let Some(token) = &self.handshake_token {
            dbg.field(
                "handshake_token",
                &format_args!("<redacted:{} bytes>", token.len()),
            );
        } else {
            dbg.field("handshake_token", &Option::<String>::None);
        }
        dbg.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbound_without_preset_token() {
        let config = ChannelConfig::default();
        assert!(config.target_origin.is_none());
        assert!(config.handshake_token.is_none());
    }

    #[test]
    fn debug_redacts_token() {
        let config = ChannelConfig::with_handshake_token("abcdef");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("<redacted:6 bytes>"));
        assert!(!rendered.contains("abcdef"));
    }
}
