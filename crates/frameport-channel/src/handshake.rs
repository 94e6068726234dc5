//! First-contact authentication and origin binding.
//!
//! A channel created without a known target origin is unbound: it stamps
//! its handshake token on outbound requests and accepts an inbound message
//! only when the message carries that same token. The first accepted
//! message pins the sender's origin and the channel stays bound from then
//! on. A bound channel accepts messages from the sandboxed `"null"` origin
//! or from any origin that prefixes its target origin.

use std::fmt;

use frameport_transport::SANDBOXED_ORIGIN;
use rand::Rng;

/// Length of a generated handshake token.
pub const HANDSHAKE_TOKEN_LEN: usize = 22;

/// Smallest value that renders as 11 base-36 digits (36^10).
const TOKEN_PART_MIN: u64 = 3_656_158_440_062_976;
/// Largest exactly representable integer in an IEEE double (2^53 - 1).
const TOKEN_PART_MAX: u64 = 9_007_199_254_740_991;

/// Fresh 22-character token: two base-36 renderings of random integers in
/// `[36^10, 2^53 - 1)`.
pub fn new_handshake_token() -> String {
    let mut rng = rand::thread_rng();
    let mut token = String::with_capacity(HANDSHAKE_TOKEN_LEN);
    for _ in 0..2 {
        push_base36(&mut token, rng.gen_range(TOKEN_PART_MIN..TOKEN_PART_MAX));
    }
    token
}

fn push_base36(out: &mut String, mut n: u64) {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut buf = [0u8; 13];
    let mut pos = buf.len();
    loop {
        pos -= 1;
        buf[pos] = DIGITS[(n % 36) as usize];
        n /= 36;
        if n == 0 {
            break;
        }
    }
    out.extend(buf[pos..].iter().map(|&b| b as char));
}

/// Origin binding state of one channel.
#[derive(Clone)]
pub struct OriginBinding {
    target_origin: Option<String>,
    token: Option<String>,
}

impl OriginBinding {
    /// Binding for a channel whose remote origin may already be known.
    ///
    /// An unbound binding uses `preset_token` or generates a fresh one.
    pub fn new(target_origin: Option<String>, preset_token: Option<String>) -> Self {
        let target_origin = target_origin.filter(|origin| !origin.is_empty());
        let token = match target_origin {
            Some(_) => None,
            None => Some(preset_token.unwrap_or_else(new_handshake_token)),
        };
        Self {
            target_origin,
            token,
        }
    }

    pub fn target_origin(&self) -> Option<&str> {
        self.target_origin.as_deref()
    }

    pub fn is_bound(&self) -> bool {
        self.target_origin.is_some()
    }

    /// Token to stamp on outbound requests; `None` once bound.
    pub fn outbound_token(&self) -> Option<&str> {
        if self.is_bound() {
            None
        } else {
            self.token.as_deref()
        }
    }

    /// Decide whether a message from `origin` carrying `token` belongs to
    /// this binding, binding the origin on a first token match.
    pub fn accepts(&mut self, origin: &str, token: Option<&str>) -> bool {
        if let Some(target) = &self.target_origin {
            return origin_matches(target, origin);
        }

        let matched = matches!((token, self.token.as_deref()), (Some(theirs), Some(ours)) if theirs == ours);
        if matched && !origin.is_empty() {
            tracing::debug!(origin = %origin, "channel bound to origin on handshake token match");
            self.target_origin = Some(origin.to_string());
        }
        matched
    }
}

/// Whether a sender at `origin` may speak for `target`.
fn origin_matches(target: &str, origin: &str) -> bool {
    if origin.is_empty() {
        return false;
    }
    if origin.eq_ignore_ascii_case(SANDBOXED_ORIGIN) {
        return true;
    }
    target
        .to_ascii_lowercase()
        .starts_with(&origin.to_ascii_lowercase())
}

impl fmt::Debug for OriginBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("OriginBinding");
        dbg.field("target_origin", &self.target_origin);
        if let Some(token) = &self.token {
            dbg.field(
                "token",
                &format_args!("<redacted:{} bytes>", token.len()),
            );
        } else {
            dbg.field("token", &Option::<String>::None);
        }
        dbg.finish()
    }
}
