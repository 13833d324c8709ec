/// BookSpark link signing.
///
/// Digest emails carry one-click links (done / snooze / view / unsubscribe)
/// that act without a session. Each link holds a three-part payload signed
/// with HMAC-SHA256 and stamped with an expiry.
pub mod keys;
pub mod link_token;

pub use link_token::{ActionClaims, LinkSigner, TokenError};
