//! Identity normalization for storage keys.
//!
//! Identities are percent-encoded and every `%` is then rewritten to `$`,
//! so keys never contain `/`, `\`, `#`, `?` or a literal percent sign.
//! Because `$` itself is encoded first (to `$24`), distinct identities never
//! share a key.

/// Escape character substituted for `%`.
const KEY_ESCAPE: &str = "$";

/// Normalize a raw sender identity into a storage-safe key.
pub fn normalize_identity(identity: &str) -> String {
    urlencoding::encode(identity).replace('%', KEY_ESCAPE)
}
