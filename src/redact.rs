//! Redaction wrapper for signing keys.
//!
//! [`Redacted`] formats as `<redacted>` through `Debug` and `Display`, so an
//! [`OpsConfig`](crate::config::OpsConfig) can be logged with `{:?}` without
//! leaking deployer keys.

use std::fmt::{self, Debug, Display};

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Redacted<T>(pub T);

impl<T> Redacted<T> {
    /// Borrow the wrapped secret. Call sites should be the signer
    /// constructors only.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl<T> Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl<T> Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    #[test]
    fn test_private_key_never_formatted() {
        let key = Redacted(B256::repeat_byte(0xac));
        assert_eq!(format!("{:?}", key), "<redacted>");
        assert_eq!(key.to_string(), "<redacted>");
        assert_eq!(*key.expose(), B256::repeat_byte(0xac));
    }

    #[test]
    fn test_redacted_inside_struct_debug() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Signer {
            key: Redacted<&'static str>,
        }
        let rendered = format!("{:?}", Signer { key: Redacted("0xdeadbeef") });
        assert!(!rendered.contains("deadbeef"));
    }
}
