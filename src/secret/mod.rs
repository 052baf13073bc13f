//! Secret Slot - owned, wipe-on-release storage for a mnemonic or passphrase.
//!
//! A slot holds at most one [`SecretMaterial`]. Replacing or clearing it drops the
//! previous buffer, and dropping always zeroes the bytes before the allocator gets
//! them back. Text handed to [`SecretSlot::set`] is wiped in the caller's buffer
//! right after the copy, so there is never a second live plaintext copy.

use std::fmt;
use zeroize::Zeroize;

/// Owned plaintext of one secret. Zeroed on drop.
pub struct SecretMaterial {
    bytes: Vec<u8>,
}

impl SecretMaterial {
    /// Copy `plain` into a fresh buffer and wipe the source.
    fn take(plain: &mut String) -> Self {
        let bytes = plain.as_bytes().to_vec();
        plain.zeroize();
        Self { bytes }
    }

    fn expose(&self) -> &str {
        // Only ever built from a `String`, so this is valid UTF-8.
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Drop for SecretMaterial {
    #[inline(never)]
    fn drop(&mut self) {
        self.bytes.as_mut_slice().zeroize();
        #[cfg(test)]
        probe::record(&self.bytes);
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretMaterial(<{} bytes redacted>)", self.bytes.len())
    }
}

/// Slot owning at most one secret.
#[derive(Default)]
pub struct SecretSlot {
    value: Option<SecretMaterial>,
}

impl SecretSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wipe whatever is held, then take ownership of `plain` (wiping the caller's copy).
    pub fn set(&mut self, plain: &mut String) {
        self.clear();
        self.value = Some(SecretMaterial::take(plain));
    }

    /// Wipe and release.
    pub fn clear(&mut self) {
        // Drop runs the wipe.
        self.value = None;
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Plaintext access, only for key derivation inside the crate.
    pub(crate) fn expose(&self) -> Option<&str> {
        self.value.as_ref().map(SecretMaterial::expose)
    }
}

impl fmt::Debug for SecretSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretSlot").field("set", &self.is_set()).finish()
    }
}
