//! Data model shared by the session manager and stream assembly.

use pkcs11::types::{CK_OBJECT_HANDLE, CK_SLOT_ID};

/// Identifies a token slot. A thin alias over the PKCS#11 native type
/// rather than a crate-local newtype, since every call site that needs
/// one is talking directly to the binding anyway.
pub type SlotId = CK_SLOT_ID;

/// Immutable snapshot of `C_GetTokenInfo`, re-read on every enumeration
/// rather than cached across calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub slot_id: SlotId,
    pub login_required: bool,
    pub protected_auth_path: bool,
    pub write_protected: bool,
    /// `CK_TOKEN_INFO.label`, trimmed of its trailing space padding.
    /// A label of all spaces becomes an empty string.
    pub label: String,
}

/// A `CKO_DATA` object on a token, with `CKA_PRIVATE = true`.
#[derive(Debug, Clone)]
pub struct TokenKeyfile {
    pub slot_id: SlotId,
    pub object_handle: CK_OBJECT_HANDLE,
    pub id_utf8: String,
    pub token: TokenInfo,
}

/// A `CKO_PRIVATE_KEY` RSA object on a token.
#[derive(Debug, Clone)]
pub struct TokenKey {
    pub slot_id: SlotId,
    pub object_handle: CK_OBJECT_HANDLE,
    pub id_utf8: String,
    pub token: TokenInfo,
    /// `modulusBits / 8 - 11`, the PKCS#1 v1.5 overhead.
    pub max_decrypt_buffer_size: usize,
    /// `modulusBits / 8`.
    pub max_encrypt_buffer_size: usize,
}

impl TokenKey {
    pub fn from_modulus_bits(
        slot_id: SlotId,
        object_handle: CK_OBJECT_HANDLE,
        id_utf8: String,
        token: TokenInfo,
        modulus_bits: u64,
    ) -> Self {
        let modulus_bytes = (modulus_bits / 8) as usize;
        TokenKey {
            slot_id,
            object_handle,
            id_utf8,
            token,
            max_encrypt_buffer_size: modulus_bytes,
            max_decrypt_buffer_size: modulus_bytes.saturating_sub(11),
        }
    }
}

/// Which direction a stream-assembly/bluekey operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Decrypt-on-read: a token-encrypted segment is replaced by its plaintext.
    Mount,
    /// Encrypt-on-write: a plaintext segment is replaced by its ciphertext
    /// in the persisted file, while the in-memory stream keeps yielding
    /// the original plaintext.
    Create,
}

/// `"{slotId}:{id}"` — the first colon separates the slot from the
/// (possibly colon-containing) key label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKeyDescriptor {
    pub slot_id: SlotId,
    pub id: String,
}

impl std::str::FromStr for TokenKeyDescriptor {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slot_part, id) = s
            .split_once(':')
            .ok_or_else(|| crate::error::Error::InvalidKeyfilePath(s.to_string()))?;
        let slot_id: SlotId = slot_part
            .parse()
            .map_err(|_| crate::error::Error::InvalidKeyfilePath(s.to_string()))?;
        Ok(TokenKeyDescriptor {
            slot_id,
            id: id.to_string(),
        })
    }
}

impl std::fmt::Display for TokenKeyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.slot_id, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // S5: descriptor parsing.
    #[test]
    fn descriptor_splits_on_first_colon_only() {
        let d = TokenKeyDescriptor::from_str("5:Alice:Primary").unwrap();
        assert_eq!(d.slot_id, 5);
        assert_eq!(d.id, "Alice:Primary");
    }

    #[test]
    fn descriptor_without_colon_is_invalid() {
        assert!(TokenKeyDescriptor::from_str("no-colon").is_err());
    }

    #[test]
    fn max_buffer_sizes_follow_modulus_bits() {
        let token = TokenInfo {
            slot_id: 0,
            login_required: false,
            protected_auth_path: false,
            write_protected: false,
            label: String::new(),
        };
        let key = TokenKey::from_modulus_bits(0, 0, "k".to_string(), token, 2048);
        assert_eq!(key.max_encrypt_buffer_size, 256);
        assert_eq!(key.max_decrypt_buffer_size, 245);
    }
}
