//! Crate-wide error type and PKCS#11 status code diagnostics.

use pkcs11::types::CK_RV;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("PKCS#11 library is not initialized")]
    LibraryNotInitialized,

    #[error("keyfile path is empty")]
    KeyfilePathEmpty,

    #[error("keyfile not found: {0}")]
    KeyfileNotFound(String),

    #[error("invalid keyfile path: {0}")]
    InvalidKeyfilePath(String),

    #[error("token key descriptor matched more than one object: {0}")]
    MultipleKeysMatched(String),

    #[error("no recognized token found among the candidate slots")]
    TokenNotRecognized,

    #[error("keyfile list did not supply the minimum amount of keying data required")]
    InsufficientData,

    #[error("parameter incorrect: {0}")]
    ParameterIncorrect(String),

    #[error("operation aborted by user")]
    UserAbort,

    #[error("PKCS#11 error {}", describe_rv(.0))]
    Pkcs11Status(CK_RV),

    #[error(transparent)]
    Pkcs11(#[from] pkcs11::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Renders a `CK_RV` for human display: the symbolic name plus its hex
/// value when recognized (e.g. `CKR_PIN_INCORRECT (0xa0)`), or a bare
/// `0x{hex}` for anything outside the table, per spec.md §7's "codes
/// not in the table are rendered as `0x{hex}`".
fn describe_rv(rv: CK_RV) -> String {
    match ckr_name(rv) {
        Some(name) => format!("{name} (0x{rv:x})"),
        None => format!("0x{rv:x}"),
    }
}

/// Returns the classic symbolic name for a `CK_RV` status code, e.g.
/// `CKR_PIN_INCORRECT` for `0xA0`, or `None` for a code outside the
/// base specification (vendor-defined or simply not in this table).
///
/// Recovered from `Pkcs11Exception::operator string()` in VeraCrypt's
/// `SecurityToken.cpp`.
pub fn ckr_name(rv: CK_RV) -> Option<&'static str> {
    Some(match rv {
        0x0000_0000 => "CKR_OK",
        0x0000_0001 => "CKR_CANCEL",
        0x0000_0002 => "CKR_HOST_MEMORY",
        0x0000_0003 => "CKR_SLOT_ID_INVALID",
        0x0000_0005 => "CKR_GENERAL_ERROR",
        0x0000_0006 => "CKR_FUNCTION_FAILED",
        0x0000_0007 => "CKR_ARGUMENTS_BAD",
        0x0000_0008 => "CKR_NO_EVENT",
        0x0000_0009 => "CKR_NEED_TO_CREATE_THREADS",
        0x0000_000A => "CKR_CANT_LOCK",
        0x0000_0010 => "CKR_ATTRIBUTE_READ_ONLY",
        0x0000_0011 => "CKR_ATTRIBUTE_SENSITIVE",
        0x0000_0012 => "CKR_ATTRIBUTE_TYPE_INVALID",
        0x0000_0013 => "CKR_ATTRIBUTE_VALUE_INVALID",
        0x0000_001B => "CKR_ACTION_PROHIBITED",
        0x0000_0020 => "CKR_DATA_INVALID",
        0x0000_0021 => "CKR_DATA_LEN_RANGE",
        0x0000_0030 => "CKR_DEVICE_ERROR",
        0x0000_0031 => "CKR_DEVICE_MEMORY",
        0x0000_0032 => "CKR_DEVICE_REMOVED",
        0x0000_0040 => "CKR_ENCRYPTED_DATA_INVALID",
        0x0000_0041 => "CKR_ENCRYPTED_DATA_LEN_RANGE",
        0x0000_0050 => "CKR_FUNCTION_CANCELED",
        0x0000_0051 => "CKR_FUNCTION_NOT_PARALLEL",
        0x0000_0054 => "CKR_FUNCTION_NOT_SUPPORTED",
        0x0000_0060 => "CKR_KEY_HANDLE_INVALID",
        0x0000_0062 => "CKR_KEY_SIZE_RANGE",
        0x0000_0063 => "CKR_KEY_TYPE_INCONSISTENT",
        0x0000_0064 => "CKR_KEY_NOT_NEEDED",
        0x0000_0065 => "CKR_KEY_CHANGED",
        0x0000_0066 => "CKR_KEY_NEEDED",
        0x0000_0067 => "CKR_KEY_INDIGESTIBLE",
        0x0000_0068 => "CKR_KEY_FUNCTION_NOT_PERMITTED",
        0x0000_0069 => "CKR_KEY_NOT_WRAPPABLE",
        0x0000_006A => "CKR_KEY_UNEXTRACTABLE",
        0x0000_0070 => "CKR_MECHANISM_INVALID",
        0x0000_0071 => "CKR_MECHANISM_PARAM_INVALID",
        0x0000_0082 => "CKR_OBJECT_HANDLE_INVALID",
        0x0000_0090 => "CKR_OPERATION_ACTIVE",
        0x0000_0091 => "CKR_OPERATION_NOT_INITIALIZED",
        0x0000_00A0 => "CKR_PIN_INCORRECT",
        0x0000_00A1 => "CKR_PIN_INVALID",
        0x0000_00A2 => "CKR_PIN_LEN_RANGE",
        0x0000_00A3 => "CKR_PIN_EXPIRED",
        0x0000_00A4 => "CKR_PIN_LOCKED",
        0x0000_00B0 => "CKR_SESSION_CLOSED",
        0x0000_00B1 => "CKR_SESSION_COUNT",
        0x0000_00B3 => "CKR_SESSION_HANDLE_INVALID",
        0x0000_00B4 => "CKR_SESSION_PARALLEL_NOT_SUPPORTED",
        0x0000_00B5 => "CKR_SESSION_READ_ONLY",
        0x0000_00B6 => "CKR_SESSION_EXISTS",
        0x0000_00B7 => "CKR_SESSION_READ_ONLY_EXISTS",
        0x0000_00B8 => "CKR_SESSION_READ_WRITE_SO_EXISTS",
        0x0000_00C0 => "CKR_SIGNATURE_INVALID",
        0x0000_00C1 => "CKR_SIGNATURE_LEN_RANGE",
        0x0000_00D0 => "CKR_TEMPLATE_INCOMPLETE",
        0x0000_00D1 => "CKR_TEMPLATE_INCONSISTENT",
        0x0000_00E0 => "CKR_TOKEN_NOT_PRESENT",
        0x0000_00E1 => "CKR_TOKEN_NOT_RECOGNIZED",
        0x0000_00E2 => "CKR_TOKEN_WRITE_PROTECTED",
        0x0000_00F0 => "CKR_UNWRAPPING_KEY_HANDLE_INVALID",
        0x0000_00F1 => "CKR_UNWRAPPING_KEY_SIZE_RANGE",
        0x0000_00F2 => "CKR_UNWRAPPING_KEY_TYPE_INCONSISTENT",
        0x0000_0100 => "CKR_USER_ALREADY_LOGGED_IN",
        0x0000_0101 => "CKR_USER_NOT_LOGGED_IN",
        0x0000_0102 => "CKR_USER_PIN_NOT_INITIALIZED",
        0x0000_0103 => "CKR_USER_TYPE_INVALID",
        0x0000_0104 => "CKR_USER_ANOTHER_ALREADY_LOGGED_IN",
        0x0000_0105 => "CKR_USER_TOO_MANY_TYPES",
        0x0000_0110 => "CKR_WRAPPED_KEY_INVALID",
        0x0000_0112 => "CKR_WRAPPED_KEY_LEN_RANGE",
        0x0000_0113 => "CKR_WRAPPING_KEY_HANDLE_INVALID",
        0x0000_0114 => "CKR_WRAPPING_KEY_SIZE_RANGE",
        0x0000_0115 => "CKR_WRAPPING_KEY_TYPE_INCONSISTENT",
        0x0000_0120 => "CKR_RANDOM_SEED_NOT_SUPPORTED",
        0x0000_0121 => "CKR_RANDOM_NO_RNG",
        0x0000_0130 => "CKR_DOMAIN_PARAMS_INVALID",
        0x0000_0150 => "CKR_BUFFER_TOO_SMALL",
        0x0000_0160 => "CKR_SAVED_STATE_INVALID",
        0x0000_0170 => "CKR_INFORMATION_SENSITIVE",
        0x0000_0180 => "CKR_STATE_UNSAVEABLE",
        0x0000_0190 => "CKR_CRYPTOKI_NOT_INITIALIZED",
        0x0000_0191 => "CKR_CRYPTOKI_ALREADY_INITIALIZED",
        0x0000_01A0 => "CKR_MUTEX_BAD",
        0x0000_01A1 => "CKR_MUTEX_NOT_LOCKED",
        0x0000_0200 => "CKR_FUNCTION_REJECTED",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_codes_map_to_symbolic_names() {
        assert_eq!(ckr_name(0xA0), Some("CKR_PIN_INCORRECT"));
        assert_eq!(ckr_name(0x100), Some("CKR_USER_ALREADY_LOGGED_IN"));
        assert_eq!(ckr_name(0xE1), Some("CKR_TOKEN_NOT_RECOGNIZED"));
    }

    #[test]
    fn unrecognized_codes_have_no_symbolic_name() {
        assert_eq!(ckr_name(0xDEAD_BEEF), None);
    }

    #[test]
    fn display_falls_back_to_bare_hex_for_unrecognized_codes() {
        assert_eq!(describe_rv(0xDEAD_BEEF), "0xdeadbeef");
    }

    #[test]
    fn display_shows_symbolic_name_for_recognized_codes() {
        assert_eq!(describe_rv(0xA0), "CKR_PIN_INCORRECT (0xa0)");
    }
}
