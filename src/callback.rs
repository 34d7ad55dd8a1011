//! PIN and warning callbacks, injected into the session manager rather
//! than stashed behind a global function pointer.

use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Supplies a PIN on demand. `seed` is the token label, or `"#{slotId}"`
/// when the label is empty — the same value the login state machine
/// would otherwise show the user to disambiguate which token is being
/// prompted for.
///
/// Implementations may return `Err(Error::UserAbort)` to cooperatively
/// cancel the current login attempt; the caller treats this as a
/// control-flow signal, not a hard failure (it causes the current
/// slot's enumeration to be skipped silently).
pub trait PinCallback {
    fn get_pin(&mut self, seed: &str) -> Result<Zeroizing<String>>;
}

/// Receives non-fatal notices, e.g. an incorrect PIN before the login
/// loop prompts again.
pub trait WarningCallback {
    fn warn(&mut self, err: &Error);
}

/// A `PinCallback` that always aborts; useful where a caller has no
/// interactive surface but still needs to drive protected-auth-path
/// tokens (which never invoke the callback) or unattended test setups.
pub struct NoPinCallback;

impl PinCallback for NoPinCallback {
    fn get_pin(&mut self, _seed: &str) -> Result<Zeroizing<String>> {
        Err(Error::UserAbort)
    }
}

/// A `WarningCallback` that logs via the `log` facade and discards.
pub struct LogWarningCallback;

impl WarningCallback for LogWarningCallback {
    fn warn(&mut self, err: &Error) {
        log::warn!("{err}");
    }
}
