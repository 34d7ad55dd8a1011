//! PKCS#11 session manager: library lifecycle, slot enumeration,
//! session caching, the login state machine, and typed operations over
//! token objects and private keys.

use std::collections::HashMap;
use std::path::Path;

use pkcs11::types::{
    CKA_CLASS, CKA_LABEL, CKA_MODULUS_BITS, CKA_PRIVATE, CKA_TOKEN, CKA_VALUE,
    CKF_LOGIN_REQUIRED, CKF_PROTECTED_AUTHENTICATION_PATH, CKF_RW_SESSION, CKF_SERIAL_SESSION,
    CKF_TOKEN_PRESENT, CKF_WRITE_PROTECTED, CKM_RSA_PKCS, CKO_DATA, CKO_PRIVATE_KEY,
    CKR_DATA_LEN_RANGE, CKR_DEVICE_MEMORY, CKR_PIN_INCORRECT, CKR_SESSION_READ_ONLY,
    CKR_TOKEN_WRITE_PROTECTED, CKR_USER_ALREADY_LOGGED_IN, CKS_RO_USER_FUNCTIONS,
    CKS_RW_USER_FUNCTIONS, CKU_USER, CK_ATTRIBUTE, CK_BBOOL, CK_MECHANISM, CK_OBJECT_CLASS,
    CK_OBJECT_HANDLE, CK_RV, CK_SESSION_HANDLE, CK_TRUE, CK_ULONG, CK_UNAVAILABLE_INFORMATION,
};
use pkcs11::Ctx;

use crate::callback::{PinCallback, WarningCallback};
use crate::error::{Error, Result};
use crate::token::{SlotId, TokenInfo, TokenKey, TokenKeyfile};

struct SessionEntry {
    handle: CK_SESSION_HANDLE,
    user_logged_in: bool,
}

/// Owns the loaded PKCS#11 library and its open sessions.
///
/// Deliberately `!Sync`: the cache is a plain `HashMap`, not guarded by
/// a mutex. Wrapping it in one would advertise a concurrency guarantee
/// this subsystem does not provide — callers that need shared access
/// own that synchronization themselves.
pub struct SessionManager {
    ctx: Option<Ctx>,
    sessions: HashMap<SlotId, SessionEntry>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn pkcs11_rv(e: &pkcs11::errors::Error) -> Option<CK_RV> {
    match e {
        pkcs11::errors::Error::Pkcs11(rv) => Some(*rv),
        _ => None,
    }
}

fn is_token_not_recognized(err: &Error) -> bool {
    matches!(err, Error::TokenNotRecognized)
}

/// The login state machine's possible reactions to a `C_Login` attempt,
/// per spec.md §9's "model them as explicit result variants" design
/// note, rather than re-deriving the same branch inline at every call
/// site. Pure and independent of any PKCS#11 call, so it is unit-tested
/// directly without a token or session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginOutcome {
    /// Login succeeded, or the token reports the user is already in.
    LoggedIn,
    /// Wrong PIN on a non-protected-auth-path token: warn and loop again.
    RetryPin,
    /// Anything else: propagate.
    Fatal,
}

/// Classifies a `C_Login` result. `rv` is the PKCS#11 status code of a
/// failed login (`None` for a non-PKCS#11 error, which is always
/// `Fatal`); `protected_auth_path` disables the PIN-retry branch, since
/// a protected-auth-path token never receives a software PIN to get
/// wrong.
fn classify_login_rv(rv: Option<CK_RV>, protected_auth_path: bool) -> LoginOutcome {
    match rv {
        Some(CKR_USER_ALREADY_LOGGED_IN) => LoginOutcome::LoggedIn,
        Some(CKR_PIN_INCORRECT) if !protected_auth_path => LoginOutcome::RetryPin,
        _ => LoginOutcome::Fatal,
    }
}

/// Decodes a `CKA_PRIVATE` attribute's raw bytes. Per spec.md §4.1 and
/// `SecurityToken.cpp`'s `privateAttrib.size() == sizeof(CK_BBOOL)`
/// guard, only a buffer of exactly `sizeof(CK_BBOOL)` bytes can turn up
/// non-private; any other length (including empty/unavailable) is
/// treated as private, matching the original's fall-through behavior.
fn decode_private_flag(raw: &[u8]) -> bool {
    match raw {
        [b] if *b == CK_TRUE as u8 => true,
        [_] => false,
        _ => true,
    }
}

/// Decodes a `CKA_LABEL` attribute's raw bytes into a trimmed label,
/// or `None` if it is empty (an empty or all-NUL label never matches
/// an enumeration's id filter and is skipped by the caller).
fn decode_label(raw: &[u8]) -> Option<String> {
    let label = String::from_utf8_lossy(raw)
        .trim_end_matches('\0')
        .to_string();
    if label.is_empty() {
        None
    } else {
        Some(label)
    }
}

/// Decodes a `CKA_MODULUS_BITS` attribute's raw, native-endian bytes
/// (as returned by the token for a `CK_ULONG`-typed attribute). Per
/// `SecurityToken.cpp`'s `privateAttrib.size() == sizeof(CK_ULONG)`
/// guard, a buffer of any other length leaves the value unset rather
/// than fabricating a modulus size out of a malformed response.
fn decode_modulus_bits(raw: &[u8]) -> Option<u64> {
    if raw.len() != std::mem::size_of::<CK_ULONG>() {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes[..raw.len()].copy_from_slice(raw);
    Some(u64::from_ne_bytes(bytes))
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            ctx: None,
            sessions: HashMap::new(),
        }
    }

    fn ctx(&self) -> Result<&Ctx> {
        self.ctx.as_ref().ok_or(Error::LibraryNotInitialized)
    }

    /// Loads `library_path` and calls `C_Initialize`. A library already
    /// loaded is fully closed first (`CloseLibrary`), matching the
    /// original's re-initialization semantics.
    pub fn init_library(&mut self, library_path: impl AsRef<Path>) -> Result<()> {
        if self.ctx.is_some() {
            self.close_library()?;
        }
        let mut ctx = Ctx::new(library_path.as_ref())?;
        ctx.initialize(None)?;
        self.ctx = Some(ctx);
        Ok(())
    }

    /// Closes every cached session, calls `C_Finalize`, and unloads the
    /// library. Session closure is best-effort; `C_Finalize` failure is
    /// propagated.
    pub fn close_library(&mut self) -> Result<()> {
        self.close_all_sessions();
        if let Some(mut ctx) = self.ctx.take() {
            ctx.finalize()?;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.ctx.is_some()
    }

    /// `C_GetSlotList(tokenPresent=true, ...)` followed by a per-slot
    /// `C_GetSlotInfo`, filtered to slots actually reporting a token
    /// present. Unrecognized tokens are not filtered at this layer.
    pub fn get_token_slots(&self) -> Result<Vec<SlotId>> {
        let ctx = self.ctx()?;
        let slots = ctx.get_slot_list(true)?;
        let mut present = Vec::with_capacity(slots.len());
        for slot in slots {
            let info = ctx.get_slot_info(slot)?;
            if info.flags & CKF_TOKEN_PRESENT != 0 {
                present.push(slot);
            }
        }
        Ok(present)
    }

    pub fn get_token_info(&self, slot_id: SlotId) -> Result<TokenInfo> {
        let ctx = self.ctx()?;
        let info = ctx.get_token_info(slot_id)?;
        let label = String::from_utf8_lossy(&info.label)
            .trim_end()
            .to_string();
        Ok(TokenInfo {
            slot_id,
            login_required: info.flags & CKF_LOGIN_REQUIRED != 0,
            protected_auth_path: info.flags & CKF_PROTECTED_AUTHENTICATION_PATH != 0,
            write_protected: info.flags & CKF_WRITE_PROTECTED != 0,
            label,
        })
    }

    /// Idempotent: returns the cached handle if one already exists.
    pub fn open_session(&mut self, slot_id: SlotId) -> Result<CK_SESSION_HANDLE> {
        if let Some(entry) = self.sessions.get(&slot_id) {
            return Ok(entry.handle);
        }
        let token_info = self.get_token_info(slot_id)?;
        let mut flags = CKF_SERIAL_SESSION;
        if !token_info.write_protected {
            flags |= CKF_RW_SESSION;
        }
        let handle = self.ctx()?.open_session(slot_id, flags, None, None)?;
        log::debug!(
            "slot {slot_id}: opened session (rw = {})",
            flags & CKF_RW_SESSION != 0
        );
        self.sessions.insert(
            slot_id,
            SessionEntry {
                handle,
                user_logged_in: false,
            },
        );
        Ok(handle)
    }

    /// Errors if no session is cached for `slot_id`.
    pub fn close_session(&mut self, slot_id: SlotId) -> Result<()> {
        let entry = self.sessions.remove(&slot_id).ok_or_else(|| {
            Error::ParameterIncorrect(format!("no open session for slot {slot_id}"))
        })?;
        self.ctx()?.close_session(entry.handle)?;
        log::debug!("slot {slot_id}: closed session");
        Ok(())
    }

    /// No-throw, best-effort over every cached session.
    pub fn close_all_sessions(&mut self) {
        let entries: Vec<SessionEntry> = self.sessions.drain().map(|(_, e)| e).collect();
        if let Some(ctx) = &self.ctx {
            for entry in entries {
                if let Err(e) = ctx.close_session(entry.handle) {
                    log::debug!("close_session during CloseAllSessions failed: {e}");
                }
            }
        }
    }

    /// The login state machine described in spec §4.1: re-validates the
    /// cached session, recovers from a stale handle, and loops on PIN
    /// prompts until success, `USER_ALREADY_LOGGED_IN`, or an
    /// unrecoverable error.
    pub fn login_user_if_required(
        &mut self,
        slot_id: SlotId,
        pin_cb: &mut dyn PinCallback,
        warn_cb: &mut dyn WarningCallback,
    ) -> Result<()> {
        let handle = match self.sessions.get(&slot_id) {
            Some(entry) => entry.handle,
            None => self.open_session(slot_id)?,
        };

        let revalidated = match self.ctx()?.get_session_info(handle) {
            Ok(info) => {
                matches!(info.state, CKS_RO_USER_FUNCTIONS | CKS_RW_USER_FUNCTIONS)
            }
            Err(_) => {
                self.sessions.remove(&slot_id);
                self.open_session(slot_id)?;
                false
            }
        };
        if let Some(entry) = self.sessions.get_mut(&slot_id) {
            entry.user_logged_in = revalidated;
        }

        loop {
            let token_info = self.get_token_info(slot_id)?;
            let logged_in = self
                .sessions
                .get(&slot_id)
                .map(|e| e.user_logged_in)
                .unwrap_or(false);
            if logged_in || !token_info.login_required {
                break;
            }

            let handle = self.sessions.get(&slot_id).unwrap().handle;
            let login_result = if token_info.protected_auth_path {
                self.ctx()?.login(handle, CKU_USER, None)
            } else {
                let seed = if token_info.label.is_empty() {
                    format!("#{slot_id}")
                } else {
                    token_info.label.clone()
                };
                let pin = pin_cb.get_pin(&seed)?;
                self.ctx()?.login(handle, CKU_USER, Some(&pin))
            };

            match login_result {
                Ok(()) => {
                    log::debug!("slot {slot_id}: login succeeded");
                    if let Some(entry) = self.sessions.get_mut(&slot_id) {
                        entry.user_logged_in = true;
                    }
                    break;
                }
                Err(e) => {
                    let rv = pkcs11_rv(&e);
                    match classify_login_rv(rv, token_info.protected_auth_path) {
                        LoginOutcome::LoggedIn => {
                            log::debug!("slot {slot_id}: already logged in");
                            if let Some(entry) = self.sessions.get_mut(&slot_id) {
                                entry.user_logged_in = true;
                            }
                            break;
                        }
                        LoginOutcome::RetryPin => {
                            warn_cb.warn(&Error::Pkcs11Status(CKR_PIN_INCORRECT));
                            log::debug!("slot {slot_id}: incorrect PIN, prompting again");
                            continue;
                        }
                        LoginOutcome::Fatal => return Err(e.into()),
                    }
                }
            }
        }
        Ok(())
    }

    /// `C_FindObjectsInit` with a single `CKA_CLASS` attribute, then
    /// `C_FindObjects` in batches of one until exhausted.
    /// `C_FindObjectsFinal` runs on every exit path.
    fn find_objects_of_class(
        &self,
        session: CK_SESSION_HANDLE,
        class: CK_OBJECT_CLASS,
    ) -> Result<Vec<CK_OBJECT_HANDLE>> {
        let ctx = self.ctx()?;
        let mut class = class;
        let template = vec![CK_ATTRIBUTE::new(CKA_CLASS).with_ck_ulong(&mut class)];
        ctx.find_objects_init(session, &template)?;

        let mut objects = Vec::new();
        let outcome = (|| -> Result<()> {
            loop {
                let batch = ctx.find_objects(session, 1)?;
                if batch.is_empty() {
                    return Ok(());
                }
                objects.extend(batch);
            }
        })();

        ctx.find_objects_final(session)?;
        outcome?;
        Ok(objects)
    }

    /// Two-phase attribute read: learn the length with a null-valued
    /// template, allocate, then fill. A zero-length (or unavailable)
    /// attribute yields an empty buffer without a second call.
    fn get_attribute(
        &self,
        session: CK_SESSION_HANDLE,
        object: CK_OBJECT_HANDLE,
        attr_type: pkcs11::types::CK_ATTRIBUTE_TYPE,
    ) -> Result<Vec<u8>> {
        let ctx = self.ctx()?;
        let mut probe = vec![CK_ATTRIBUTE::new(attr_type)];
        ctx.get_attribute_value(session, object, &mut probe)?;
        let len = probe[0].ulValueLen;
        if len == 0 || len == CK_UNAVAILABLE_INFORMATION {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; len as usize];
        let mut fill = vec![CK_ATTRIBUTE::new(attr_type).with_bytes(buf.as_mut_slice())];
        ctx.get_attribute_value(session, object, &mut fill)?;
        Ok(buf)
    }

    fn candidate_slots(&self, slot_filter: Option<SlotId>) -> Result<Vec<SlotId>> {
        match slot_filter {
            Some(slot) => Ok(vec![slot]),
            None => self.get_token_slots(),
        }
    }

    /// Iterates candidate slots logging in and enumerating `CKO_DATA`
    /// objects on each, filtering to private objects whose label
    /// matches `id_filter` (an empty filter matches every labeled
    /// object). Stops scanning a slot once a non-empty filter matches.
    pub fn get_available_keyfiles(
        &mut self,
        slot_filter: Option<SlotId>,
        id_filter: &str,
        pin_cb: &mut dyn PinCallback,
        warn_cb: &mut dyn WarningCallback,
    ) -> Result<Vec<TokenKeyfile>> {
        let slots = self.candidate_slots(slot_filter)?;
        let mut results = Vec::new();
        let mut any_unrecognized = false;

        for slot_id in slots {
            if let Err(e) = self.login_user_if_required(slot_id, pin_cb, warn_cb) {
                match e {
                    Error::UserAbort => {
                        log::debug!("slot {slot_id}: user aborted PIN entry, skipping");
                        continue;
                    }
                    e if is_token_not_recognized(&e) => {
                        log::debug!("slot {slot_id}: token not recognized, skipping");
                        any_unrecognized = true;
                        continue;
                    }
                    e => return Err(e),
                }
            }
            let token_info = match self.get_token_info(slot_id) {
                Ok(info) => info,
                Err(e) if is_token_not_recognized(&e) => {
                    any_unrecognized = true;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let session = self.sessions.get(&slot_id).unwrap().handle;
            let objects = self.find_objects_of_class(session, CKO_DATA)?;
            for object in objects {
                if !self.object_is_private(session, object)? {
                    continue;
                }
                let Some(label) = self.object_label(session, object)? else {
                    continue;
                };
                if !id_filter.is_empty() && label != id_filter {
                    continue;
                }
                let matched_by_id = !id_filter.is_empty();
                results.push(TokenKeyfile {
                    slot_id,
                    object_handle: object,
                    id_utf8: label,
                    token: token_info.clone(),
                });
                if matched_by_id {
                    break;
                }
            }
        }

        if results.is_empty() && any_unrecognized {
            return Err(Error::TokenNotRecognized);
        }
        Ok(results)
    }

    /// Same traversal as `get_available_keyfiles`, over `CKO_PRIVATE_KEY`
    /// objects, additionally reading `CKA_MODULUS_BITS` to populate the
    /// RSA buffer-size bounds.
    pub fn get_available_keys(
        &mut self,
        slot_filter: Option<SlotId>,
        id_filter: &str,
        pin_cb: &mut dyn PinCallback,
        warn_cb: &mut dyn WarningCallback,
    ) -> Result<Vec<TokenKey>> {
        let slots = self.candidate_slots(slot_filter)?;
        let mut results = Vec::new();
        let mut any_unrecognized = false;

        for slot_id in slots {
            if let Err(e) = self.login_user_if_required(slot_id, pin_cb, warn_cb) {
                match e {
                    Error::UserAbort => {
                        log::debug!("slot {slot_id}: user aborted PIN entry, skipping");
                        continue;
                    }
                    e if is_token_not_recognized(&e) => {
                        log::debug!("slot {slot_id}: token not recognized, skipping");
                        any_unrecognized = true;
                        continue;
                    }
                    e => return Err(e),
                }
            }
            let token_info = match self.get_token_info(slot_id) {
                Ok(info) => info,
                Err(e) if is_token_not_recognized(&e) => {
                    any_unrecognized = true;
                    continue;
                }
                Err(e) => return Err(e),
            };
            let session = self.sessions.get(&slot_id).unwrap().handle;
            let objects = self.find_objects_of_class(session, CKO_PRIVATE_KEY)?;
            for object in objects {
                if !self.object_is_private(session, object)? {
                    continue;
                }
                let Some(label) = self.object_label(session, object)? else {
                    continue;
                };
                if !id_filter.is_empty() && label != id_filter {
                    continue;
                }
                // A missing/malformed CKA_MODULUS_BITS leaves the buffer
                // sizes unset (zero) rather than fabricating a modulus,
                // matching SecurityToken.cpp's size-guarded read.
                let modulus_bits = self.object_modulus_bits(session, object)?.unwrap_or(0);
                let matched_by_id = !id_filter.is_empty();
                results.push(TokenKey::from_modulus_bits(
                    slot_id,
                    object,
                    label,
                    token_info.clone(),
                    modulus_bits,
                ));
                if matched_by_id {
                    break;
                }
            }
        }

        if results.is_empty() && any_unrecognized {
            return Err(Error::TokenNotRecognized);
        }
        Ok(results)
    }

    fn object_is_private(&self, session: CK_SESSION_HANDLE, object: CK_OBJECT_HANDLE) -> Result<bool> {
        let raw = self.get_attribute(session, object, CKA_PRIVATE)?;
        Ok(decode_private_flag(&raw))
    }

    fn object_label(&self, session: CK_SESSION_HANDLE, object: CK_OBJECT_HANDLE) -> Result<Option<String>> {
        let raw = self.get_attribute(session, object, CKA_LABEL)?;
        Ok(decode_label(&raw))
    }

    fn object_modulus_bits(&self, session: CK_SESSION_HANDLE, object: CK_OBJECT_HANDLE) -> Result<Option<u64>> {
        let raw = self.get_attribute(session, object, CKA_MODULUS_BITS)?;
        Ok(decode_modulus_bits(&raw))
    }

    /// Reads the `CKA_VALUE` of a `CKO_DATA` object resolved from a
    /// `token://` descriptor.
    pub fn get_keyfile_data(&self, keyfile: &TokenKeyfile) -> Result<Vec<u8>> {
        let session = self
            .sessions
            .get(&keyfile.slot_id)
            .ok_or(Error::LibraryNotInitialized)?
            .handle;
        self.get_attribute(session, keyfile.object_handle, CKA_VALUE)
    }

    /// `C_DecryptInit(CKM_RSA_PKCS)` then `C_Decrypt`. Logs in first.
    pub fn decrypt(
        &mut self,
        key: &TokenKey,
        input: &[u8],
        pin_cb: &mut dyn PinCallback,
        warn_cb: &mut dyn WarningCallback,
    ) -> Result<Vec<u8>> {
        self.login_user_if_required(key.slot_id, pin_cb, warn_cb)?;
        let session = self.sessions.get(&key.slot_id).unwrap().handle;
        let mechanism = CK_MECHANISM {
            mechanism: CKM_RSA_PKCS,
            pParameter: std::ptr::null_mut(),
            ulParameterLen: 0,
        };
        let ctx = self.ctx()?;
        ctx.decrypt_init(session, &mechanism, key.object_handle)?;
        Ok(ctx.decrypt(session, input)?)
    }

    /// `C_EncryptInit(CKM_RSA_PKCS)` then `C_Encrypt`. Logs in first.
    pub fn encrypt(
        &mut self,
        key: &TokenKey,
        input: &[u8],
        pin_cb: &mut dyn PinCallback,
        warn_cb: &mut dyn WarningCallback,
    ) -> Result<Vec<u8>> {
        self.login_user_if_required(key.slot_id, pin_cb, warn_cb)?;
        let session = self.sessions.get(&key.slot_id).unwrap().handle;
        let mechanism = CK_MECHANISM {
            mechanism: CKM_RSA_PKCS,
            pParameter: std::ptr::null_mut(),
            ulParameterLen: 0,
        };
        let ctx = self.ctx()?;
        ctx.encrypt_init(session, &mechanism, key.object_handle)?;
        Ok(ctx.encrypt(session, input)?)
    }

    /// Builds `{CKA_CLASS=DATA, CKA_TOKEN=true, CKA_PRIVATE=true,
    /// CKA_LABEL=name, CKA_VALUE=bytes}` and calls `C_CreateObject`,
    /// remapping `DATA_LEN_RANGE -> DEVICE_MEMORY` and
    /// `SESSION_READ_ONLY -> TOKEN_WRITE_PROTECTED`. Reads the stored
    /// value back and destroys the object if it was truncated.
    pub fn create_keyfile_object(
        &mut self,
        slot_id: SlotId,
        name: &str,
        bytes: &[u8],
        pin_cb: &mut dyn PinCallback,
        warn_cb: &mut dyn WarningCallback,
    ) -> Result<CK_OBJECT_HANDLE> {
        self.login_user_if_required(slot_id, pin_cb, warn_cb)?;
        let session = self.sessions.get(&slot_id).unwrap().handle;

        let mut class = CKO_DATA;
        let mut yes: CK_BBOOL = CK_TRUE;
        let mut name_bytes = name.as_bytes().to_vec();
        let mut value_bytes = bytes.to_vec();
        let template = vec![
            CK_ATTRIBUTE::new(CKA_CLASS).with_ck_ulong(&mut class),
            CK_ATTRIBUTE::new(CKA_TOKEN).with_bool(&mut yes),
            CK_ATTRIBUTE::new(CKA_PRIVATE).with_bool(&mut yes),
            CK_ATTRIBUTE::new(CKA_LABEL).with_bytes(name_bytes.as_mut_slice()),
            CK_ATTRIBUTE::new(CKA_VALUE).with_bytes(value_bytes.as_mut_slice()),
        ];

        let object = match self.ctx()?.create_object(session, &template) {
            Ok(handle) => handle,
            Err(e) => {
                return Err(match pkcs11_rv(&e) {
                    Some(CKR_DATA_LEN_RANGE) => Error::Pkcs11Status(CKR_DEVICE_MEMORY),
                    Some(CKR_SESSION_READ_ONLY) => Error::Pkcs11Status(CKR_TOKEN_WRITE_PROTECTED),
                    _ => e.into(),
                })
            }
        };

        let stored = self.get_attribute(session, object, CKA_VALUE)?;
        if stored.len() != bytes.len() {
            if let Err(e) = self.ctx()?.destroy_object(session, object) {
                log::warn!("destroy_object on truncated keyfile write failed: {e}");
            }
            return Err(Error::Pkcs11Status(CKR_DEVICE_MEMORY));
        }
        Ok(object)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.close_all_sessions();
        if let Some(mut ctx) = self.ctx.take() {
            if let Err(e) = ctx.finalize() {
                log::debug!("C_Finalize during SessionManager drop failed: {e}");
            }
        }
    }
}

/// Exercises the pure decision logic extracted from the login state
/// machine and object enumeration — the parts of this module spec.md
/// §9 calls out as worth modeling explicitly — without needing a real
/// token or a mocked PKCS#11 vtable.
#[cfg(test)]
mod tests {
    use super::*;
    use pkcs11::types::CK_FALSE;

    #[test]
    fn already_logged_in_is_treated_as_success() {
        assert_eq!(
            classify_login_rv(Some(CKR_USER_ALREADY_LOGGED_IN), false),
            LoginOutcome::LoggedIn
        );
    }

    #[test]
    fn incorrect_pin_retries_without_protected_auth_path() {
        assert_eq!(
            classify_login_rv(Some(CKR_PIN_INCORRECT), false),
            LoginOutcome::RetryPin
        );
    }

    #[test]
    fn incorrect_pin_is_fatal_with_protected_auth_path() {
        // A protected-auth-path token never receives a software PIN, so
        // there is nothing to retry with; the error must propagate.
        assert_eq!(
            classify_login_rv(Some(CKR_PIN_INCORRECT), true),
            LoginOutcome::Fatal
        );
    }

    #[test]
    fn other_status_codes_and_non_pkcs11_errors_are_fatal() {
        assert_eq!(
            classify_login_rv(Some(CKR_TOKEN_WRITE_PROTECTED), false),
            LoginOutcome::Fatal
        );
        assert_eq!(classify_login_rv(None, false), LoginOutcome::Fatal);
    }

    #[test]
    fn private_flag_false_is_respected() {
        assert!(!decode_private_flag(&[CK_FALSE as u8]));
    }

    #[test]
    fn private_flag_true_is_respected() {
        assert!(decode_private_flag(&[CK_TRUE as u8]));
    }

    #[test]
    fn missing_private_attribute_defaults_to_private() {
        assert!(decode_private_flag(&[]));
    }

    #[test]
    fn wrong_sized_private_attribute_falls_through_to_private() {
        // SecurityToken.cpp only trusts a buffer of exactly
        // sizeof(CK_BBOOL); anything else (here, two bytes whose first
        // byte is CK_FALSE) must not be read as a false flag.
        assert!(decode_private_flag(&[CK_FALSE as u8, CK_FALSE as u8]));
    }

    #[test]
    fn label_is_trimmed_of_nul_padding() {
        assert_eq!(decode_label(b"my key\0\0\0"), Some("my key".to_string()));
    }

    #[test]
    fn empty_label_does_not_match_anything() {
        assert_eq!(decode_label(b""), None);
        assert_eq!(decode_label(b"\0\0\0"), None);
    }

    #[test]
    fn modulus_bits_decodes_native_endian_ulong() {
        let value: CK_ULONG = 2048;
        let raw = value.to_ne_bytes();
        assert_eq!(decode_modulus_bits(&raw), Some(2048));
    }

    #[test]
    fn modulus_bits_is_unset_for_a_buffer_of_the_wrong_size() {
        // SecurityToken.cpp only reads CKA_MODULUS_BITS when the buffer
        // is exactly sizeof(CK_ULONG); anything else (here, empty) must
        // not be decoded into a fabricated modulus size.
        assert_eq!(decode_modulus_bits(&[]), None);
    }
}
