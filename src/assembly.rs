//! Turns a keyfile descriptor into a lazy byte stream, splicing in the
//! token-decrypted (or token-encrypted) leading segment when a token
//! key accompanies the keyfile.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::callback::{PinCallback, WarningCallback};
use crate::error::{Error, Result};
use crate::pool::MIN_PROCESSED_LENGTH;
use crate::session::SessionManager;
use crate::stream::{FileStream, KeyfileStream, MemoryStream, PipelineStream};
use crate::token::{OperationMode, SlotId, TokenKeyDescriptor};

/// One contribution to a keyfile list: a plain path, or a `token://`
/// URL naming a `CKO_DATA` object whose value is used directly.
#[derive(Debug, Clone)]
pub enum KeyfileDescriptor {
    Path(PathBuf),
    Token { slot_id: SlotId, id: String },
}

const TOKEN_URL_PREFIX: &str = "token://slot/";
const TOKEN_URL_FILE_MARKER: &str = "/file/";

impl FromStr for KeyfileDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix(TOKEN_URL_PREFIX) {
            let (slot_part, id) = rest
                .split_once(TOKEN_URL_FILE_MARKER)
                .ok_or_else(|| Error::InvalidKeyfilePath(s.to_string()))?;
            let slot_id: SlotId = slot_part
                .parse()
                .map_err(|_| Error::InvalidKeyfilePath(s.to_string()))?;
            return Ok(KeyfileDescriptor::Token {
                slot_id,
                id: id.to_string(),
            });
        }
        Ok(KeyfileDescriptor::Path(PathBuf::from(s)))
    }
}

impl std::fmt::Display for KeyfileDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyfileDescriptor::Path(p) => write!(f, "{}", p.display()),
            KeyfileDescriptor::Token { slot_id, id } => {
                write!(f, "{TOKEN_URL_PREFIX}{slot_id}{TOKEN_URL_FILE_MARKER}{id}")
            }
        }
    }
}

/// `PrepareStream`: builds the byte source for one keyfile descriptor.
#[allow(clippy::too_many_arguments)]
pub fn prepare_stream(
    descriptor: &KeyfileDescriptor,
    token_desc: Option<&TokenKeyDescriptor>,
    mode: OperationMode,
    session: &mut SessionManager,
    pin_cb: &mut dyn PinCallback,
    warn_cb: &mut dyn WarningCallback,
) -> Result<Box<dyn KeyfileStream>> {
    match descriptor {
        KeyfileDescriptor::Token { slot_id, id } => {
            let keyfiles =
                session.get_available_keyfiles(Some(*slot_id), id, pin_cb, warn_cb)?;
            let keyfile = match keyfiles.len() {
                0 => return Err(Error::KeyfileNotFound(id.clone())),
                1 => &keyfiles[0],
                _ => return Err(Error::MultipleKeysMatched(id.clone())),
            };
            let data = session.get_keyfile_data(keyfile)?;
            if data.len() < MIN_PROCESSED_LENGTH {
                return Err(Error::InsufficientData);
            }
            Ok(Box::new(MemoryStream::new(data)))
        }
        KeyfileDescriptor::Path(path) => {
            if path.is_dir() {
                return Err(Error::ParameterIncorrect(format!(
                    "{} is a directory; expand the keyfile list before calling Apply",
                    path.display()
                )));
            }
            match token_desc {
                None => {
                    let mut pipeline = PipelineStream::new();
                    pipeline.add_stream(Box::new(FileStream::open(path)?));
                    Ok(Box::new(pipeline))
                }
                Some(token_desc) => prepare_token_backed_stream(path, token_desc, mode, session, pin_cb, warn_cb),
            }
        }
    }
}

/// The file-plus-token branch of `PrepareStream`: the leading
/// `key.maxEncryptBufferSize` bytes of the file are ciphertext (MOUNT)
/// or become ciphertext written to a side file (CREATE); in both
/// cases the returned stream yields the original plaintext so a
/// keyfile produces the same pool whichever mode touched it.
fn prepare_token_backed_stream(
    path: &Path,
    token_desc: &TokenKeyDescriptor,
    mode: OperationMode,
    session: &mut SessionManager,
    pin_cb: &mut dyn PinCallback,
    warn_cb: &mut dyn WarningCallback,
) -> Result<Box<dyn KeyfileStream>> {
    let keys =
        session.get_available_keys(Some(token_desc.slot_id), &token_desc.id, pin_cb, warn_cb)?;
    let key = match keys.len() {
        0 => return Err(Error::KeyfileNotFound(token_desc.id.clone())),
        1 => keys.into_iter().next().unwrap(),
        _ => return Err(Error::MultipleKeysMatched(token_desc.id.clone())),
    };

    let (input_buffer_size, output_buffer_size) = match mode {
        OperationMode::Mount => (key.max_encrypt_buffer_size, key.max_decrypt_buffer_size),
        OperationMode::Create => (key.max_decrypt_buffer_size, key.max_encrypt_buffer_size),
    };

    let mut file = File::open(path)?;

    // Read chunks until the staging buffer reaches exactly
    // input_buffer_size, remembering any overshoot from the final
    // chunk as the remainder handed off verbatim after the token
    // round-trip (spec.md §9(a): appendBytesCount, not +1).
    let mut staging = Vec::with_capacity(input_buffer_size);
    let mut remainder = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if staging.len() >= input_buffer_size {
            break;
        }
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        let needed = input_buffer_size - staging.len();
        if n > needed {
            staging.extend_from_slice(&chunk[..needed]);
            remainder.extend_from_slice(&chunk[needed..n]);
        } else {
            staging.extend_from_slice(&chunk[..n]);
        }
    }

    let mut pipeline = PipelineStream::new();
    match mode {
        OperationMode::Mount => {
            let plaintext = session.decrypt(&key, &staging, pin_cb, warn_cb)?;
            // spec.md §9(b): honor the token's own returned length rather
            // than re-padding to maxDecryptBufferSize.
            debug_assert!(plaintext.len() <= output_buffer_size);
            pipeline.add_stream(Box::new(MemoryStream::new(plaintext)));
            pipeline.add_stream(Box::new(MemoryStream::new(remainder)));
            pipeline.add_stream(Box::new(FileStream::from_reader(file)));
        }
        OperationMode::Create => {
            let ciphertext = session.encrypt(&key, &staging, pin_cb, warn_cb)?;
            // The side file is written in full now, so the returned
            // stream cannot continue reading from `file` (it is
            // already exhausted past the remainder) — it carries the
            // tail in memory instead, keeping the bytes it yields
            // identical to what MOUNT mode would read live.
            let mut tail = Vec::new();
            file.read_to_end(&mut tail)?;
            write_bluekey_prefix(path, &ciphertext, &remainder, &tail)?;
            pipeline.add_stream(Box::new(MemoryStream::new(staging)));
            pipeline.add_stream(Box::new(MemoryStream::new(remainder)));
            pipeline.add_stream(Box::new(MemoryStream::new(tail)));
        }
    }
    Ok(Box::new(pipeline))
}

/// CREATE-mode side effect: persists `ciphertext ‖ remainder ‖
/// (rest of file)` to `path`, leaving the in-memory stream (built by
/// the caller) to keep yielding the original plaintext.
fn write_bluekey_prefix(path: &Path, ciphertext: &[u8], remainder: &[u8], tail: &[u8]) -> Result<()> {
    let mut out = OpenOptions::new().write(true).truncate(true).open(path)?;
    out.write_all(ciphertext)?;
    out.write_all(remainder)?;
    out.write_all(tail)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // S4: token URL parsing.
    #[test]
    fn token_url_parses_slot_and_id() {
        let d = KeyfileDescriptor::from_str("token://slot/3/file/KEY MAN key").unwrap();
        match d {
            KeyfileDescriptor::Token { slot_id, id } => {
                assert_eq!(slot_id, 3);
                assert_eq!(id, "KEY MAN key");
            }
            _ => panic!("expected a token descriptor"),
        }
    }

    #[test]
    fn token_url_with_non_decimal_slot_is_invalid() {
        assert!(KeyfileDescriptor::from_str("token://slot/abc/file/x").is_err());
    }

    #[test]
    fn plain_path_is_not_a_token_descriptor() {
        let d = KeyfileDescriptor::from_str("/home/user/keyfile.bin").unwrap();
        assert!(matches!(d, KeyfileDescriptor::Path(_)));
    }
}
