//! One-shot whole-file flows: encrypting a keyfile's leading segment
//! onto a token ("bluekey") and reversing it back to plaintext
//! ("redkey"). Neither is part of pool mixing.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::assembly::{prepare_stream, KeyfileDescriptor};
use crate::callback::{PinCallback, WarningCallback};
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::stream::KeyfileStream;
use crate::token::{OperationMode, TokenKeyDescriptor};

/// Resolves the token key, RSA-encrypts the first
/// `key.maxDecryptBufferSize` bytes of `plaintext`, and writes
/// `ciphertext ‖ tail` to `output_path`.
pub fn create_bluekey(
    output_path: impl AsRef<Path>,
    token_desc: &TokenKeyDescriptor,
    plaintext: &[u8],
    session: &mut SessionManager,
    pin_cb: &mut dyn PinCallback,
    warn_cb: &mut dyn WarningCallback,
) -> Result<()> {
    let keys = session.get_available_keys(Some(token_desc.slot_id), &token_desc.id, pin_cb, warn_cb)?;
    let key = match keys.len() {
        0 => return Err(Error::KeyfileNotFound(token_desc.id.clone())),
        1 => keys.into_iter().next().unwrap(),
        _ => return Err(Error::MultipleKeysMatched(token_desc.id.clone())),
    };

    let input_buffer_size = key.max_decrypt_buffer_size;
    if plaintext.len() < input_buffer_size {
        return Err(Error::InsufficientData);
    }
    let (head, tail) = plaintext.split_at(input_buffer_size);
    let ciphertext = session.encrypt(&key, head, pin_cb, warn_cb)?;

    let mut out = File::create(output_path)?;
    out.write_all(&ciphertext)?;
    out.write_all(tail)?;
    Ok(())
}

/// Runs the MOUNT-mode stream assembly over `keyfile` with
/// `token_desc` and writes the resulting bytes verbatim to
/// `output_path`. A round-trip of `create_bluekey`'s output through
/// the same key reproduces the original plaintext.
pub fn reveal_redkey(
    output_path: impl AsRef<Path>,
    keyfile: &KeyfileDescriptor,
    token_desc: &TokenKeyDescriptor,
    session: &mut SessionManager,
    pin_cb: &mut dyn PinCallback,
    warn_cb: &mut dyn WarningCallback,
) -> Result<()> {
    let mut stream = prepare_stream(
        keyfile,
        Some(token_desc),
        OperationMode::Mount,
        session,
        pin_cb,
        warn_cb,
    )?;

    let mut out = File::create(output_path)?;
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
    }
    Ok(())
}
