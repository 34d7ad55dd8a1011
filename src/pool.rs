//! CRC32-driven diffusion of keyfile bytes into a fixed-size password pool.

use std::fs;
use std::path::PathBuf;

use crc32fast::Hasher;

use crate::assembly::{prepare_stream, KeyfileDescriptor};
use crate::callback::{PinCallback, WarningCallback};
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::token::{OperationMode, TokenKeyDescriptor};

/// Minimum number of bytes a single keyfile must contribute.
///
/// Adopted from spec.md's own worked example (§8 S2) rather than
/// classic VeraCrypt's per-keyfile minimum of 20 bytes — see
/// DESIGN.md for the reasoning. Overridable via
/// [`apply_list_to_password_with_bounds`].
pub const MIN_PROCESSED_LENGTH: usize = 320;

/// Hard cap on bytes consumed from a single keyfile.
pub const MAX_PROCESSED_LENGTH: usize = 1_000_000;

/// Password-pool size used when the starting password is short enough
/// to fit the legacy pool.
pub const MAX_LEGACY_SIZE: usize = 64;

/// Password-pool size used otherwise.
pub const MAX_SIZE: usize = 64;

/// Folds every byte pulled from `stream` into `pool` using the running
/// CRC32 diffusion rule, resetting the CRC32 state at the start of the
/// call (i.e. per keyfile). Returns the number of bytes consumed.
///
/// `InsufficientData` is raised if fewer than `min_processed_length`
/// bytes were available; consumption stops at exactly
/// `max_processed_length` bytes even if the stream has more to give.
pub fn apply(
    pool: &mut [u8],
    stream: &mut dyn crate::stream::KeyfileStream,
    min_processed_length: usize,
    max_processed_length: usize,
) -> Result<usize> {
    let pool_size = pool.len();
    let mut hasher = Hasher::new();
    let mut pos = 0usize;
    let mut total_length = 0usize;
    let mut buf = [0u8; 4096];

    'outer: loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        for &b in &buf[..n] {
            hasher.update(&[b]);
            let crc = hasher.clone().finalize();
            pool[pos] = pool[pos].wrapping_add((crc >> 24) as u8);
            pool[(pos + 1) % pool_size] = pool[(pos + 1) % pool_size].wrapping_add((crc >> 16) as u8);
            pool[(pos + 2) % pool_size] = pool[(pos + 2) % pool_size].wrapping_add((crc >> 8) as u8);
            pool[(pos + 3) % pool_size] = pool[(pos + 3) % pool_size].wrapping_add(crc as u8);
            pos = (pos + 4) % pool_size;
            total_length += 1;
            if total_length >= max_processed_length {
                break 'outer;
            }
        }
    }

    if total_length < min_processed_length {
        return Err(Error::InsufficientData);
    }
    Ok(total_length)
}

/// Expands directories in `keyfiles` into their immediate, non-hidden
/// files (POSIX: names not starting with `.`). An empty directory is
/// an error.
fn expand_keyfile_list(keyfiles: &[KeyfileDescriptor]) -> Result<Vec<KeyfileDescriptor>> {
    let mut expanded = Vec::with_capacity(keyfiles.len());
    for descriptor in keyfiles {
        match descriptor {
            KeyfileDescriptor::Path(path) if path.is_dir() => {
                let mut entries: Vec<PathBuf> = fs::read_dir(path)?
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|p| {
                        !p.file_name()
                            .and_then(|n| n.to_str())
                            .map(|n| n.starts_with('.'))
                            .unwrap_or(false)
                    })
                    .collect();
                if entries.is_empty() {
                    return Err(Error::KeyfilePathEmpty);
                }
                entries.sort();
                expanded.extend(entries.into_iter().map(KeyfileDescriptor::Path));
            }
            other => expanded.push(other.clone()),
        }
    }
    Ok(expanded)
}

/// `ApplyListToPassword(list, password, tokenDesc)` using the default
/// [`MIN_PROCESSED_LENGTH`]/[`MAX_PROCESSED_LENGTH`] bounds and pool
/// sizing.
#[allow(clippy::too_many_arguments)]
pub fn apply_list_to_password(
    keyfiles: &[KeyfileDescriptor],
    password: &[u8],
    token_desc: Option<&TokenKeyDescriptor>,
    mode: OperationMode,
    session: &mut SessionManager,
    pin_cb: &mut dyn PinCallback,
    warn_cb: &mut dyn WarningCallback,
) -> Result<Vec<u8>> {
    apply_list_to_password_with_bounds(
        keyfiles,
        password,
        token_desc,
        mode,
        session,
        pin_cb,
        warn_cb,
        MIN_PROCESSED_LENGTH,
        MAX_PROCESSED_LENGTH,
    )
}

/// As [`apply_list_to_password`], with explicit per-keyfile length bounds.
#[allow(clippy::too_many_arguments)]
pub fn apply_list_to_password_with_bounds(
    keyfiles: &[KeyfileDescriptor],
    password: &[u8],
    token_desc: Option<&TokenKeyDescriptor>,
    mode: OperationMode,
    session: &mut SessionManager,
    pin_cb: &mut dyn PinCallback,
    warn_cb: &mut dyn WarningCallback,
    min_processed_length: usize,
    max_processed_length: usize,
) -> Result<Vec<u8>> {
    let expanded = expand_keyfile_list(keyfiles)?;
    if expanded.is_empty() {
        return Ok(password.to_vec());
    }

    let pool_size = if password.len() <= MAX_LEGACY_SIZE {
        MAX_LEGACY_SIZE
    } else {
        MAX_SIZE
    };
    let mut pool = vec![0u8; pool_size];
    pool[..password.len()].copy_from_slice(password);

    for descriptor in &expanded {
        let mut stream = prepare_stream(descriptor, token_desc, mode, session, pin_cb, warn_cb)?;
        apply(
            &mut pool,
            stream.as_mut(),
            min_processed_length,
            max_processed_length,
        )?;
    }

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::MemoryStream;

    // S1: pool init, exercised through the real entry point rather than
    // a bare local `Vec` so the test actually covers
    // apply_list_to_password_with_bounds's pool-size selection and
    // password-copy step (pool.rs:151-157). A single zero-byte keyfile
    // is layered on top (per S2's CRC32(0x00) == 0xD202EF8D) since the
    // public API has no way to observe pool state before any keyfile
    // is applied.
    #[test]
    fn pool_after_password_copy() {
        let path = std::env::temp_dir().join(format!(
            "tokenkeyfile-test-{}-{}.bin",
            std::process::id(),
            line!()
        ));
        std::fs::write(&path, [0u8]).unwrap();

        let mut session = SessionManager::new();
        let mut pin_cb = crate::callback::NoPinCallback;
        let mut warn_cb = crate::callback::LogWarningCallback;
        let keyfiles = [KeyfileDescriptor::Path(path.clone())];
        let result = apply_list_to_password_with_bounds(
            &keyfiles,
            b"x",
            None,
            OperationMode::Mount,
            &mut session,
            &mut pin_cb,
            &mut warn_cb,
            0,
            MAX_PROCESSED_LENGTH,
        )
        .unwrap();
        std::fs::remove_file(&path).ok();

        // Pool size 64 (MAX_LEGACY_SIZE, since the password is 1 byte),
        // "x" (0x78) copied into pool[0], then the keyfile's single
        // zero byte folded on top starting at pos 0.
        assert_eq!(result.len(), 64);
        assert_eq!(result[0], 0x78u8.wrapping_add(0xD2));
        assert_eq!(result[1], 0x02);
        assert_eq!(result[2], 0xEF);
        assert_eq!(result[3], 0x8D);
        assert!(result[4..].iter().all(|&b| b == 0));
    }

    // S2: single-byte keyfile, pool size 64.
    #[test]
    fn single_zero_byte_keyfile_below_minimum_is_insufficient() {
        let mut pool = vec![0u8; 64];
        let mut stream = MemoryStream::new(vec![0u8]);
        let err = apply(&mut pool, &mut stream, MIN_PROCESSED_LENGTH, MAX_PROCESSED_LENGTH)
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientData));
        assert_eq!(pool[0], 0xD2);
        assert_eq!(pool[1], 0x02);
        assert_eq!(pool[2], 0xEF);
        assert_eq!(pool[3], 0x8D);
        assert!(pool[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn single_zero_byte_keyfile_at_minimum_succeeds() {
        let mut pool = vec![0u8; 64];
        let mut stream = MemoryStream::new(vec![0u8; MIN_PROCESSED_LENGTH]);
        assert!(apply(&mut pool, &mut stream, MIN_PROCESSED_LENGTH, MAX_PROCESSED_LENGTH).is_ok());
    }

    // S3: pool wrap, pool size 8, three zero bytes.
    #[test]
    fn three_byte_keyfile_wraps_pool_of_eight() {
        let mut pool = vec![0u8; 8];
        let mut stream = MemoryStream::new(vec![0u8, 0u8, 0u8]);
        // Below MinProcessedLength so this raises InsufficientData, but
        // the pool mutation happens before that check runs.
        let _ = apply(&mut pool, &mut stream, 0, MAX_PROCESSED_LENGTH);
        assert_eq!(&pool[0..4], &[0xD1, 0x43, 0xC8, 0x9F]);
        assert_eq!(&pool[4..8], &[0x41, 0xD9, 0x12, 0xFF]);
    }

    // Cap property: identical pools for MaxProcessedLength and
    // MaxProcessedLength + k bytes of the same content.
    #[test]
    fn consumption_stops_at_max_processed_length() {
        let max = 64usize;
        let mut pool_a = vec![0u8; 64];
        let mut stream_a = MemoryStream::new(vec![0xAB; max]);
        apply(&mut pool_a, &mut stream_a, 0, max).unwrap();

        let mut pool_b = vec![0u8; 64];
        let mut stream_b = MemoryStream::new(vec![0xAB; max + 37]);
        apply(&mut pool_b, &mut stream_b, 0, max).unwrap();

        assert_eq!(pool_a, pool_b);
    }

    #[test]
    fn empty_keyfile_list_returns_password_unchanged() {
        let mut session = SessionManager::new();
        let mut pin_cb = crate::callback::NoPinCallback;
        let mut warn_cb = crate::callback::LogWarningCallback;
        let result = apply_list_to_password(
            &[],
            b"hello",
            None,
            OperationMode::Mount,
            &mut session,
            &mut pin_cb,
            &mut warn_cb,
        )
        .unwrap();
        assert_eq!(result, b"hello");
    }
}
