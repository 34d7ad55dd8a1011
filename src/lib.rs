//! PKCS#11-assisted keyfile pool mixing.
//!
//! Mixes user-supplied keyfiles — some backed by asymmetric keys on a
//! hardware security token — into a fixed-size password pool consumed
//! by a volume's key-derivation function. See `SPEC_FULL.md` in the
//! repository root for the full design.
//!
//! This crate does not bundle a logging backend; it emits `log` facade
//! calls at the same decision points a vendor token library's own
//! client would log (session open/close, login attempts, enumeration
//! skips). The embedding application chooses the subscriber.

pub mod assembly;
pub mod bluekey;
pub mod callback;
pub mod error;
pub mod pool;
pub mod session;
pub mod stream;
pub mod token;

pub use assembly::{prepare_stream, KeyfileDescriptor};
pub use bluekey::{create_bluekey, reveal_redkey};
pub use callback::{LogWarningCallback, NoPinCallback, PinCallback, WarningCallback};
pub use error::{ckr_name, Error, Result};
pub use pool::{
    apply_list_to_password, apply_list_to_password_with_bounds, MAX_LEGACY_SIZE,
    MAX_PROCESSED_LENGTH, MAX_SIZE, MIN_PROCESSED_LENGTH,
};
pub use session::SessionManager;
pub use stream::{FileStream, KeyfileStream, MemoryStream, PipelineStream};
pub use token::{OperationMode, SlotId, TokenInfo, TokenKey, TokenKeyDescriptor, TokenKeyfile};
