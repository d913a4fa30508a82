//! Ethereum signatures over the messages the token network contract checks.

use crate::packed::{types::Hash, Keccak256Writer, Writer};

mod k256;
pub use self::k256::{Error, Signer};


/// `keccak256("\x19Ethereum Signed Message:\n32" ‖ hash)`, what the
/// contract's `ecrecover` expects.
fn eth_signed_message_hash(hash: Hash) -> Hash {
    let mut writer = Keccak256Writer::default();
    writer.write(b"\x19Ethereum Signed Message:\n32");
    writer.write(&hash.0);
    writer.finalize()
}
