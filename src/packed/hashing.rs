use serde::Serialize;
use sha3::{Digest, Keccak256};

use super::{to_writer, types::Hash, Error, Writer};

/// Hashes whatever the packed serializer writes into it, without buffering
/// the encoding.
#[derive(Default)]
pub struct Keccak256Writer(Keccak256);

impl Writer for Keccak256Writer {
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }
}

impl Keccak256Writer {
    pub fn finalize(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}

/// Keccak-256 over the packed encoding of `value`.
pub fn to_hash<T>(value: &T) -> Result<Hash, Error>
where
    T: Serialize + ?Sized,
{
    let mut writer = Keccak256Writer::default();
    to_writer(value, &mut writer)?;
    Ok(writer.finalize())
}

pub fn keccak256(bytes: &[u8]) -> Hash {
    Hash(Keccak256::digest(bytes).into())
}
