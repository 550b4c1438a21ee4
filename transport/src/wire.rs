//! Length-delimited binary framing shared by the client and the server
//! (§6 "Wire protocol"), adapted from `types::bincode::BinCodeSerAndDeser`
//! to blocking `Read`/`Write` streams instead of in-memory buffers.

use std::io::{Read, Write};

use bincode::config::{DefaultOptions, Options};
use serde::de::DeserializeOwned;
use serde::Serialize;
use types::bincode::MAGIC_BYTES;
use types::Version;

use crate::error::TransportError;

/// `major: u8` + `minor: u16` + `patch: u16`, fixint big-endian.
const VERSION_BYTES_SIZE: usize = 5;

fn wire_config() -> impl Options {
    DefaultOptions::new().with_fixint_encoding().with_big_endian()
}

pub fn write_message<T: Serialize>(stream: &mut impl Write, value: &T) -> Result<(), TransportError> {
    let version_bytes = types::VERSION.serialize_magic_bytes()?;
    let body = wire_config().serialize(value)?;
    let length = (body.len() as u64).to_be_bytes();

    stream.write_all(&MAGIC_BYTES)?;
    stream.write_all(&version_bytes)?;
    stream.write_all(&length)?;
    stream.write_all(&body)?;
    stream.flush()?;
    Ok(())
}

pub fn read_message<T: DeserializeOwned>(
    stream: &mut impl Read,
    max_message_size: usize,
) -> Result<T, TransportError> {
    let mut magic_buf = [0u8; 4];
    stream.read_exact(&mut magic_buf)?;
    if magic_buf != MAGIC_BYTES {
        return Err(TransportError::BadMagic);
    }

    let mut version_buf = [0u8; VERSION_BYTES_SIZE];
    stream.read_exact(&mut version_buf)?;
    let version = Version::deserialize_magic_bytes(&version_buf)?;
    if !version.is_compatible(&types::VERSION) {
        return Err(TransportError::IncompatibleVersion {
            expected: types::VERSION.major,
            found: version.major,
        });
    }

    let mut length_buf = [0u8; 8];
    stream.read_exact(&mut length_buf)?;
    let length = u64::from_be_bytes(length_buf) as usize;
    if length > max_message_size {
        return Err(TransportError::MessageTooLarge {
            max: max_message_size,
            actual: length,
        });
    }

    let mut body = vec![0u8; length];
    stream.read_exact(&mut body)?;
    let value = wire_config().deserialize(&body)?;
    Ok(value)
}
