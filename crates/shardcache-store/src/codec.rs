//! Value envelopes persisted through the backend.
//!
//! Every stored value is wrapped with the shard and shard generation that
//! wrote it, encoded as CBOR. Readers compare the stamp with the shard's
//! current generation to hide records left over from an invalidated session.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Origin of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
    /// Writing shard. `None` for global records that no shard owns.
    pub shard: Option<u32>,
    pub generation: u64,
}

impl Stamp {
    pub const GLOBAL: Stamp = Stamp {
        shard: None,
        generation: 0,
    };

    pub fn shard(shard: u32, generation: u64) -> Self {
        Stamp {
            shard: Some(shard),
            generation,
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    s: Option<u32>,
    g: u64,
    v: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    s: Option<u32>,
    g: u64,
    v: T,
}

pub fn encode<T: Serialize>(stamp: Stamp, value: &T) -> Result<Vec<u8>> {
    let envelope = EnvelopeRef {
        s: stamp.shard,
        g: stamp.generation,
        v: value,
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&envelope, &mut buf)
        .map_err(|e| StoreError::Codec(format!("encode failed: {}", e)))?;
    Ok(buf)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<(Stamp, T)> {
    let envelope: Envelope<T> = ciborium::from_reader(bytes)
        .map_err(|e| StoreError::Codec(format!("decode failed: {}", e)))?;
    let stamp = Stamp {
        shard: envelope.s,
        generation: envelope.g,
    };
    Ok((stamp, envelope.v))
}

/// Decode only the stamp, skipping the value.
pub fn decode_stamp(bytes: &[u8]) -> Result<Stamp> {
    #[derive(Deserialize)]
    struct Header {
        s: Option<u32>,
        g: u64,
    }
    let header: Header = ciborium::from_reader(bytes)
        .map_err(|e| StoreError::Codec(format!("header decode failed: {}", e)))?;
    Ok(Stamp {
        shard: header.s,
        generation: header.g,
    })
}
