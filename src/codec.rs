//! Codec Module
//!
//! Converts application values to and from the opaque byte blobs the store
//! persists. The engine never interprets file contents; everything format
//! related lives behind the [`Codec`] trait.
//!
//! ## Contract
//! - `encode`/`decode` are the primary format
//! - `decode_compat` is consulted exactly once, after a primary decode
//!   failure, to read files written by an older format revision
//! - Implementations own their schema-evolution policy (removed fields are
//!   ignored, new fields take defaults); the engine only honors the
//!   one-fallback shape
//!
//! Codec instances are shared across threads by the store, so the trait
//! requires `Send + Sync` and all methods take `&self`. Keep implementations
//! reentrant; stateful codecs must synchronize internally.

use std::io::{Read, Write};

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FolioError, Result};

/// Value serializer injected into the store
pub trait Codec: Send + Sync {
    /// Encode `value` into `sink` using the primary format.
    ///
    /// Fails with [`FolioError::Encode`] on unsupported structure.
    fn encode<T: Serialize>(&self, value: &T, sink: &mut dyn Write) -> Result<()>;

    /// Decode a value from `source` using the primary format.
    ///
    /// Fails with [`FolioError::Decode`] on unreadable content.
    fn decode<T: DeserializeOwned>(&self, source: &mut dyn Read) -> Result<T>;

    /// One-shot fallback for content written by an older format revision.
    ///
    /// Called by the store at most once per read, only after [`decode`]
    /// failed. `None` means the codec has no compatibility mode.
    ///
    /// [`decode`]: Self::decode
    fn decode_compat<T: DeserializeOwned>(&self, source: &mut dyn Read) -> Option<Result<T>> {
        let _ = source;
        None
    }
}

/// Default codec: bincode with varint length encoding.
///
/// The compatibility fallback reads bincode's legacy fixint configuration,
/// covering files produced before the switch to `bincode::options()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T, sink: &mut dyn Write) -> Result<()> {
        bincode::options()
            .serialize_into(sink, value)
            .map_err(|e| FolioError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, source: &mut dyn Read) -> Result<T> {
        bincode::options()
            .deserialize_from(source)
            .map_err(|e| FolioError::Decode(e.to_string()))
    }

    fn decode_compat<T: DeserializeOwned>(&self, source: &mut dyn Read) -> Option<Result<T>> {
        Some(
            bincode::deserialize_from(source)
                .map_err(|e| FolioError::Decode(format!("compatibility mode: {e}"))),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Person {
        name: String,
        age: u32,
        phones: Vec<String>,
    }

    fn sample() -> Person {
        Person {
            name: "elizabeth".to_string(),
            age: 41,
            phones: vec!["+1 555 0100".to_string(), "+1 555 0101".to_string()],
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let codec = BincodeCodec;
        let mut buf = Vec::new();
        codec.encode(&sample(), &mut buf).unwrap();

        let decoded: Person = codec.decode(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let codec = BincodeCodec;
        let garbage = [0xffu8; 16];
        let result: Result<Person> = codec.decode(&mut garbage.as_slice());
        assert!(matches!(result, Err(FolioError::Decode(_))));
    }

    #[test]
    fn test_compat_reads_legacy_fixint_format() {
        let codec = BincodeCodec;
        // Bytes as an older release would have written them
        let legacy = bincode::serialize(&sample()).unwrap();

        let decoded: Person = codec
            .decode_compat(&mut legacy.as_slice())
            .expect("BincodeCodec has a compatibility mode")
            .unwrap();
        assert_eq!(decoded, sample());
    }

    #[test]
    fn test_primary_format_is_not_legacy_format() {
        let codec = BincodeCodec;
        let mut primary = Vec::new();
        codec.encode(&sample(), &mut primary).unwrap();
        let legacy = bincode::serialize(&sample()).unwrap();
        assert_ne!(primary, legacy);
    }
}
