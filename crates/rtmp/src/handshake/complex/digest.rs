//! HMAC-SHA256 digest handling for the complex handshake.
//!
//! A C1/S1 block is 1536 bytes: an 8 byte time/version header followed by
//! 1528 bytes split into two 764 byte halves, one carrying random padding and
//! the other carrying the digest. Which half carries which is the schema:
//! schema 0 puts the key first and the digest second, schema 1 the reverse.
//! The digest's exact offset within its half is itself derived from the
//! padding, per <https://blog.csdn.net/win_lin/article/details/13006803>.

use bytes::Bytes;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::ComplexHandshakeError;
use super::{RTMP_DIGEST_LENGTH, SchemaVersion};
use crate::handshake::TIME_VERSION_LENGTH;

type HmacSha256 = Hmac<Sha256>;

/// The length of a single schema chunk (key or digest half) within a C1/S1
/// block: `(1536 - 8) / 2`.
const CHUNK_LENGTH: usize = 764;

/// Computes and verifies the digest embedded in a C1/S1 block.
pub struct DigestProcessor<'a> {
    data: Bytes,
    key: &'a [u8],
}

impl<'a> DigestProcessor<'a> {
    /// Creates a new digest processor over `data` (a C1 block, or the
    /// randomly generated body of an S1 block before its digest is filled
    /// in) using `key` as the HMAC key.
    pub fn new(data: Bytes, key: &'a [u8]) -> Self {
        Self { data, key }
    }

    fn schema_offset(&self, schema: SchemaVersion) -> Result<usize, ComplexHandshakeError> {
        // Each schema's digest chunk starts right after the 8 byte time/version
        // header (schema 1) or after the key chunk (schema 0). The first 4
        // bytes of that chunk are a pointer, summed and reduced mod 728 (the
        // chunk length minus the 4 byte pointer and the 32 byte digest itself,
        // so the digest always fits inside the chunk) to get the digest's
        // offset within it.
        let base = match schema {
            SchemaVersion::Schema0 => TIME_VERSION_LENGTH + CHUNK_LENGTH,
            SchemaVersion::Schema1 => TIME_VERSION_LENGTH,
        };

        let pointer_bytes = self.data.get(base..base + 4).ok_or(ComplexHandshakeError::NotEnoughData)?;
        let sum: u32 = pointer_bytes.iter().map(|&b| b as u32).sum();
        let offset = base + 4 + (sum as usize % (CHUNK_LENGTH - 4 - RTMP_DIGEST_LENGTH));

        Ok(offset)
    }

    fn hmac(&self, key: &[u8], parts: &[&[u8]]) -> Result<[u8; RTMP_DIGEST_LENGTH], ComplexHandshakeError> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| ComplexHandshakeError::CannotGenerate)?;

        for part in parts {
            mac.update(part);
        }

        let result = mac.finalize().into_bytes();
        result.as_slice().try_into().map_err(|_| ComplexHandshakeError::DigestLengthNotCorrect)
    }

    /// Computes an HMAC-SHA256 digest over `message` (plus any trailing
    /// `extra` bytes) using this processor's key.
    pub fn make_digest(&self, message: &[u8], extra: &[u8]) -> Result<Bytes, ComplexHandshakeError> {
        let digest = self.hmac(self.key, &[message, extra])?;
        Ok(Bytes::copy_from_slice(&digest))
    }

    /// Reads and verifies the digest embedded in a client's C1 block,
    /// trying schema 0 then schema 1. Returns the digest bytes and whichever
    /// schema matched.
    pub fn read_digest(&self) -> Result<(Bytes, SchemaVersion), ComplexHandshakeError> {
        for schema in [SchemaVersion::Schema0, SchemaVersion::Schema1] {
            let offset = self.schema_offset(schema)?;

            let digest = self
                .data
                .get(offset..offset + RTMP_DIGEST_LENGTH)
                .ok_or(ComplexHandshakeError::NotEnoughData)?;

            let before = self.data.get(..offset).ok_or(ComplexHandshakeError::NotEnoughData)?;
            let after = self
                .data
                .get(offset + RTMP_DIGEST_LENGTH..)
                .ok_or(ComplexHandshakeError::NotEnoughData)?;

            let expected = self.hmac(self.key, &[before, after])?;

            if expected.as_slice() == digest {
                return Ok((Bytes::copy_from_slice(digest), schema));
            }
        }

        Err(ComplexHandshakeError::UnknownSchema)
    }

    /// Computes the digest for an S1 block whose body (`self.data`, already
    /// filled with random padding) uses the given `schema`, returning the
    /// digest positioned ready to splice into the block.
    pub fn generate_and_fill_digest(&self, schema: SchemaVersion) -> Result<GeneratedDigest, ComplexHandshakeError> {
        let offset = self.schema_offset(schema)?;

        let before = self.data.get(..offset).ok_or(ComplexHandshakeError::NotEnoughData)?;
        let after = self
            .data
            .get(offset + RTMP_DIGEST_LENGTH..)
            .ok_or(ComplexHandshakeError::NotEnoughData)?;

        let digest = self.hmac(self.key, &[before, after])?;

        Ok(GeneratedDigest {
            before: Bytes::copy_from_slice(before),
            digest,
            after: Bytes::copy_from_slice(after),
        })
    }
}

/// An S1 body with its digest spliced into the correct offset for its schema.
pub struct GeneratedDigest {
    before: Bytes,
    digest: [u8; RTMP_DIGEST_LENGTH],
    after: Bytes,
}

impl GeneratedDigest {
    /// Writes the full 1528 byte body (time/version header excluded) to `output`.
    pub fn write_to(&self, output: &mut Vec<u8>) -> Result<(), ComplexHandshakeError> {
        output.extend_from_slice(&self.before);
        output.extend_from_slice(&self.digest);
        output.extend_from_slice(&self.after);
        Ok(())
    }

    /// Returns the computed digest bytes, e.g. to remember what was embedded
    /// in S1 for later strict verification of C2.
    pub fn digest(&self) -> Bytes {
        Bytes::copy_from_slice(&self.digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::RTMP_HANDSHAKE_SIZE;

    fn sample_c1(schema: SchemaVersion, key: &[u8]) -> Bytes {
        let mut body = vec![0u8; RTMP_HANDSHAKE_SIZE];
        for (i, b) in body.iter_mut().enumerate().skip(TIME_VERSION_LENGTH) {
            *b = (i % 251) as u8;
        }

        let processor = DigestProcessor::new(Bytes::from(body), key);
        let generated = processor.generate_and_fill_digest(schema).unwrap();
        let mut out = Vec::new();
        generated.write_to(&mut out).unwrap();

        Bytes::from(out)
    }

    #[test]
    fn round_trips_schema0() {
        let key = b"test-key";
        let c1 = sample_c1(SchemaVersion::Schema0, key);
        let (digest, schema) = DigestProcessor::new(c1, key).read_digest().unwrap();
        assert_eq!(schema, SchemaVersion::Schema0);
        assert_eq!(digest.len(), RTMP_DIGEST_LENGTH);
    }

    #[test]
    fn round_trips_schema1() {
        let key = b"test-key";
        let c1 = sample_c1(SchemaVersion::Schema1, key);
        let (digest, schema) = DigestProcessor::new(c1, key).read_digest().unwrap();
        assert_eq!(schema, SchemaVersion::Schema1);
        assert_eq!(digest.len(), RTMP_DIGEST_LENGTH);
    }

    #[test]
    fn rejects_wrong_key() {
        let c1 = sample_c1(SchemaVersion::Schema0, b"correct-key");
        assert!(DigestProcessor::new(c1, b"wrong-key").read_digest().is_err());
    }
}
