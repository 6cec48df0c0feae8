//! Buffering base64 decoder for uploaded asset streams.
//!
//! Drains an incoming byte stream to completion and produces the whole asset
//! as one base64 string. Encoding happens incrementally in 3-byte aligned
//! blocks so the raw bytes are never held twice.

use base64::Engine;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{trace, warn};

use boomtown_core::{Error, Result};

/// Default cap on raw asset size (10 MiB).
pub const DEFAULT_MAX_ASSET_BYTES: usize = 10 * 1024 * 1024;

/// A fully buffered, base64-encoded asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAsset {
    /// Standard-alphabet, padded base64 of the whole stream.
    pub data: String,
    /// Number of raw bytes consumed.
    pub raw_len: usize,
}

/// Consumes a byte stream and yields its base64 encoding once the stream ends.
#[derive(Debug, Clone, Copy)]
pub struct AssetDecoder {
    max_bytes: usize,
}

impl Default for AssetDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ASSET_BYTES)
    }
}

impl AssetDecoder {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Drain `stream` and return the encoded asset.
    ///
    /// Fails with [`Error::StreamFailure`] if the stream yields an error
    /// before its end, and with [`Error::AssetTooLarge`] as soon as more than
    /// `max_bytes` raw bytes have arrived.
    pub async fn decode<S, E>(&self, mut stream: S) -> Result<EncodedAsset>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let engine = &base64::engine::general_purpose::STANDARD;
        let mut data = String::new();
        let mut pending: Vec<u8> = Vec::with_capacity(3);
        let mut raw_len = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                warn!(
                    subsystem = "workflow",
                    component = "asset_decoder",
                    bytes_read = raw_len,
                    error = %e,
                    "Asset stream failed before completion"
                );
                Error::StreamFailure
            })?;

            raw_len += chunk.len();
            if raw_len > self.max_bytes {
                warn!(
                    subsystem = "workflow",
                    component = "asset_decoder",
                    limit = self.max_bytes,
                    bytes_read = raw_len,
                    "Asset stream exceeded size cap"
                );
                return Err(Error::AssetTooLarge {
                    limit: self.max_bytes,
                });
            }

            pending.extend_from_slice(&chunk);
            let aligned = pending.len() - pending.len() % 3;
            engine.encode_string(&pending[..aligned], &mut data);
            pending.drain(..aligned);

            trace!(
                component = "asset_decoder",
                chunk_len = chunk.len(),
                bytes_read = raw_len,
                "Encoded asset chunk"
            );
        }

        engine.encode_string(&pending, &mut data);

        Ok(EncodedAsset { data, raw_len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::io;

    fn chunks(parts: &[&[u8]]) -> impl Stream<Item = io::Result<Bytes>> + Unpin {
        let owned: Vec<io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p)))
            .collect();
        stream::iter(owned)
    }

    fn expected(all: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(all)
    }

    #[tokio::test]
    async fn test_decode_single_chunk() {
        let asset = AssetDecoder::default()
            .decode(chunks(&[b"hello world"]))
            .await
            .unwrap();
        assert_eq!(asset.data, expected(b"hello world"));
        assert_eq!(asset.raw_len, 11);
    }

    #[tokio::test]
    async fn test_decode_unaligned_chunks_match_whole_encoding() {
        let parts: [&[u8]; 5] = [b"a", b"bc", b"defg", b"", b"hijklmn"];
        let asset = AssetDecoder::default().decode(chunks(&parts)).await.unwrap();
        assert_eq!(asset.data, expected(b"abcdefghijklmn"));
    }

    #[tokio::test]
    async fn test_decode_binary_200_bytes() {
        let raw: Vec<u8> = (0..200u32).map(|b| (b * 7 % 256) as u8).collect();
        let (a, b) = raw.split_at(77);
        let asset = AssetDecoder::default().decode(chunks(&[a, b])).await.unwrap();
        assert_eq!(asset.data, expected(&raw));
        assert_eq!(asset.raw_len, 200);
    }

    #[tokio::test]
    async fn test_decode_empty_stream() {
        let asset = AssetDecoder::default().decode(chunks(&[])).await.unwrap();
        assert_eq!(asset.data, "");
        assert_eq!(asset.raw_len, 0);
    }

    #[tokio::test]
    async fn test_stream_error_is_stream_failure() {
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
            Ok(Bytes::from_static(b"never read")),
        ];
        let err = AssetDecoder::default()
            .decode(stream::iter(items))
            .await
            .unwrap_err();
        assert_eq!(err, Error::StreamFailure);
    }

    #[tokio::test]
    async fn test_size_cap_enforced() {
        let err = AssetDecoder::new(4)
            .decode(chunks(&[b"abc", b"de"]))
            .await
            .unwrap_err();
        assert_eq!(err, Error::AssetTooLarge { limit: 4 });
    }

    #[tokio::test]
    async fn test_size_cap_is_inclusive() {
        let asset = AssetDecoder::new(5)
            .decode(chunks(&[b"abc", b"de"]))
            .await
            .unwrap();
        assert_eq!(asset.raw_len, 5);
    }
}
