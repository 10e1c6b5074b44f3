use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::UploadError;

/// Incoming file bytes, delivered chunk by chunk.
#[async_trait]
pub trait ByteSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError>;
}

/// File bytes already held in memory.
#[derive(Debug, Default)]
pub struct BufferedBody {
    chunks: VecDeque<Bytes>,
    len: u64,
}

impl BufferedBody {
    pub fn from_chunks<I, C>(chunks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Bytes>,
    {
        let mut body = Self::default();
        for chunk in chunks {
            body.push(chunk.into());
        }
        body
    }

    /// Reads `source` until it ends or more than `cap` bytes are held, whichever
    /// comes first. Memory stays bounded by `cap` plus one chunk.
    pub async fn read_capped<S>(source: &mut S, cap: u64) -> Result<Self, UploadError>
    where
        S: ByteSource + ?Sized,
    {
        let mut body = Self::default();
        while body.len <= cap {
            match source.next_chunk().await? {
                Some(chunk) => body.push(chunk),
                None => break,
            }
        }
        Ok(body)
    }

    pub fn push(&mut self, chunk: Bytes) {
        self.len += chunk.len() as u64;
        self.chunks.push_back(chunk);
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl From<Vec<u8>> for BufferedBody {
    fn from(data: Vec<u8>) -> Self {
        Self::from_chunks([data])
    }
}

impl From<&'static [u8]> for BufferedBody {
    fn from(data: &'static [u8]) -> Self {
        Self::from_chunks([data])
    }
}

#[async_trait]
impl ByteSource for BufferedBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, UploadError> {
        Ok(self.chunks.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_capped_stops_once_the_cap_is_passed() {
        let mut source =
            BufferedBody::from_chunks([&b"aaaa"[..], &b"bbbb"[..], &b"cccc"[..], &b"dddd"[..]]);

        let held = BufferedBody::read_capped(&mut source, 5).await.unwrap();
        assert_eq!(held.len(), 8);

        let rest = BufferedBody::read_capped(&mut source, 100).await.unwrap();
        assert_eq!(rest.len(), 8);
    }

    #[tokio::test]
    async fn read_capped_takes_everything_under_the_cap() {
        let mut source = BufferedBody::from(b"hello".to_vec());
        let held = BufferedBody::read_capped(&mut source, 5).await.unwrap();
        assert_eq!(held.len(), 5);
        assert!(source.next_chunk().await.unwrap().is_none());
    }
}
