//! Chunked iteration over cursors.
//!
//! `Chunked` turns any iterator (typically a row cursor) into batches of a
//! fixed size so consumers can process large results with bounded memory.
//! Dropping it ends the underlying cursor and logs a `stream_close` event.

use log::debug;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Rejected chunk size; chunks must hold more than one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizeError(pub usize);

impl Display for ChunkSizeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk size must be greater than 1, got {}", self.0)
    }
}

impl Error for ChunkSizeError {}

/// Iterator adapter yielding `Vec`s of up to `chunk_size` items.
///
/// Never yields an empty chunk; only the last chunk may be short.
pub struct Chunked<I> {
    inner: I,
    chunk_size: usize,
    chunks: usize,
    items: usize,
    exhausted: bool,
}

impl<I: Iterator> Chunked<I> {
    pub fn new(inner: I, chunk_size: usize) -> Result<Self, ChunkSizeError> {
        if chunk_size <= 1 {
            return Err(ChunkSizeError(chunk_size));
        }
        Ok(Self {
            inner,
            chunk_size,
            chunks: 0,
            items: 0,
            exhausted: false,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl<I: Iterator> Iterator for Chunked<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let chunk: Vec<I::Item> = self.inner.by_ref().take(self.chunk_size).collect();
        if chunk.len() < self.chunk_size {
            self.exhausted = true;
        }
        if chunk.is_empty() {
            return None;
        }
        self.chunks += 1;
        self.items += chunk.len();
        Some(chunk)
    }
}

impl<I> Drop for Chunked<I> {
    fn drop(&mut self) {
        debug!(
            "event=stream_close module=stream status=ok chunks={} items={} exhausted={}",
            self.chunks, self.items, self.exhausted
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkSizeError, Chunked};

    #[test]
    fn splits_into_full_chunks_and_a_short_tail() {
        let chunks: Vec<Vec<i32>> = Chunked::new(1..=7, 3).unwrap().collect();
        assert_eq!(chunks, vec![vec![1, 2, 3], vec![4, 5, 6], vec![7]]);
    }

    #[test]
    fn never_yields_an_empty_chunk() {
        let chunks: Vec<Vec<i32>> = Chunked::new(1..=4, 2).unwrap().collect();
        assert_eq!(chunks, vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(Chunked::new(std::iter::empty::<i32>(), 2).unwrap().count(), 0);
    }

    #[test]
    fn rejects_degenerate_chunk_sizes() {
        assert_eq!(Chunked::new(1..3, 1).err(), Some(ChunkSizeError(1)));
        assert_eq!(Chunked::new(1..3, 0).err(), Some(ChunkSizeError(0)));
    }
}
