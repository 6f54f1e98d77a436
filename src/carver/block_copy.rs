use std::io::{self, Read, Write};

use crate::error::CarveError;

/// Counters from one completed copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyStats {
    pub blocks: u64,
    pub bytes: u64,
}

/// Copies a source handle to a destination handle one block at a time.
///
/// Only a single block buffer is ever allocated, so arbitrarily large files
/// are copied in constant memory.
#[derive(Debug, Clone, Copy)]
pub struct BlockCopier {
    block_size: usize,
}

impl BlockCopier {
    pub fn new(block_size: usize) -> Result<Self, CarveError> {
        if block_size == 0 {
            return Err(CarveError::Config("block_size must be greater than zero".into()));
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of block reads needed for a source of `len` bytes.
    pub fn block_count(&self, len: u64) -> u64 {
        len.div_ceil(self.block_size as u64)
    }

    /// Copy exactly `src_len` bytes from `src` to `dst`.
    ///
    /// `src_len` is the size observed when the source was opened. Each block
    /// is read in full and written in full before the next read; a source
    /// that ends early or any OS error fails the copy and leaves `dst`
    /// partially written.
    pub fn copy<R: Read, W: Write>(
        &self,
        src: &mut R,
        src_len: u64,
        dst: &mut W,
    ) -> Result<CopyStats, CarveError> {
        let blocks = self.block_count(src_len);
        let mut block = vec![0u8; std::cmp::min(self.block_size as u64, src_len) as usize];
        let mut remaining = src_len;
        let mut stats = CopyStats::default();

        for index in 0..blocks {
            let want = std::cmp::min(remaining, self.block_size as u64) as usize;
            let buf = &mut block[..want];

            src.read_exact(buf).map_err(|e| {
                let context = if e.kind() == io::ErrorKind::UnexpectedEof {
                    format!("Short read on block {} of {}", index, blocks)
                } else {
                    format!("Failed to read block {} of {}", index, blocks)
                };
                CarveError::io(context, e)
            })?;

            dst.write_all(buf)
                .map_err(|e| CarveError::io(format!("Failed to write block {} of {}", index, blocks), e))?;

            remaining -= want as u64;
            stats.blocks += 1;
            stats.bytes += want as u64;
        }

        dst.flush()
            .map_err(|e| CarveError::io("Failed to flush destination", e))?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// Counts calls to `read` on the wrapped reader.
    struct CountingReader<R> {
        inner: R,
        reads: u64,
    }

    impl<R: Read> Read for CountingReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
    }

    /// Accepts only `limit` bytes, then reports a zero-length write.
    struct FullDisk {
        written: Vec<u8>,
        limit: usize,
    }

    impl Write for FullDisk {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.limit - self.written.len();
            let n = room.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(matches!(BlockCopier::new(0), Err(CarveError::Config(_))));
    }

    #[test]
    fn test_empty_source_performs_no_reads() {
        let copier = BlockCopier::new(8192).unwrap();
        let mut src = CountingReader { inner: Cursor::new(Vec::new()), reads: 0 };
        let mut dst = Vec::new();

        let stats = copier.copy(&mut src, 0, &mut dst).unwrap();
        assert_eq!(stats, CopyStats { blocks: 0, bytes: 0 });
        assert_eq!(src.reads, 0);
        assert!(dst.is_empty());
    }

    #[test]
    fn test_block_boundaries() {
        let copier = BlockCopier::new(8192).unwrap();
        for (len, expected_blocks) in [(1, 1), (8191, 1), (8192, 1), (8193, 2), (16385, 3)] {
            let data = pattern(len);
            let mut src = CountingReader { inner: Cursor::new(data.clone()), reads: 0 };
            let mut dst = Vec::new();

            let stats = copier.copy(&mut src, len as u64, &mut dst).unwrap();
            assert_eq!(stats.blocks, expected_blocks, "len {}", len);
            assert_eq!(src.reads, expected_blocks, "len {}", len);
            assert_eq!(dst, data);
        }
    }

    #[test]
    fn test_short_source_is_io_error() {
        let copier = BlockCopier::new(4).unwrap();
        let mut src = Cursor::new(vec![1u8; 6]);
        let mut dst = Vec::new();

        let err = copier.copy(&mut src, 10, &mut dst).unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("Short read"));
        // first block landed before the failure
        assert_eq!(dst, vec![1u8; 4]);
    }

    #[test]
    fn test_short_write_is_io_error() {
        let copier = BlockCopier::new(4).unwrap();
        let mut src = Cursor::new(pattern(12));
        let mut dst = FullDisk { written: Vec::new(), limit: 6 };

        let err = copier.copy(&mut src, 12, &mut dst).unwrap_err();
        assert!(err.is_io());
        assert!(err.to_string().contains("Failed to write block 1"));
    }

    #[test]
    fn test_longer_source_copies_only_snapshot_length() {
        let copier = BlockCopier::new(3).unwrap();
        let mut src = Cursor::new(pattern(10));
        let mut dst = Vec::new();

        let stats = copier.copy(&mut src, 7, &mut dst).unwrap();
        assert_eq!(stats.bytes, 7);
        assert_eq!(dst, pattern(7));
    }

    proptest! {
        #[test]
        fn prop_copy_is_exact(len in 0usize..20_000, block in 1usize..5_000) {
            let copier = BlockCopier::new(block).unwrap();
            let data = pattern(len);
            let mut src = CountingReader { inner: Cursor::new(data.clone()), reads: 0 };
            let mut dst = Vec::new();

            let stats = copier.copy(&mut src, len as u64, &mut dst).unwrap();
            let expected = (len as u64).div_ceil(block as u64);
            prop_assert_eq!(stats.blocks, expected);
            prop_assert_eq!(src.reads, expected);
            prop_assert_eq!(stats.bytes, len as u64);
            prop_assert_eq!(dst, data);
        }
    }
}
