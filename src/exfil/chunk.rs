use crate::error::CarveError;
use crate::models::ChunkUploadRecord;

/// How an artifact of `total` bytes splits into upload chunks.
///
/// Every chunk but the last is exactly `chunk_size` bytes; the last holds
/// the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(total: u64, chunk_size: usize) -> Result<Self, CarveError> {
        if chunk_size == 0 {
            return Err(CarveError::Config("chunk_size must be greater than zero".into()));
        }
        Ok(Self {
            total,
            chunk_size: chunk_size as u64,
        })
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// `ceil(total / chunk_size)`
    pub fn count(&self) -> u64 {
        self.total.div_ceil(self.chunk_size)
    }

    /// Byte range of chunk `index` as `(offset, len)`.
    pub fn range(&self, index: u64) -> Option<(u64, usize)> {
        if index >= self.count() {
            return None;
        }
        let offset = index * self.chunk_size;
        let len = std::cmp::min(self.chunk_size, self.total - offset) as usize;
        Some((offset, len))
    }

    /// Chunks in ascending index order.
    pub fn records<'a>(&self, guid: &'a str) -> impl Iterator<Item = ChunkUploadRecord<'a>> + 'a {
        let plan = *self;
        (0..plan.count()).filter_map(move |index| {
            plan.range(index).map(|(offset, len)| ChunkUploadRecord {
                index,
                offset,
                len,
                guid,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert!(ChunkPlan::new(10, 0).is_err());
    }

    #[test]
    fn test_counts() {
        for (total, size, count) in [(0, 10, 0), (1, 10, 1), (10, 10, 1), (11, 10, 2), (24577, 10000, 3)] {
            assert_eq!(ChunkPlan::new(total, size).unwrap().count(), count, "{} / {}", total, size);
        }
    }

    #[test]
    fn test_last_chunk_holds_remainder() {
        let plan = ChunkPlan::new(25, 10).unwrap();
        let records: Vec<_> = plan.records("g").collect();
        assert_eq!(records.len(), 3);
        assert_eq!((records[0].offset, records[0].len), (0, 10));
        assert_eq!((records[1].offset, records[1].len), (10, 10));
        assert_eq!((records[2].offset, records[2].len), (20, 5));
        assert!(records.iter().all(|r| r.guid == "g"));
        assert_eq!(plan.range(3), None);
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_artifact(total in 0u64..1_000_000, size in 1usize..70_000) {
            let plan = ChunkPlan::new(total, size).unwrap();
            let records: Vec<_> = plan.records("p").collect();

            prop_assert_eq!(records.len() as u64, total.div_ceil(size as u64));
            prop_assert_eq!(records.iter().map(|r| r.len as u64).sum::<u64>(), total);

            let mut expected_offset = 0;
            for (i, record) in records.iter().enumerate() {
                prop_assert_eq!(record.index, i as u64);
                prop_assert_eq!(record.offset, expected_offset);
                if i + 1 < records.len() {
                    prop_assert_eq!(record.len, size);
                }
                expected_offset += record.len as u64;
            }
        }
    }
}
