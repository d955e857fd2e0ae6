//! Slice-level storage for a single chunk of a cached file.
//!
//! A chunk holds an ordered set of [`Slice`]s, each an interval of bytes
//! tagged with a sequence number. Writes append slices without merging;
//! reads project the slice set newest-wins; `coalesce` collapses the set
//! back into a minimal disjoint form with identical projection.

/// Sequence number reserved for the base slice a store fetch backfills.
///
/// Write slices start at 1, so under the ascending-sequence projection a
/// backfilled base can never shadow bytes a client has written.
pub const BACKFILL_SEQ: u64 = 0;

/// An interval of bytes within a chunk, tagged with its arrival sequence.
#[derive(Debug, Clone)]
pub struct Slice {
    /// Offset of the first byte within the chunk.
    pub start: u32,
    /// Monotonically increasing per-file sequence number; never reused.
    pub seq: u64,
    pub bytes: Vec<u8>,
}

impl Slice {
    /// Length of the interval in bytes.
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// One past the last byte offset this slice covers.
    pub fn end(&self) -> u32 {
        self.start + self.len()
    }
}

/// Slice list of one chunk plus its dirty flag.
#[derive(Debug, Default)]
pub struct ChunkCache {
    /// Slices in ascending sequence order.
    slices: Vec<Slice>,
    /// Set on every write, cleared when an upload of at least this state
    /// completes.
    dirty: bool,
}

impl ChunkCache {
    pub fn new() -> Self {
        ChunkCache::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    /// Highest sequence present; 0 for an empty chunk.
    pub fn max_seq(&self) -> u64 {
        self.slices.last().map(|s| s.seq).unwrap_or(0)
    }

    /// One past the highest byte offset any slice covers.
    pub fn extent(&self) -> u32 {
        self.slices.iter().map(Slice::end).max().unwrap_or(0)
    }

    /// Whether a base slice has been backfilled into this chunk.
    pub fn has_base(&self) -> bool {
        self.slices.first().map(|s| s.seq == BACKFILL_SEQ).unwrap_or(false)
    }

    /// Appends a write slice, keeping the list ordered by sequence.
    ///
    /// Sequences are handed out by the file-level counter; concurrent
    /// writers may reach the chunk out of order, hence the sorted insert.
    pub fn insert(&mut self, slice: Slice) {
        if slice.is_empty() {
            return;
        }
        let pos = self.slices.partition_point(|s| s.seq <= slice.seq);
        self.slices.insert(pos, slice);
        self.dirty = true;
    }

    /// Installs fetched store content as the oldest slice of the chunk.
    ///
    /// No-op when a base is already present: by then the chunk is fully
    /// covered up to the base extent and re-fetching would be stale.
    pub fn backfill(&mut self, bytes: Vec<u8>) {
        if self.has_base() || bytes.is_empty() {
            return;
        }
        self.slices.insert(0, Slice { start: 0, seq: BACKFILL_SEQ, bytes });
    }

    /// Newest-wins read of `[offset, offset + len)`.
    ///
    /// Applies every slice in ascending sequence order to a result buffer
    /// while tracking per-byte coverage; a window with any uncovered byte
    /// is a miss and the caller fills it (store fetch or sparse policy).
    pub fn read(&self, offset: u32, len: u32) -> Option<Vec<u8>> {
        if len == 0 {
            return Some(Vec::new());
        }
        let mut buf = vec![0_u8; len as usize];
        let mut covered = vec![false; len as usize];
        self.overlay(offset, &mut buf, &mut covered);
        if covered.iter().all(|&c| c) {
            Some(buf)
        } else {
            None
        }
    }

    /// Full projection of the chunk up to `extent`, zero-filled where no
    /// slice covers. This is the block image the uploader ships.
    pub fn materialize(&self, extent: u32) -> Vec<u8> {
        let mut buf = vec![0_u8; extent as usize];
        let mut covered = vec![false; extent as usize];
        self.overlay(0, &mut buf, &mut covered);
        buf
    }

    /// Replaces the slice list with a minimal disjoint set whose projection
    /// is byte-identical. Fresh sequence numbers come from `next_seq`.
    ///
    /// Idempotent: coalescing a coalesced chunk recreates the same runs.
    pub fn coalesce(&mut self, mut next_seq: impl FnMut() -> u64) {
        let extent = self.extent();
        if extent == 0 || self.slices.len() <= 1 {
            return;
        }
        let mut buf = vec![0_u8; extent as usize];
        let mut covered = vec![false; extent as usize];
        self.overlay(0, &mut buf, &mut covered);

        let mut replacement: Vec<Slice> = Vec::new();
        let mut run_start: Option<usize> = None;
        for i in 0..=covered.len() {
            let is_covered = i < covered.len() && covered[i];
            match (is_covered, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    replacement.push(Slice {
                        start: start as u32,
                        seq: next_seq(),
                        bytes: buf[start..i].to_vec(),
                    });
                    run_start = None;
                }
                _ => {}
            }
        }
        self.slices = replacement;
    }

    /// Clips the chunk to `[0, limit)`: slices beyond the limit are
    /// dropped, straddling slices lose their tail. Marks the chunk dirty
    /// when anything changed.
    pub fn truncate_to(&mut self, limit: u32) {
        let before = self.slices.len();
        let mut clipped = false;
        self.slices.retain(|s| s.start < limit);
        for s in &mut self.slices {
            if s.end() > limit {
                s.bytes.truncate((limit - s.start) as usize);
                clipped = true;
            }
        }
        if clipped || self.slices.len() != before {
            self.dirty = true;
        }
    }

    /// Applies all slices to `buf` (which represents `[offset,
    /// offset + buf.len())`) in ascending sequence order, recording
    /// coverage.
    fn overlay(&self, offset: u32, buf: &mut [u8], covered: &mut [bool]) {
        let window_end = offset as u64 + buf.len() as u64;
        for slice in &self.slices {
            let lo = slice.start.max(offset);
            let hi = (slice.end() as u64).min(window_end) as u32;
            if lo >= hi {
                continue;
            }
            let dst = (lo - offset) as usize..(hi - offset) as usize;
            let src = (lo - slice.start) as usize..(hi - slice.start) as usize;
            buf[dst.clone()].copy_from_slice(&slice.bytes[src]);
            for c in &mut covered[dst] {
                *c = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(chunk: &mut ChunkCache, start: u32, bytes: &[u8], seq: u64) {
        chunk.insert(Slice { start, seq, bytes: bytes.to_vec() });
    }

    #[test]
    fn later_sequence_wins_on_overlap() {
        let mut chunk = ChunkCache::new();
        write(&mut chunk, 0, &[b'A'; 1024], 1);
        write(&mut chunk, 512, &[b'B'; 1024], 2);

        let projected = chunk.read(0, 1536).expect("fully covered");
        assert_eq!(&projected[..512], &[b'A'; 512][..]);
        assert_eq!(&projected[512..], &[b'B'; 1024][..]);
    }

    #[test]
    fn uncovered_byte_is_a_miss() {
        let mut chunk = ChunkCache::new();
        write(&mut chunk, 0, &[1; 10], 1);
        write(&mut chunk, 20, &[2; 10], 2);

        assert!(chunk.read(0, 30).is_none());
        assert!(chunk.read(0, 10).is_some());
        assert!(chunk.read(20, 10).is_some());
    }

    #[test]
    fn backfill_never_shadows_writes() {
        let mut chunk = ChunkCache::new();
        write(&mut chunk, 0, &[b'W'; 100], 1);
        chunk.backfill(vec![b'S'; 4096]);

        let projected = chunk.read(0, 200).expect("base covers the window");
        assert_eq!(&projected[..100], &[b'W'; 100][..]);
        assert_eq!(&projected[100..], &[b'S'; 100][..]);
    }

    #[test]
    fn coalesce_preserves_projection() {
        let mut chunk = ChunkCache::new();
        write(&mut chunk, 0, &[1; 100], 1);
        write(&mut chunk, 50, &[2; 100], 2);
        write(&mut chunk, 300, &[3; 50], 3);
        let before = chunk.materialize(chunk.extent());

        let mut seq = 10;
        chunk.coalesce(|| {
            seq += 1;
            seq
        });
        assert_eq!(chunk.materialize(chunk.extent()), before);
        // disjoint runs: [0,150) and [300,350)
        assert!(chunk.read(0, 150).is_some());
        assert!(chunk.read(150, 150).is_none());

        let snapshot = chunk.materialize(chunk.extent());
        chunk.coalesce(|| {
            seq += 1;
            seq
        });
        assert_eq!(chunk.materialize(chunk.extent()), snapshot);
    }

    #[test]
    fn truncate_clips_and_drops() {
        let mut chunk = ChunkCache::new();
        write(&mut chunk, 0, &[1; 100], 1);
        write(&mut chunk, 200, &[2; 100], 2);

        chunk.truncate_to(250);
        assert_eq!(chunk.extent(), 250);
        chunk.truncate_to(50);
        assert_eq!(chunk.extent(), 50);
        assert_eq!(chunk.read(0, 50).expect("head survives"), vec![1; 50]);
    }
}
