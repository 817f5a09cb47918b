// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Backing storage for a buffer: a single block or a mirror replica set.

use crate::aligned::check_range;
use crate::{AlignedBytes, MemoryError, MirrorReplicas};

/// The memory behind one buffer.
///
/// The variant is the only thing that distinguishes a mirrored buffer from a
/// plain one; there is no sentinel to inspect.
#[derive(Debug)]
pub enum BufferStorage {
    /// A single aligned allocation.
    Plain(AlignedBytes),
    /// One allocation per NUMA domain.
    Mirror(MirrorReplicas),
}

impl BufferStorage {
    /// Logical size in bytes (the size of one replica for mirrors).
    pub fn len(&self) -> usize {
        match self {
            BufferStorage::Plain(block) => block.len(),
            BufferStorage::Mirror(set) => set.size(),
        }
    }

    /// Returns `true` for zero-sized storage.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the replica set for mirrored storage.
    pub fn mirror(&self) -> Option<&MirrorReplicas> {
        match self {
            BufferStorage::Mirror(set) => Some(set),
            BufferStorage::Plain(_) => None,
        }
    }

    /// Mutable access to the replica set for mirrored storage.
    pub fn mirror_mut(&mut self) -> Option<&mut MirrorReplicas> {
        match self {
            BufferStorage::Mirror(set) => Some(set),
            BufferStorage::Plain(_) => None,
        }
    }

    /// The logical base allocation.
    pub fn primary(&self) -> &AlignedBytes {
        match self {
            BufferStorage::Plain(block) => block,
            BufferStorage::Mirror(set) => set.primary(),
        }
    }

    /// Mutable access to the logical base allocation.
    pub fn primary_mut(&mut self) -> &mut AlignedBytes {
        match self {
            BufferStorage::Plain(block) => block,
            BufferStorage::Mirror(set) => set.primary_mut(),
        }
    }

    /// Selects the copy a reader on `node` should use: its local replica when
    /// the set replicates writes and `node` is active, otherwise the primary.
    ///
    /// Replicas of a mutable set are never written, so they are never read.
    pub fn replica(&self, node: Option<u32>) -> &AlignedBytes {
        match (self, node) {
            (BufferStorage::Mirror(set), Some(node)) if set.should_replicate() => {
                set.replica_for_node(node).unwrap_or_else(|| set.primary())
            }
            _ => self.primary(),
        }
    }

    /// Propagates a read-only marking to mirrored storage. No-op for plain.
    pub fn set_read_only(&mut self, read_only: bool) {
        if let BufferStorage::Mirror(set) = self {
            set.set_read_only(read_only);
        }
    }

    /// Every allocation a write must reach.
    ///
    /// All replicas for a read-only mirror with more than one replica; the
    /// primary alone otherwise.
    pub fn write_targets(&mut self) -> Vec<(Option<u32>, &mut AlignedBytes)> {
        match self {
            BufferStorage::Mirror(set) => {
                if set.should_replicate() {
                    set.replicas_mut()
                        .map(|(node, block)| (Some(node), block))
                        .collect()
                } else {
                    let node = set.primary_node();
                    vec![(Some(node), set.primary_mut())]
                }
            }
            BufferStorage::Plain(block) => vec![(None, block)],
        }
    }

    /// Reads `len` bytes at `offset` from the primary.
    pub fn read_at(&self, offset: usize, len: usize) -> Result<&[u8], MemoryError> {
        self.primary().range(offset, len)
    }

    /// Copies `data` to `offset` in every write target.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), MemoryError> {
        check_range(offset, data.len(), self.len())?;
        for (_, block) in self.write_targets() {
            block.range_mut(offset, data.len())?.copy_from_slice(data);
        }
        Ok(())
    }

    /// Sets `len` bytes at `offset` to `value` in every write target.
    pub fn fill_range(&mut self, offset: usize, len: usize, value: u8) -> Result<(), MemoryError> {
        check_range(offset, len, self.len())?;
        for (_, block) in self.write_targets() {
            block.range_mut(offset, len)?.fill(value);
        }
        Ok(())
    }

    /// Sets every byte of every replica to `value`.
    pub fn fill(&mut self, value: u8) {
        match self {
            BufferStorage::Plain(block) => block.as_mut_slice().fill(value),
            BufferStorage::Mirror(set) => {
                for (_, block) in set.replicas_mut() {
                    block.as_mut_slice().fill(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MirrorPolicy;

    fn mirrored(read_only: bool) -> BufferStorage {
        let policy = MirrorPolicy::new([0, 1, 2]).unwrap();
        let mut set = MirrorReplicas::allocate(64, 64, &policy).unwrap();
        set.set_read_only(read_only);
        BufferStorage::Mirror(set)
    }

    #[test]
    fn test_plain_write_and_read() {
        let mut s = BufferStorage::Plain(AlignedBytes::zeroed(32, 32).unwrap());
        s.write_at(8, &[9, 9]).unwrap();
        assert_eq!(s.read_at(8, 2).unwrap(), &[9, 9]);
        assert!(s.write_at(31, &[1, 2]).is_err());
        assert!(s.mirror().is_none());
    }

    #[test]
    fn test_read_only_mirror_writes_all_replicas() {
        let mut s = mirrored(true);
        s.write_at(4, &[1, 2, 3]).unwrap();
        for (_, block) in s.mirror().unwrap().replicas() {
            assert_eq!(&block.as_slice()[4..7], &[1, 2, 3]);
        }
    }

    #[test]
    fn test_mutable_mirror_writes_primary_only() {
        let mut s = mirrored(false);
        s.write_at(0, &[7]).unwrap();
        let set = s.mirror().unwrap();
        assert_eq!(set.primary().as_slice()[0], 7);
        assert_eq!(set.replica_for_node(1).unwrap().as_slice()[0], 0);
        assert_eq!(set.replica_for_node(2).unwrap().as_slice()[0], 0);
    }

    #[test]
    fn test_replica_selection_falls_back_to_primary() {
        let mut s = mirrored(true);
        s.write_at(0, &[5]).unwrap();
        let primary = s.primary().addr();
        assert_eq!(s.replica(None).addr(), primary);
        assert_eq!(s.replica(Some(7)).addr(), primary);
        assert_ne!(s.replica(Some(2)).addr(), primary);
    }

    #[test]
    fn test_mutable_mirror_reads_primary_on_every_node() {
        let mut s = mirrored(false);
        s.write_at(0, &[3, 4]).unwrap();
        let primary = s.primary().addr();
        for node in [0, 1, 2] {
            assert_eq!(s.replica(Some(node)).addr(), primary);
            assert_eq!(&s.replica(Some(node)).as_slice()[..2], &[3, 4]);
        }
    }

    #[test]
    fn test_late_read_only_marking_syncs_replicas() {
        let mut s = mirrored(false);
        s.write_at(10, &[8, 9]).unwrap();
        s.set_read_only(true);
        for node in [0, 1, 2] {
            assert_eq!(&s.replica(Some(node)).as_slice()[10..12], &[8, 9]);
        }
    }

    #[test]
    fn test_fill_reaches_every_replica() {
        let mut s = mirrored(false);
        s.fill(0xAB);
        for (_, block) in s.mirror().unwrap().replicas() {
            assert!(block.as_slice().iter().all(|&b| b == 0xAB));
        }
    }

    #[test]
    fn test_set_read_only_propagates() {
        let mut s = mirrored(false);
        s.set_read_only(true);
        assert!(s.mirror().unwrap().should_replicate());
        assert_eq!(s.write_targets().len(), 3);
    }
}
