// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Aligned, zero-initialised host allocations.
//!
//! [`AlignedBytes`] owns a single block obtained from the global allocator
//! with an explicit alignment. The block is released exactly once, when the
//! value is dropped. Tile loads want 64-byte aligned rows, which `Vec<u8>`
//! cannot promise, hence the manual layout handling here.

use crate::MemoryError;
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// An owned, aligned byte allocation.
///
/// # Example
/// ```
/// use memory_manager::AlignedBytes;
///
/// let mut block = AlignedBytes::zeroed(256, 64).unwrap();
/// assert_eq!(block.addr() % 64, 0);
/// block.as_mut_slice()[0] = 7;
/// assert_eq!(block.as_slice()[0], 7);
/// ```
pub struct AlignedBytes {
    ptr: NonNull<u8>,
    layout: Layout,
    len: usize,
}

impl AlignedBytes {
    /// Allocates `len` zeroed bytes aligned to `alignment`.
    ///
    /// A zero-length request still reserves one byte so the base address is
    /// real and aligned.
    ///
    /// # Errors
    /// - [`MemoryError::InvalidAlignment`] if `alignment` is not a power of two.
    /// - [`MemoryError::OutOfMemory`] if the layout is unrepresentable or the
    ///   allocator returns null.
    pub fn zeroed(len: usize, alignment: usize) -> Result<Self, MemoryError> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(MemoryError::InvalidAlignment(alignment));
        }
        let oom = || MemoryError::OutOfMemory {
            requested_bytes: len,
            alignment,
        };
        let layout = Layout::from_size_align(len.max(1), alignment).map_err(|_| oom())?;

        // SAFETY: `layout` has a non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or_else(oom)?;

        Ok(Self { ptr, layout, len })
    }

    /// Returns the usable length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the allocation holds no usable bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the alignment the block was allocated with.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Returns the base address, for alignment diagnostics.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Returns an immutable view of the whole block.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` initialised bytes for the life of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Returns a mutable view of the whole block.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Returns the sub-range `offset..offset + len`.
    pub fn range(&self, offset: usize, len: usize) -> Result<&[u8], MemoryError> {
        check_range(offset, len, self.len)?;
        Ok(&self.as_slice()[offset..offset + len])
    }

    /// Returns the mutable sub-range `offset..offset + len`.
    pub fn range_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], MemoryError> {
        check_range(offset, len, self.len)?;
        Ok(&mut self.as_mut_slice()[offset..offset + len])
    }
}

/// Validates that `offset..offset + len` lies inside `size` bytes.
pub(crate) fn check_range(offset: usize, len: usize, size: usize) -> Result<(), MemoryError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(MemoryError::OutOfBounds { offset, len, size }),
    }
}

impl Drop for AlignedBytes {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `alloc_zeroed` with this exact layout and is
        // freed only here.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: the block is uniquely owned; shared access is read-only and
// mutation requires `&mut self`.
unsafe impl Send for AlignedBytes {}
unsafe impl Sync for AlignedBytes {}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBytes")
            .field("len", &self.len)
            .field("alignment", &self.layout.align())
            .finish()
    }
}
