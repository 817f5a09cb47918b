// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Buffers and their per-buffer virtual interface.
//!
//! A [`Buffer`] exclusively owns its [`BufferStorage`]; the storage is freed
//! when the last `Arc<Buffer>` is dropped. Tensor reads and writes go
//! through the buffer's [`BufferInterface`], which a backend may replace
//! after allocation to run its own packing logic on memory that another
//! buffer type allocated.

use crate::backend::{same_buffer_type, BufferType};
use crate::{Tensor, TensorError};
use memory_manager::BufferStorage;
use std::any::Any;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What a buffer is used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Unspecified.
    #[default]
    Any,
    /// Model weights: written once at load time, read-only afterwards.
    Weights,
    /// Activations and caches: rewritten during compute.
    Compute,
}

/// Per-buffer operations on tensor regions.
///
/// The default methods operate on raw bytes; a backend overrides the ones
/// whose byte layout differs from the generic block layout.
pub trait BufferInterface: Send + Sync {
    /// Interface name, reported as the buffer name.
    fn name(&self) -> &'static str;

    /// The concrete interface, for backends that recognise their own buffers.
    fn as_any(&self) -> &dyn Any;

    /// Called once when `tensor` is placed in `buffer`.
    fn init_tensor(&self, _buffer: &Buffer, _tensor: &mut Tensor) -> Result<(), TensorError> {
        Ok(())
    }

    /// Writes `data` at byte `offset` of the tensor's region.
    fn set_tensor(
        &self,
        buffer: &Buffer,
        tensor: &Tensor,
        data: &[u8],
        offset: usize,
    ) -> Result<(), TensorError> {
        let start = tensor.region(offset, data.len())?;
        buffer.write_storage()?.write_at(start, data)?;
        Ok(())
    }

    /// Reads `len` bytes at byte `offset` of the tensor's region.
    fn get_tensor(
        &self,
        buffer: &Buffer,
        tensor: &Tensor,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, TensorError> {
        let start = tensor.region(offset, len)?;
        Ok(buffer.read_storage()?.read_at(start, len)?.to_vec())
    }

    /// Sets `len` bytes at byte `offset` of the tensor's region to `value`.
    fn memset_tensor(
        &self,
        buffer: &Buffer,
        tensor: &Tensor,
        value: u8,
        offset: usize,
        len: usize,
    ) -> Result<(), TensorError> {
        let start = tensor.region(offset, len)?;
        buffer.write_storage()?.fill_range(start, len, value)?;
        Ok(())
    }

    /// Sets every byte of the buffer to `value`.
    fn clear(&self, buffer: &Buffer, value: u8) -> Result<(), TensorError> {
        buffer.write_storage()?.fill(value);
        Ok(())
    }
}

/// The plain host interface: raw byte copies.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostBufferInterface;

impl BufferInterface for HostBufferInterface {
    fn name(&self) -> &'static str {
        "CPU"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An allocation of backend memory plus its interface.
pub struct Buffer {
    buft: &'static dyn BufferType,
    iface: Arc<dyn BufferInterface>,
    storage: RwLock<BufferStorage>,
    size: usize,
    usage: Mutex<BufferUsage>,
}

impl Buffer {
    /// Wraps freshly allocated storage.
    pub fn new(
        buft: &'static dyn BufferType,
        iface: Arc<dyn BufferInterface>,
        storage: BufferStorage,
    ) -> Self {
        Self {
            buft,
            iface,
            size: storage.len(),
            storage: RwLock::new(storage),
            usage: Mutex::new(BufferUsage::Any),
        }
    }

    /// Reassigns the buffer to another buffer type.
    pub fn with_buffer_type(mut self, buft: &'static dyn BufferType) -> Self {
        self.buft = buft;
        self
    }

    /// Replaces the per-buffer interface.
    pub fn with_interface(mut self, iface: Arc<dyn BufferInterface>) -> Self {
        self.iface = iface;
        self
    }

    /// Buffer name (the interface's name).
    pub fn name(&self) -> &'static str {
        self.iface.name()
    }

    /// Returns the interface if it is a `T`.
    pub fn interface_as<T: BufferInterface + 'static>(&self) -> Option<&T> {
        self.iface.as_any().downcast_ref::<T>()
    }

    /// The buffer type this buffer belongs to.
    pub fn buffer_type(&self) -> &'static dyn BufferType {
        self.buft
    }

    /// Returns `true` if this buffer belongs to `buft`.
    pub fn is_of_type(&self, buft: &dyn BufferType) -> bool {
        same_buffer_type(self.buft, buft)
    }

    /// Size in bytes (of one replica, for mirrored buffers).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the CPU can address this buffer directly.
    pub fn is_host(&self) -> bool {
        self.buft.is_host()
    }

    /// Base address of the primary allocation.
    pub fn base_addr(&self) -> Result<usize, TensorError> {
        Ok(self.read_storage()?.primary().addr())
    }

    /// Returns `true` when the storage is a mirror replica set.
    pub fn is_mirrored(&self) -> bool {
        self.read_storage()
            .map(|s| s.mirror().is_some())
            .unwrap_or(false)
    }

    /// Returns the current usage.
    pub fn usage(&self) -> BufferUsage {
        self.usage.lock().map(|u| *u).unwrap_or_default()
    }

    /// Declares the buffer's usage. Weights make mirrored storage read-only,
    /// which turns on write replication.
    pub fn set_usage(&self, usage: BufferUsage) -> Result<(), TensorError> {
        *self.usage.lock().map_err(|_| TensorError::LockPoisoned)? = usage;
        self.write_storage()?
            .set_read_only(usage == BufferUsage::Weights);
        Ok(())
    }

    /// Places `tensor` at `offset` and runs the interface's `init_tensor`.
    ///
    /// The region size is the buffer type's allocation size for the tensor.
    pub fn init_tensor(self: &Arc<Self>, tensor: &mut Tensor, offset: usize) -> Result<(), TensorError> {
        let size = self.buft.alloc_size(tensor);
        let alignment = self.buft.alignment();
        let fits = offset.checked_add(size).is_some_and(|end| end <= self.size);
        if offset % alignment != 0 || !fits {
            return Err(TensorError::InvalidWrite {
                tensor: tensor.name().to_string(),
                detail: format!(
                    "cannot place {size} bytes at offset {offset} in a {}-byte buffer aligned to {alignment}",
                    self.size
                ),
            });
        }
        tensor.place(Arc::clone(self), offset, size);
        self.iface.init_tensor(self, tensor)
    }

    /// Writes tensor bytes through the interface.
    pub fn set_tensor(&self, tensor: &Tensor, data: &[u8], offset: usize) -> Result<(), TensorError> {
        self.check_owner(tensor)?;
        self.iface.set_tensor(self, tensor, data, offset)
    }

    /// Reads tensor bytes through the interface.
    pub fn get_tensor(&self, tensor: &Tensor, offset: usize, len: usize) -> Result<Vec<u8>, TensorError> {
        self.check_owner(tensor)?;
        self.iface.get_tensor(self, tensor, offset, len)
    }

    /// Fills part of a tensor's region through the interface.
    pub fn memset_tensor(
        &self,
        tensor: &Tensor,
        value: u8,
        offset: usize,
        len: usize,
    ) -> Result<(), TensorError> {
        self.check_owner(tensor)?;
        self.iface.memset_tensor(self, tensor, value, offset, len)
    }

    /// Fills the whole buffer through the interface.
    pub fn clear(&self, value: u8) -> Result<(), TensorError> {
        self.iface.clear(self, value)
    }

    /// Shared access to the storage.
    pub fn read_storage(&self) -> Result<RwLockReadGuard<'_, BufferStorage>, TensorError> {
        self.storage.read().map_err(|_| TensorError::LockPoisoned)
    }

    /// Exclusive access to the storage.
    pub fn write_storage(&self) -> Result<RwLockWriteGuard<'_, BufferStorage>, TensorError> {
        self.storage.write().map_err(|_| TensorError::LockPoisoned)
    }

    fn check_owner(&self, tensor: &Tensor) -> Result<(), TensorError> {
        match tensor.buffer() {
            Some(owner) if std::ptr::eq(Arc::as_ptr(owner), self) => Ok(()),
            Some(_) => Err(TensorError::InvalidWrite {
                tensor: tensor.name().to_string(),
                detail: "tensor belongs to another buffer".into(),
            }),
            None => Err(TensorError::NotAllocated(tensor.name().to_string())),
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("name", &self.name())
            .field("buffer_type", &self.buft.name())
            .field("size", &self.size)
            .field("usage", &self.usage())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{alloc_tensors, cpu_buffer_type, HostBufferType};
    use crate::{DType, Shape};
    use memory_manager::MirrorPolicy;

    #[test]
    fn test_set_get_roundtrip() {
        let mut t = Tensor::new("x", DType::F32, Shape::vector(4)).unwrap();
        let buffer = alloc_tensors(cpu_buffer_type(), &mut [&mut t]).unwrap();
        t.set_f32(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(t.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.name(), "CPU");
    }

    #[test]
    fn test_write_outside_region_rejected() {
        let mut t = Tensor::new("x", DType::F32, Shape::vector(2)).unwrap();
        let buffer = alloc_tensors(cpu_buffer_type(), &mut [&mut t]).unwrap();
        assert!(buffer.set_tensor(&t, &[0; 4], 6).is_err());
        assert!(buffer.memset_tensor(&t, 1, 0, 9).is_err());
    }

    #[test]
    fn test_foreign_tensor_rejected() {
        let mut a = Tensor::new("a", DType::F32, Shape::vector(2)).unwrap();
        let mut b = Tensor::new("b", DType::F32, Shape::vector(2)).unwrap();
        let buf_a = alloc_tensors(cpu_buffer_type(), &mut [&mut a]).unwrap();
        let _buf_b = alloc_tensors(cpu_buffer_type(), &mut [&mut b]).unwrap();
        assert!(buf_a.set_tensor(&b, &[0; 8], 0).is_err());
    }

    #[test]
    fn test_memset_and_clear() {
        let mut t = Tensor::new("x", DType::F32, Shape::vector(4)).unwrap();
        let buffer = alloc_tensors(cpu_buffer_type(), &mut [&mut t]).unwrap();
        buffer.clear(0xFF).unwrap();
        buffer.memset_tensor(&t, 0, 0, 4).unwrap();
        let data = t.data().unwrap();
        assert_eq!(&data[..4], &[0; 4]);
        assert_eq!(&data[4..], &[0xFF; 12]);
    }

    #[test]
    fn test_weights_usage_turns_on_replication() {
        let buft: &'static HostBufferType = Box::leak(Box::new(
            HostBufferType::mirrored(64, MirrorPolicy::new([0, 1]).unwrap()).unwrap(),
        ));
        let mut t = Tensor::new("w", DType::F32, Shape::vector(4)).unwrap();
        let buffer = alloc_tensors(buft, &mut [&mut t]).unwrap();
        assert!(buffer.is_mirrored());

        t.set_f32(&[1.0; 4]).unwrap();
        {
            let storage = buffer.read_storage().unwrap();
            let set = storage.mirror().unwrap();
            assert_eq!(set.replica_for_node(1).unwrap().as_slice()[..4], [0; 4]);
        }

        buffer.set_usage(BufferUsage::Weights).unwrap();
        t.set_f32(&[2.0; 4]).unwrap();
        let storage = buffer.read_storage().unwrap();
        for (_, replica) in storage.mirror().unwrap().replicas() {
            assert_eq!(&replica.as_slice()[..16], bytemuck::cast_slice::<f32, u8>(&[2.0; 4]));
        }
    }
}
