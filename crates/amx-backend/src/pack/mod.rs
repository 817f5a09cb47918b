// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight packing: generic block rows to the tile layout and back.
//!
//! A weight tensor `[N, K]` is cut into `N / TILE_N` × `K / TILE_K` tiles.
//! Tile `(nb, kb)` covers rows `nb·16 .. nb·16 + 16` and block `kb` of each
//! row, and is stored at index `nb · KB + kb` where `KB = K / TILE_K`. Every
//! tile has the same fixed size for a given kind, see [`tile_bytes`].
//!
//! The packed layout is the interchange format: packed weights may be cached
//! to disk, so the byte layout of each kind is fixed (see the kind modules).

pub mod q4_0;
pub mod q4_1;
pub mod q8_0;
pub mod vnni;

use crate::tile::{TILE_K, TILE_N};
use crate::PackError;
use bytemuck::Pod;
use tensor_core::{DType, Tensor};

use q4_0::Q4_0Tile;
use q4_1::Q4_1Tile;
use q8_0::Q8_0Tile;

/// One kind's tile layout.
pub trait PackedTile {
    /// Generic block type of the kind; one block is `TILE_K` elements.
    type Block: Pod;
    /// Bytes of one packed tile.
    const TILE_BYTES: usize;

    /// Packs `TILE_N` row blocks into `dst[..TILE_BYTES]`.
    fn pack(rows: &[Self::Block; TILE_N], dst: &mut [u8]);

    /// Recovers the row blocks of one packed tile.
    fn unpack(src: &[u8]) -> [Self::Block; TILE_N];
}

/// Bytes of one packed tile of `dtype`, or `None` if it has no packed
/// layout.
pub fn tile_bytes(dtype: DType) -> Option<usize> {
    match dtype {
        DType::Q4_0 => Some(Q4_0Tile::TILE_BYTES),
        DType::Q4_1 => Some(Q4_1Tile::TILE_BYTES),
        DType::Q8_0 => Some(Q8_0Tile::TILE_BYTES),
        DType::F32 | DType::F16 | DType::BF16 => None,
    }
}

/// Bytes of `tile_count` packed tiles of `dtype`.
pub fn packed_size(dtype: DType, tile_count: usize) -> Option<usize> {
    tile_bytes(dtype).map(|b| b * tile_count)
}

/// Whether a `[n, k]` tensor of `dtype` can be packed.
pub fn can_pack(dtype: DType, k: usize, n: usize) -> bool {
    check(dtype, k, n).is_ok()
}

/// Whether `tensor` is stored packed by the tile backend.
pub fn is_packable(tensor: &Tensor) -> bool {
    tensor.shape().is_2d()
        && tensor.is_contiguous()
        && can_pack(tensor.dtype(), tensor.shape().cols(), tensor.shape().rows())
}

/// Bytes of a packed `[n, k]` tensor of `dtype`.
pub fn packed_tensor_size(dtype: DType, k: usize, n: usize) -> Result<usize, PackError> {
    let tile = check(dtype, k, n)?;
    Ok(tile * (k / TILE_K) * (n / TILE_N))
}

/// Packs `n` rows of `k` elements from generic block layout into `dst`.
///
/// # Errors
/// Fails before writing anything when the kind has no packed layout, K or N
/// is not a tile multiple, or either slice has the wrong length.
pub fn pack_weights(
    dtype: DType,
    src: &[u8],
    dst: &mut [u8],
    k: usize,
    n: usize,
) -> Result<(), PackError> {
    let packed = packed_tensor_size(dtype, k, n)?;
    expect_len("source", n * dtype.type_size() * (k / dtype.block_size()), src.len())?;
    expect_len("destination", packed, dst.len())?;
    match dtype {
        DType::Q4_0 => pack_all::<Q4_0Tile>(src, dst, k, n),
        DType::Q4_1 => pack_all::<Q4_1Tile>(src, dst, k, n),
        DType::Q8_0 => pack_all::<Q8_0Tile>(src, dst, k, n),
        DType::F32 | DType::F16 | DType::BF16 => return Err(PackError::Unsupported(dtype)),
    }
    tracing::trace!(dtype = %dtype, k, n, bytes = packed, "packed weights");
    Ok(())
}

/// Recovers the generic block layout from packed weights.
///
/// The exact inverse of [`pack_weights`].
pub fn unpack_weights(dtype: DType, packed: &[u8], k: usize, n: usize) -> Result<Vec<u8>, PackError> {
    expect_len("packed", packed_tensor_size(dtype, k, n)?, packed.len())?;
    let out = match dtype {
        DType::Q4_0 => unpack_all::<Q4_0Tile>(packed, k, n),
        DType::Q4_1 => unpack_all::<Q4_1Tile>(packed, k, n),
        DType::Q8_0 => unpack_all::<Q8_0Tile>(packed, k, n),
        DType::F32 | DType::F16 | DType::BF16 => return Err(PackError::Unsupported(dtype)),
    };
    Ok(out)
}

/// The bytes of tile `(nb, kb)` within a packed tensor with `kb_count`
/// K-blocks.
pub fn tile(packed: &[u8], tile_bytes: usize, kb_count: usize, nb: usize, kb: usize) -> &[u8] {
    let at = (nb * kb_count + kb) * tile_bytes;
    &packed[at..at + tile_bytes]
}

/// Rebuilds a block's `qs` from 32 unsigned nibble values.
pub(crate) fn nibbles_to_qs(values: &[u8; TILE_K]) -> [u8; TILE_K / 2] {
    std::array::from_fn(|j| (values[j] & 0x0F) | (values[j + TILE_K / 2] << 4))
}

fn check(dtype: DType, k: usize, n: usize) -> Result<usize, PackError> {
    let tile = tile_bytes(dtype).ok_or(PackError::Unsupported(dtype))?;
    if k == 0 || n == 0 || k % TILE_K != 0 || n % TILE_N != 0 {
        return Err(PackError::Misaligned { k, n });
    }
    Ok(tile)
}

fn expect_len(what: &'static str, expected: usize, actual: usize) -> Result<(), PackError> {
    if expected == actual {
        Ok(())
    } else {
        Err(PackError::SizeMismatch {
            what,
            expected,
            actual,
        })
    }
}

fn pack_all<L: PackedTile>(src: &[u8], dst: &mut [u8], k: usize, n: usize) {
    let block = std::mem::size_of::<L::Block>();
    let kb_count = k / TILE_K;
    let row_bytes = kb_count * block;
    for nb in 0..n / TILE_N {
        for kb in 0..kb_count {
            let rows: [L::Block; TILE_N] = std::array::from_fn(|r| {
                let at = (nb * TILE_N + r) * row_bytes + kb * block;
                bytemuck::pod_read_unaligned(&src[at..at + block])
            });
            let at = (nb * kb_count + kb) * L::TILE_BYTES;
            L::pack(&rows, &mut dst[at..at + L::TILE_BYTES]);
        }
    }
}

fn unpack_all<L: PackedTile>(packed: &[u8], k: usize, n: usize) -> Vec<u8> {
    let block = std::mem::size_of::<L::Block>();
    let kb_count = k / TILE_K;
    let row_bytes = kb_count * block;
    let mut out = vec![0u8; n * row_bytes];
    for nb in 0..n / TILE_N {
        for kb in 0..kb_count {
            let rows = L::unpack(tile(packed, L::TILE_BYTES, kb_count, nb, kb));
            for (r, b) in rows.iter().enumerate() {
                let at = (nb * TILE_N + r) * row_bytes + kb * block;
                out[at..at + block].copy_from_slice(bytemuck::bytes_of(b));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tensor_core::quant::quantize_row;
    use tensor_core::Shape;

    fn weights(dtype: DType, n: usize, k: usize) -> Vec<u8> {
        (0..n)
            .flat_map(|r| {
                let row: Vec<f32> = (0..k).map(|c| ((r * 31 + c * 7) % 23) as f32 - 11.0).collect();
                quantize_row(dtype, &row).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_packed_sizes() {
        assert_eq!(packed_size(DType::Q4_0, 1), Some(288));
        assert_eq!(packed_size(DType::Q4_1, 2), Some(640));
        assert_eq!(packed_size(DType::Q8_0, 3), Some(1824));
        assert_eq!(packed_size(DType::F16, 1), None);
        assert_eq!(packed_tensor_size(DType::Q4_0, 64, 32).unwrap(), 4 * 288);
    }

    #[test]
    fn test_unpack_inverts_pack() {
        for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
            let (n, k) = (32, 96);
            let src = weights(dtype, n, k);
            let mut dst = vec![0u8; packed_tensor_size(dtype, k, n).unwrap()];
            pack_weights(dtype, &src, &mut dst, k, n).unwrap();
            assert_eq!(unpack_weights(dtype, &dst, k, n).unwrap(), src, "{dtype}");
        }
    }

    #[test]
    fn test_tile_order_is_n_major() {
        let (n, k) = (32, 64);
        let src = weights(DType::Q8_0, n, k);
        let mut dst = vec![0u8; packed_tensor_size(DType::Q8_0, k, n).unwrap()];
        pack_weights(DType::Q8_0, &src, &mut dst, k, n).unwrap();
        // Tile (1, 1) holds row 16, block 1 in its first output lane.
        let t = tile(&dst, 608, 2, 1, 1);
        let row16_block1 = &src[16 * 68 + 34..16 * 68 + 68];
        assert_eq!(&t[..4], &row16_block1[2..6]);
    }

    #[test]
    fn test_rejects_off_by_one() {
        let mut dst = vec![0u8; 4096];
        for (k, n) in [(31, 16), (33, 16), (32, 15), (32, 17)] {
            let err = pack_weights(DType::Q8_0, &[0; 34], &mut dst, k, n).unwrap_err();
            assert!(matches!(err, PackError::Misaligned { .. }), "{k}x{n}");
        }
        assert!(dst.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_rejects_unpackable_kinds() {
        let mut dst = [0u8; 64];
        assert_eq!(
            pack_weights(DType::F16, &[0; 1024], &mut dst, 32, 16),
            Err(PackError::Unsupported(DType::F16))
        );
    }

    #[test]
    fn test_rejects_wrong_lengths() {
        let src = weights(DType::Q4_0, 16, 32);
        let mut short = vec![0u8; 287];
        assert!(matches!(
            pack_weights(DType::Q4_0, &src, &mut short, 32, 16),
            Err(PackError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_is_packable() {
        let ok = Tensor::new("w", DType::Q4_0, Shape::matrix(32, 64)).unwrap();
        assert!(is_packable(&ok));
        let rows = Tensor::new("w", DType::Q4_0, Shape::matrix(40, 64)).unwrap();
        assert!(!is_packable(&rows));
        let float = Tensor::new("w", DType::F16, Shape::matrix(32, 64)).unwrap();
        assert!(!is_packable(&float));
    }
}
