// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! A 16-lane model of the vector INT8 dot-product instruction.

use crate::pack::vnni::VNNI_ROW;
use crate::tile::{TILE_N, VNNI_BLK};

/// `acc[n] += Σ_i a[4n + i] · b[4n + i]`, `a` unsigned and `b` signed.
pub fn dpbusd(acc: &mut [i32; TILE_N], a: &[u8], b: &[i8]) {
    for (n, lane) in acc.iter_mut().enumerate() {
        let at = n * VNNI_BLK;
        let sum: i32 = a[at..at + VNNI_BLK]
            .iter()
            .zip(&b[at..at + VNNI_BLK])
            .map(|(&x, &y)| x as i32 * y as i32)
            .sum();
        *lane = lane.wrapping_add(sum);
    }
}

/// Repeats a four-element group across every lane.
pub fn broadcast<T: Copy>(quad: &[T]) -> [T; VNNI_ROW] {
    std::array::from_fn(|i| quad[i % VNNI_BLK])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpbusd_lanes() {
        let a: [u8; 64] = std::array::from_fn(|i| (i / 4) as u8);
        let b = broadcast(&[1i8, -1, 2, 0]);
        let mut acc = [10; 16];
        dpbusd(&mut acc, &a, &b);
        for (n, v) in acc.iter().enumerate() {
            assert_eq!(*v, 10 + 2 * n as i32);
        }
    }

    #[test]
    fn test_unsigned_operand_range() {
        let mut acc = [0; 16];
        dpbusd(&mut acc, &[255; 64], &[-128; 64]);
        assert_eq!(acc[0], 4 * 255 * -128);
    }
}
