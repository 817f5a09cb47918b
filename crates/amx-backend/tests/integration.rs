// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT


//! Integration tests for the tile backend: packing, kernels, buffers,
//! mirroring and dispatch, exercised through the public API.

use amx_backend::kernels::{self, Activations, KernelArgs, KernelKey};
use amx_backend::mirror;
use amx_backend::pack::{self, q8_0};
use amx_backend::tile::{TileConfig, TileContext, TileUnit, TILE_N};
use amx_backend::{AmxBufferType, BackendConfig, BackendError, PackError};
use half::f16;
use hw_probe::StaticEntitlement;
use memory_manager::NumaStrategy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tensor_core::backend::{
    alloc_tensors, cpu_buffer_type, Buffer, BufferType, BufferUsage, ExtraBufferType,
    HostBufferType, TensorTraits,
};
use tensor_core::ops::mul_mat_reference;
use tensor_core::quant::{blocks_as_bytes, quantize_row, BlockQ4_0, BlockQ4_1, BlockQ8_0, QK};
use tensor_core::{DType, Shape, Tensor, ThreadedExecutor};

// ── Helpers ────────────────────────────────────────────────────

fn enabled() -> BackendConfig {
    BackendConfig {
        enabled: true,
        ..BackendConfig::default()
    }
}

fn mirrored(nodes: &[u32]) -> BackendConfig {
    BackendConfig {
        numa_strategy: NumaStrategy::Mirror,
        mirror_nodes: Some(nodes.to_vec()),
        ..enabled()
    }
}

fn amx(config: BackendConfig) -> &'static AmxBufferType {
    Box::leak(Box::new(
        AmxBufferType::new(&config, &StaticEntitlement(true)).unwrap(),
    ))
}

/// `n × k` weights in generic block layout, deterministic.
fn weight_bytes(dtype: DType, n: usize, k: usize) -> Vec<u8> {
    (0..n)
        .flat_map(|r| {
            let row: Vec<f32> = (0..k)
                .map(|c| (((r * 7 + c * 3) % 17) as f32 - 8.0) * 0.25)
                .collect();
            quantize_row(dtype, &row).unwrap()
        })
        .collect()
}

fn activations(m: usize, k: usize) -> Vec<f32> {
    (0..m * k).map(|i| ((i * 5) % 13) as f32 * 0.125 - 0.75).collect()
}

/// A weight tensor in `buft`, filled with `data`.
fn placed_weight(
    buft: &'static dyn BufferType,
    dtype: DType,
    n: usize,
    k: usize,
    data: &[u8],
    usage: BufferUsage,
) -> (Arc<Tensor>, Arc<Buffer>) {
    let mut w = Tensor::new("w", dtype, Shape::matrix(n, k)).unwrap();
    let buffer = alloc_tensors(buft, &mut [&mut w]).unwrap();
    buffer.set_usage(usage).unwrap();
    w.set_data(data).unwrap();
    (Arc::new(w), buffer)
}

fn host_tensor(name: &str, dtype: DType, shape: Shape) -> Tensor {
    let mut t = Tensor::new(name, dtype, shape).unwrap();
    alloc_tensors(cpu_buffer_type(), &mut [&mut t]).unwrap();
    t
}

fn matmul_op(w: &Arc<Tensor>, m: usize, x: &[f32]) -> Tensor {
    let k = w.shape().cols();
    let act = host_tensor("x", DType::F32, Shape::matrix(m, k));
    act.set_f32(x).unwrap();
    let mut y = Tensor::mul_mat("y", Arc::clone(w), Arc::new(act)).unwrap();
    alloc_tensors(cpu_buffer_type(), &mut [&mut y]).unwrap();
    y
}

fn assert_close(got: &[f32], want: &[f32], rel: f32) {
    assert_eq!(got.len(), want.len());
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!(
            (g - w).abs() <= rel * w.abs().max(1.0),
            "element {i}: {g} vs {w}"
        );
    }
}

/// Counts configuration loads; every instruction is a no-op.
struct CountingUnit(Arc<AtomicUsize>);

impl TileUnit for CountingUnit {
    fn load_config(&mut self, _config: &TileConfig) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    fn release(&mut self) {}
    fn zero(&mut self, _t: usize) {}
    fn load(&mut self, _t: usize, _src: &[u8], _stride: usize) {}
    fn store(&self, _t: usize, _dst: &mut [u8], _stride: usize) {}
    fn dpbssd(&mut self, _c: usize, _a: usize, _b: usize) {}
    fn dpbsud(&mut self, _c: usize, _a: usize, _b: usize) {}
    fn dpbusd(&mut self, _c: usize, _a: usize, _b: usize) {}
    fn dpbuud(&mut self, _c: usize, _a: usize, _b: usize) {}
    fn dpbf16ps(&mut self, _c: usize, _a: usize, _b: usize) {}
}

/// Host memory the CPU cannot address, as far as dispatch is concerned.
#[derive(Debug)]
struct DeviceBufferType(HostBufferType);

impl BufferType for DeviceBufferType {
    fn name(&self) -> &'static str {
        "DEVICE"
    }
    fn alloc(&'static self, size: usize) -> Result<Buffer, tensor_core::TensorError> {
        Ok(self.0.alloc(size)?.with_buffer_type(self))
    }
    fn alignment(&self) -> usize {
        self.0.alignment()
    }
    fn is_host(&self) -> bool {
        false
    }
}

// ── Literal scenarios ──────────────────────────────────────────

const LITERAL_K: usize = 256;

/// One row of `LITERAL_K` weights with scale 1 and quantized magnitude 1.
fn literal_row(dtype: DType) -> Vec<u8> {
    let blocks = LITERAL_K / QK;
    match dtype {
        DType::Q4_0 => blocks_as_bytes(&vec![
            BlockQ4_0 { d: f16::ONE, qs: [0x99; QK / 2] };
            blocks
        ])
        .to_vec(),
        DType::Q4_1 => blocks_as_bytes(&vec![
            BlockQ4_1 { d: f16::ONE, m: f16::ZERO, qs: [0x11; QK / 2] };
            blocks
        ])
        .to_vec(),
        DType::Q8_0 => blocks_as_bytes(&vec![BlockQ8_0 { d: f16::ONE, qs: [1; QK] }; blocks]).to_vec(),
        _ => unreachable!(),
    }
}

fn literal_kernel(dtype: DType, m: usize) {
    let n = TILE_N;
    let w: Vec<u8> = (0..n).flat_map(|_| literal_row(dtype)).collect();
    let mut packed = vec![0u8; pack::packed_tensor_size(dtype, LITERAL_K, n).unwrap()];
    pack::pack_weights(dtype, &w, &mut packed, LITERAL_K, n).unwrap();

    let act = vec![BlockQ8_0 { d: f16::ONE, qs: [2; QK] }; m * LITERAL_K / QK];
    let kernel = kernels::lookup(KernelKey::for_op(m, dtype)).unwrap();
    let args = KernelArgs {
        weight: &packed,
        act: Activations::Q8_0(&act),
        m,
        k: LITERAL_K,
        tiles: 0..1,
    };
    let mut ctx = TileContext::emulated();
    let mut out = vec![0.0f32; m * n];
    kernel(&mut ctx, &args, &mut out);
    assert!(out.iter().all(|&v| v == 512.0), "{dtype} m={m}: {out:?}");
}

#[test]
fn test_literal_512_gemv() {
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        literal_kernel(dtype, 1);
    }
}

#[test]
fn test_literal_512_gemm() {
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        literal_kernel(dtype, 20);
    }
}

#[test]
fn test_literal_512_through_dispatcher() {
    let buft = amx(enabled());
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        let n = 2 * TILE_N;
        let w: Vec<u8> = (0..n).flat_map(|_| literal_row(dtype)).collect();
        let (weight, _buffer) = placed_weight(buft, dtype, n, LITERAL_K, &w, BufferUsage::Weights);
        let y = matmul_op(&weight, 1, &vec![2.0; LITERAL_K]);
        assert!(buft.supports_op(&y));

        ThreadedExecutor::new(2).compute(&y).unwrap();
        for v in y.to_f32_vec().unwrap() {
            assert!((v - 512.0).abs() < 0.5, "{dtype}: {v}");
        }
    }
}

// ── Packing boundaries ─────────────────────────────────────────

#[test]
fn test_compensation_boundaries() {
    let k = 32;
    for (byte, expected) in [(0x00u8, 0), (0xFF, -4096)] {
        let w: Vec<u8> = (0..TILE_N)
            .flat_map(|_| {
                let block = BlockQ8_0 { d: f16::ONE, qs: [byte as i8; QK] };
                blocks_as_bytes(&[block]).to_vec()
            })
            .collect();
        let mut packed = vec![0u8; pack::packed_tensor_size(DType::Q8_0, k, TILE_N).unwrap()];
        pack::pack_weights(DType::Q8_0, &w, &mut packed, k, TILE_N).unwrap();
        assert_eq!(q8_0::compensation_terms(&packed), [expected; TILE_N]);
    }
}

#[test]
fn test_off_by_one_dimensions_rejected() {
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        assert!(pack::packed_tensor_size(dtype, 64, 32).is_ok());
        for (k, n) in [(63, 32), (65, 32), (64, 31), (64, 33)] {
            let mut dst = vec![0xAAu8; 4096];
            let err = pack::pack_weights(dtype, &[], &mut dst, k, n).unwrap_err();
            assert_eq!(err, PackError::Misaligned { k, n });
            assert!(dst.iter().all(|&b| b == 0xAA), "{dtype} wrote on failure");
        }
    }
}

#[test]
fn test_unsupported_kind_is_not_packable() {
    assert_eq!(pack::tile_bytes(DType::F16), None);
    assert!(!pack::can_pack(DType::F32, 64, 32));
    assert!(matches!(
        pack::packed_tensor_size(DType::BF16, 64, 32),
        Err(PackError::Unsupported(DType::BF16))
    ));
}

// ── Tile configuration ─────────────────────────────────────────

#[test]
fn test_reload_idempotence() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut ctx = TileContext::new(Box::new(CountingUnit(Arc::clone(&loads))));
    ctx.ensure_configured(&TileConfig::int8());
    ctx.ensure_configured(&TileConfig::int8());
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    ctx.ensure_configured(&TileConfig::bf16());
    ctx.ensure_configured(&TileConfig::bf16());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(ctx.reload_count(), 2);
}

#[test]
fn test_worker_keeps_its_configuration_across_calls() {
    let buft = amx(enabled());
    let (n, k, m) = (64, 128, 8);
    let w = weight_bytes(DType::Q4_0, n, k);
    let (weight, _buffer) = placed_weight(buft, DType::Q4_0, n, k, &w, BufferUsage::Weights);
    let y = matmul_op(&weight, m, &activations(m, k));

    let mut exec = ThreadedExecutor::new(1);
    exec.compute(&y).unwrap();
    exec.compute(&y).unwrap();
    let ctx = exec.worker(0).unwrap().get::<TileContext>().unwrap();
    assert_eq!(ctx.reload_count(), 1);
}

// ── Buffers ────────────────────────────────────────────────────

#[test]
fn test_disabled_config_has_no_buffer_type() {
    let err = AmxBufferType::new(&BackendConfig::default(), &StaticEntitlement(true)).unwrap_err();
    assert!(matches!(err, BackendError::Unavailable(_)));
}

#[test]
fn test_packed_tensor_reads_back_in_generic_layout() {
    let buft = amx(enabled());
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        let (n, k) = (32, 96);
        let w = weight_bytes(dtype, n, k);
        let (weight, buffer) = placed_weight(buft, dtype, n, k, &w, BufferUsage::Weights);
        assert_eq!(weight.region_size(), buft.alloc_size(&weight));
        assert_eq!(weight.data().unwrap(), w);
        assert!(buffer.get_tensor(&weight, 0, 10).is_err());
        assert!(buffer.set_tensor(&weight, &w[..34], 0).is_err());
    }
}

#[test]
fn test_float_weights_are_stored_raw() {
    let buft = amx(enabled());
    let values: Vec<f16> = (0..32 * 64).map(|i| f16::from_f32((i % 9) as f32 - 4.0)).collect();
    let bytes = bytemuck::cast_slice::<f16, u8>(&values).to_vec();
    let (weight, buffer) = placed_weight(buft, DType::F16, 32, 64, &bytes, BufferUsage::Weights);
    assert_eq!(weight.region_size(), weight.nbytes());
    assert_eq!(buffer.get_tensor(&weight, 8, 8).unwrap(), &bytes[8..16]);
    assert!(weight.extra().is_some());
}

/// Plain host buffers that happen to report the tile buffer name.
#[derive(Debug)]
struct SameNameBufferType(HostBufferType);

impl BufferType for SameNameBufferType {
    fn name(&self) -> &'static str {
        amx_backend::AMX_BUFFER_NAME
    }
    fn alloc(&'static self, size: usize) -> Result<Buffer, tensor_core::TensorError> {
        Ok(self.0.alloc(size)?.with_buffer_type(self))
    }
    fn alignment(&self) -> usize {
        self.0.alignment()
    }
    fn is_host(&self) -> bool {
        true
    }
}

#[test]
fn test_tile_buffers_recognised_by_interface_not_name() {
    let buft: &'static SameNameBufferType =
        Box::leak(Box::new(SameNameBufferType(HostBufferType::new(32).unwrap())));
    let (n, k, m) = (32, 64, 2);
    let w = weight_bytes(DType::Q8_0, n, k);
    let mut t = Tensor::new("w", DType::Q8_0, Shape::matrix(n, k)).unwrap();
    let buffer = alloc_tensors(buft, &mut [&mut t]).unwrap();
    assert_eq!(buffer.buffer_type().name(), amx_backend::AMX_BUFFER_NAME);
    t.set_data(&w).unwrap();
    t.set_extra(Some(amx_backend::tensor_traits()));
    let weight = Arc::new(t);

    // Raw bytes, not unpacked as tiles.
    let contents = mirror::replica_contents(&buffer, &weight).unwrap();
    assert_eq!(contents, vec![(None, w.clone())]);

    let x = activations(m, k);
    let y = matmul_op(&weight, m, &x);
    assert_eq!(amx_backend::tensor_traits().get().work_size(2, &y), None);
    ThreadedExecutor::new(2).compute(&y).unwrap();
    let want = mul_mat_reference(DType::Q8_0, &w, &x, k).unwrap();
    assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
}

// ── Mirror replication ─────────────────────────────────────────

#[test]
fn test_mirror_replicas_hold_identical_packed_copies() {
    let buft = amx(mirrored(&[0, 1, 2]));
    assert!(buft.is_mirrored());
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        let w = weight_bytes(dtype, 32, 64);
        let (weight, buffer) = placed_weight(buft, dtype, 32, 64, &w, BufferUsage::Weights);
        let contents = mirror::replica_contents(&buffer, &weight).unwrap();
        let nodes: Vec<_> = contents.iter().map(|(node, _)| *node).collect();
        assert_eq!(nodes, [Some(0), Some(1), Some(2)]);
        for (node, data) in contents {
            assert_eq!(data, w, "{dtype} replica on node {node:?}");
        }
    }
}

#[test]
fn test_mutable_mirror_writes_once() {
    let buft = amx(mirrored(&[0, 1]));
    let w = weight_bytes(DType::Q8_0, 32, 64);
    let (weight, buffer) = placed_weight(buft, DType::Q8_0, 32, 64, &w, BufferUsage::Compute);

    let contents = mirror::replica_contents(&buffer, &weight).unwrap();
    assert_eq!(contents[0].1, w);
    assert_ne!(contents[1].1, w);

    let copies = mirror::replicate(&buffer, &weight, 0, 4, |dst| {
        dst.fill(1);
        Ok(())
    })
    .unwrap();
    assert_eq!(copies, 1);
}

#[test]
fn test_workers_read_their_local_replica() {
    let buft = amx(mirrored(&[0, 1]));
    let (n, k, m) = (64, 64, 3);
    let w = weight_bytes(DType::Q4_1, n, k);
    let (weight, _buffer) = placed_weight(buft, DType::Q4_1, n, k, &w, BufferUsage::Weights);
    let x = activations(m, k);
    let y = matmul_op(&weight, m, &x);

    ThreadedExecutor::new(4).with_numa_nodes(&[0, 1]).compute(&y).unwrap();
    let want = mul_mat_reference(DType::Q4_1, &w, &x, k).unwrap();
    assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
}

#[test]
fn test_unmarked_mirror_computes_from_primary() {
    let buft = amx(mirrored(&[0, 1]));
    let (n, k, m) = (64, 64, 2);
    let w = weight_bytes(DType::Q4_0, n, k);
    let (weight, buffer) = placed_weight(buft, DType::Q4_0, n, k, &w, BufferUsage::Any);
    assert!(!buffer.read_storage().unwrap().mirror().unwrap().should_replicate());
    let x = activations(m, k);
    let y = matmul_op(&weight, m, &x);

    ThreadedExecutor::new(2).with_numa_nodes(&[0, 1]).compute(&y).unwrap();
    let want = mul_mat_reference(DType::Q4_0, &w, &x, k).unwrap();
    assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
}

#[test]
fn test_weights_marked_after_load_reach_every_replica() {
    let buft = amx(mirrored(&[0, 1]));
    let (n, k, m) = (64, 64, 2);
    let w = weight_bytes(DType::Q4_0, n, k);
    let mut t = Tensor::new("w", DType::Q4_0, Shape::matrix(n, k)).unwrap();
    let buffer = alloc_tensors(buft, &mut [&mut t]).unwrap();
    t.set_data(&w).unwrap();
    buffer.set_usage(BufferUsage::Weights).unwrap();
    let weight = Arc::new(t);

    for (node, data) in mirror::replica_contents(&buffer, &weight).unwrap() {
        assert_eq!(data, w, "replica on node {node:?}");
    }

    let x = activations(m, k);
    let y = matmul_op(&weight, m, &x);
    ThreadedExecutor::new(2).with_numa_nodes(&[0, 1]).compute(&y).unwrap();
    let want = mul_mat_reference(DType::Q4_0, &w, &x, k).unwrap();
    assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
}

// ── Capability queries ─────────────────────────────────────────

#[test]
fn test_supports_op_accepts_tile_multiples() {
    let buft = amx(enabled());
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0, DType::F16, DType::BF16] {
        let (weight, _buffer) = {
            let mut w = Tensor::new("w", dtype, Shape::matrix(64, 64)).unwrap();
            let buffer = alloc_tensors(buft, &mut [&mut w]).unwrap();
            (Arc::new(w), buffer)
        };
        let y = matmul_op(&weight, 2, &activations(2, 64));
        assert!(buft.supports_op(&y), "{dtype}");
        assert!(buft.get_tensor_traits(&y).is_some());
    }
}

#[test]
fn test_supports_op_fallbacks() {
    let buft = amx(enabled());

    // N = 48 is a multiple of 16 but not of 32.
    let w48 = weight_bytes(DType::Q4_0, 48, 64);
    let (weight, _b) = placed_weight(buft, DType::Q4_0, 48, 64, &w48, BufferUsage::Weights);
    let y = matmul_op(&weight, 1, &activations(1, 64));
    assert!(!buft.supports_op(&y));

    let w = weight_bytes(DType::Q4_0, 32, 64);
    let (weight, _b) = placed_weight(buft, DType::Q4_0, 32, 64, &w, BufferUsage::Weights);

    // Half-precision activations.
    let act16 = Arc::new(host_tensor("x16", DType::F16, Shape::matrix(1, 64)));
    let y = Tensor::mul_mat("y", Arc::clone(&weight), act16).unwrap();
    assert!(!buft.supports_op(&y));

    // Activations the CPU cannot address.
    let device: &'static DeviceBufferType =
        Box::leak(Box::new(DeviceBufferType(HostBufferType::new(32).unwrap())));
    let mut remote = Tensor::new("xd", DType::F32, Shape::matrix(1, 64)).unwrap();
    alloc_tensors(device, &mut [&mut remote]).unwrap();
    let y = Tensor::mul_mat("y", Arc::clone(&weight), Arc::new(remote)).unwrap();
    assert!(!buft.supports_op(&y));

    // Non-contiguous activations.
    let xt = host_tensor("xt", DType::F32, Shape::matrix(64, 2)).transposed();
    let y = Tensor::mul_mat("y", Arc::clone(&weight), Arc::new(xt)).unwrap();
    assert!(!buft.supports_op(&y));

    // Weights outside the tile buffer.
    let (host_weight, _b) = placed_weight(cpu_buffer_type(), DType::Q4_0, 32, 64, &w, BufferUsage::Weights);
    let y = matmul_op(&host_weight, 1, &activations(1, 64));
    assert!(!buft.supports_op(&y));
    assert!(buft.get_tensor_traits(&y).is_none());
}

#[test]
fn test_declined_op_still_computes_correctly() {
    let buft = amx(enabled());
    let (n, k, m) = (48, 64, 2);
    let w = weight_bytes(DType::Q8_0, n, k);
    let (weight, _buffer) = placed_weight(buft, DType::Q8_0, n, k, &w, BufferUsage::Weights);
    let x = activations(m, k);
    let y = matmul_op(&weight, m, &x);
    assert!(!buft.supports_op(&y));

    let mut exec = ThreadedExecutor::new(2);
    exec.compute(&y).unwrap();
    assert!(exec.worker(0).unwrap().get::<TileContext>().is_none());
    let want = mul_mat_reference(DType::Q8_0, &w, &x, k).unwrap();
    assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
}

// ── End to end ─────────────────────────────────────────────────

#[test]
fn test_quantized_matmul_matches_reference() {
    let buft = amx(enabled());
    for dtype in [DType::Q4_0, DType::Q4_1, DType::Q8_0] {
        for m in [1, 4, 5, 19] {
            let (n, k) = (96, 128);
            let w = weight_bytes(dtype, n, k);
            let (weight, _buffer) = placed_weight(buft, dtype, n, k, &w, BufferUsage::Weights);
            let x = activations(m, k);
            let y = matmul_op(&weight, m, &x);

            let mut exec = ThreadedExecutor::new(3);
            exec.compute(&y).unwrap();
            assert!(exec.worker(0).unwrap().get::<TileContext>().is_some());

            let want = mul_mat_reference(dtype, &w, &x, k).unwrap();
            assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
        }
    }
}

#[test]
fn test_float_matmul_matches_reference() {
    let buft = amx(enabled());
    let (n, k) = (32, 80);
    let values: Vec<f32> = (0..n * k).map(|i| ((i * 3) % 11) as f32 * 0.25 - 1.25).collect();
    for dtype in [DType::F16, DType::BF16] {
        let w = quantize_row(dtype, &values).unwrap();
        let (weight, _buffer) = placed_weight(buft, dtype, n, k, &w, BufferUsage::Weights);
        for m in [2, 17] {
            let x = activations(m, k);
            let y = matmul_op(&weight, m, &x);
            ThreadedExecutor::new(2).compute(&y).unwrap();
            let want = mul_mat_reference(dtype, &w, &x, k).unwrap();
            assert_close(&y.to_f32_vec().unwrap(), &want, 1e-4);
        }
    }
}
