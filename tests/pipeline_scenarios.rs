// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Whole-unit behaviour of the residual pipeline, observed through a
// transform which records how it is called

use std::cell::{Cell, RefCell};

use proptest::prelude::*;

use tinyresid::block::{ModeInfo, TxBlock};
use tinyresid::consts::{MAX_4X4_CONTEXTS, MAX_MIB_SIZE};
use tinyresid::costs::CoeffCosts;
use tinyresid::enums::*;
use tinyresid::recon::EdgePredictor;
use tinyresid::txfm::{FwdTxfmParam, InvTxfmParam, ReferenceTransform, Transform};
use tinyresid::*;

#[derive(Default)]
struct CountingTransform {
  inner: ReferenceTransform,
  forward_sizes: RefCell<Vec<TxSize>>,
  inverse_calls: Cell<usize>,
}

impl Transform for CountingTransform {
  fn forward(&self, src_diff: &[i16], stride: usize, coeff: &mut [i32], param: &FwdTxfmParam) {
    self.forward_sizes.borrow_mut().push(param.tx_size);
    self.inner.forward(src_diff, stride, coeff, param);
  }

  fn inverse(&self, dqcoeff: &[i32], residual: &mut [i32], param: &InvTxfmParam) {
    self.inverse_calls.set(self.inverse_calls.get() + 1);
    self.inner.inverse(dqcoeff, residual, param);
  }
}

fn counting_encoder(config: EncoderConfig) -> Encoder<CountingTransform> {
  Encoder::with_parts(config, CountingTransform::default(), CoeffCosts::default_model()).unwrap()
}

// Frame with `inside` over the visible area and `outside` in the padding
fn padded_frame(h: usize, w: usize, inside: u8, outside: u8) -> Frame<u8> {
  let mut frame = Frame::<u8>::new(h, w, 8);
  for plane in 0..MAX_MB_PLANE {
    let p = frame.plane_mut(plane);
    let crop_h = p.crop_height();
    let crop_w = p.crop_width();
    p.pixels_mut().fill_with(|i, j| if i < crop_h && j < crop_w { inside } else { outside });
  }
  frame
}

fn textured_frame(h: usize, w: usize) -> Frame<u8> {
  let mut frame = Frame::<u8>::new(h, w, 8);
  for plane in 0..MAX_MB_PLANE {
    let salt = 17 * plane;
    frame.plane_mut(plane).pixels_mut().fill_with(|i, j| ((i * 29 + j * 13 + salt + (i * j) % 7) % 256) as u8);
  }
  frame
}

fn inter_unit(bsize: BlockSize, inter_tx_size: TxSize) -> ModeInfo {
  let mut mi = ModeInfo::new(bsize, bsize.max_tx_size());
  mi.is_inter = true;
  mi.inter_tx_size = [[inter_tx_size; MAX_MIB_SIZE]; MAX_MIB_SIZE];
  mi
}

#[test]
fn zero_residual_4x4_reproduces_prediction() {
  let mut encoder = counting_encoder(EncoderConfig::default());
  let src = textured_frame(64, 64);
  let mut dst = textured_frame(64, 64);
  let mut mb = Macroblock::new(&encoder.config);
  let mut mi = ModeInfo::new(BlockSize::BLOCK_4X4, TxSize::TX_4X4);
  mi.is_inter = true;
  mb.set_position(8, 8, mi, 64, 64);

  encoder.encode_sb(&mut mb, &src, &mut dst);

  assert!(mb.mi.skip);
  assert_eq!(mb.planes[0].eobs[0], 0);
  assert_eq!(*encoder.transform().forward_sizes.borrow(), vec![TxSize::TX_4X4; 3]);
  assert_eq!(encoder.transform().inverse_calls.get(), 0);
  for plane in 0..MAX_MB_PLANE {
    assert_eq!(dst.plane(plane).sse(src.plane(plane)), 0);
  }
}

#[test]
fn var_tx_skips_quadrants_outside_frame() {
  let config = EncoderConfig { tx_size_selection: TxSizeSelection::Variable, ..Default::default() };

  // Interior unit: every 8x8 block of every plane is coded
  let mut encoder = counting_encoder(config.clone());
  let src = padded_frame(64, 64, 100, 100);
  let mut dst = padded_frame(64, 64, 100, 100);
  let mut mb = Macroblock::new(&encoder.config);
  mb.set_position(0, 0, inter_unit(BlockSize::BLOCK_32X32, TxSize::TX_8X8), 64, 64);
  encoder.encode_sb(&mut mb, &src, &mut dst);
  assert_eq!(encoder.transform().forward_sizes.borrow().len(), 16 + 4 + 4);

  // A 48x48 frame leaves only the top-left quadrant of a unit at (32, 32)
  // visible. The padding differs from the prediction, but is never coded.
  let mut encoder = counting_encoder(config);
  let src = padded_frame(48, 48, 100, 250);
  let mut dst = padded_frame(48, 48, 100, 100);
  let mut mb = Macroblock::new(&encoder.config);
  mb.set_position(32, 32, inter_unit(BlockSize::BLOCK_32X32, TxSize::TX_8X8), 48, 48);
  encoder.encode_sb(&mut mb, &src, &mut dst);

  let sizes = encoder.transform().forward_sizes.borrow();
  assert_eq!(sizes.len(), 4 + 1 + 1);
  assert!(sizes.iter().all(|&t| t == TxSize::TX_8X8));
  assert_eq!(encoder.transform().inverse_calls.get(), 0);
  assert!(mb.mi.skip);
  assert!(mb.planes[0].above_context.iter().all(|&c| c == 0));
  assert_eq!(dst.y().pixels()[60][60], 100);
}

#[test]
fn var_tx_respects_block_skip_flags() {
  let config = EncoderConfig { tx_size_selection: TxSizeSelection::Variable, ..Default::default() };
  let mut encoder = counting_encoder(config);
  let src = padded_frame(64, 64, 180, 180);
  let mut dst = padded_frame(64, 64, 60, 60);
  let mut mb = Macroblock::new(&encoder.config);
  mb.set_position(16, 16, inter_unit(BlockSize::BLOCK_16X16, TxSize::TX_8X8), 64, 64);
  // Top-left 8x8 luma block was already found to have no residual worth coding
  mb.planes[0].blk_skip[0] = true;
  encoder.encode_sb(&mut mb, &src, &mut dst);

  assert_eq!(encoder.transform().forward_sizes.borrow().len(), 3 + 1 + 1);
  assert_eq!(mb.planes[0].eobs[0], 0);
  assert!(!mb.mi.skip);
  // The coded blocks below and to the right overwrite the skipped block's flags
  assert_eq!(&mb.planes[0].above_context[..4], &[1, 1, 1, 1]);
  assert_eq!(&mb.planes[0].left_context[..4], &[1, 1, 1, 1]);
  assert_eq!(dst.y().pixels()[16][16], 60);
  assert!((dst.y().pixels()[16][28] as i32 - 180).abs() <= 4);
}

#[test]
fn skipped_unit_clears_its_contexts() {
  let mut encoder = counting_encoder(EncoderConfig::default());
  let src = padded_frame(64, 64, 180, 180);
  let mut dst = padded_frame(64, 64, 60, 60);
  let mut contexts = FrameContexts::new(16);
  let mut mb = Macroblock::new(&encoder.config);
  mb.set_position(16, 16, inter_unit(BlockSize::BLOCK_16X16, TxSize::TX_8X8), 64, 64);
  for plane in 0..MAX_MB_PLANE {
    // Neighbours on both sides coded coefficients
    contexts.store(plane, 4 >> plane.min(1), 4 >> plane.min(1), 4 >> plane.min(1),
                   &[1; MAX_4X4_CONTEXTS], &[1; MAX_4X4_CONTEXTS]);
    let p = &mut mb.planes[plane];
    p.above_context = [1; MAX_4X4_CONTEXTS];
    p.left_context = [1; MAX_4X4_CONTEXTS];
  }
  mb.skip = true;

  encoder.encode_sb(&mut mb, &src, &mut dst);

  assert!(mb.mi.skip);
  assert!(encoder.transform().forward_sizes.borrow().is_empty());
  assert_eq!(dst.y().pixels()[20][20], 60);
  for plane in 0..MAX_MB_PLANE {
    let p = &mb.planes[plane];
    assert_eq!(p.above_context, [0; MAX_4X4_CONTEXTS]);
    assert_eq!(p.left_context, [0; MAX_4X4_CONTEXTS]);

    // The unit below and the unit to the right see no coefficients
    let (col4, row4, n) = (4 >> plane.min(1), 4 >> plane.min(1), 4 >> plane.min(1));
    contexts.store(plane, col4, row4, n, &p.above_context, &p.left_context);
    let mut above = [1; MAX_4X4_CONTEXTS];
    let mut left = [1; MAX_4X4_CONTEXTS];
    contexts.load(plane, col4, row4, n, &mut above, &mut left);
    assert!(above.iter().chain(left.iter()).all(|&c| c == 0));
  }
}

#[test]
fn var_tx_stops_splitting_at_4x4() {
  let config = EncoderConfig { tx_size_selection: TxSizeSelection::Variable, ..Default::default() };
  let mut encoder = counting_encoder(config);
  let src = padded_frame(64, 64, 180, 180);
  let mut dst = padded_frame(64, 64, 60, 60);
  let mut mi = inter_unit(BlockSize::BLOCK_32X32, TxSize::TX_8X8);
  // An 8x8 area asking for a larger size than its parent block gets
  mi.inter_tx_size[0][1] = TxSize::TX_16X16;
  let mut mb = Macroblock::new(&encoder.config);
  mb.set_position(0, 0, mi, 64, 64);

  encoder.encode_sb(&mut mb, &src, &mut dst);

  // Luma: 15 8x8 blocks and four 4x4 blocks in place of the odd one out;
  // each chroma plane: four 8x8 blocks
  let sizes = encoder.transform().forward_sizes.borrow();
  assert_eq!(sizes.len(), 19 + 4 + 4);
  assert_eq!(sizes.iter().filter(|&&t| t == TxSize::TX_4X4).count(), 4);
  assert!(sizes.iter().all(|&t| t == TxSize::TX_4X4 || t == TxSize::TX_8X8));
  assert!(!mb.mi.skip);
  for i in 0..8 {
    assert!((dst.y().pixels()[i][8 + i] as i32 - 180).abs() <= 4);
  }
}

#[test]
fn nonuniform_var_tx_unit_reconstructs() {
  let config = EncoderConfig {
    quantizer: QuantizerKind::NonUniform,
    tx_size_selection: TxSizeSelection::Variable,
    ..Default::default()
  };
  let mut encoder = counting_encoder(config);
  let src = padded_frame(64, 64, 180, 180);
  let mut dst = padded_frame(64, 64, 60, 60);
  // 8x8 transforms in the top-left 16x16 of the unit, 16x16 elsewhere
  let mut mi = inter_unit(BlockSize::BLOCK_32X32, TxSize::TX_16X16);
  for row in mi.inter_tx_size[..2].iter_mut() {
    row[..2].fill(TxSize::TX_8X8);
  }
  let mut mb = Macroblock::new(&encoder.config);
  mb.set_position(32, 0, mi, 64, 64);

  encoder.encode_sb(&mut mb, &src, &mut dst);

  let sizes = encoder.transform().forward_sizes.borrow();
  assert_eq!(sizes.len(), 7 + 4 + 4);
  assert_eq!(sizes.iter().filter(|&&t| t == TxSize::TX_16X16).count(), 3);
  assert!(!mb.mi.skip);
  assert!(mb.planes[0].eobs[0] > 0);
  for plane in 0..MAX_MB_PLANE {
    let (y0, size) = (32 >> plane.min(1), 32 >> plane.min(1));
    let pixels = dst.plane(plane).pixels();
    for i in y0 .. y0 + size {
      for j in 0..size {
        assert!((pixels[i][j] as i32 - 180).abs() <= 12, "plane {} ({}, {}) = {}", plane, i, j, pixels[i][j]);
      }
    }
  }
}

proptest! {
  #[test]
  fn skip_policy_zeroes_any_residual(
    tx_size in prop_oneof![Just(TxSize::TX_4X4), Just(TxSize::TX_8X8), Just(TxSize::TX_16X16), Just(TxSize::TX_32X32)],
    residual in prop::collection::vec(-255i16..=255, 32 * 32),
    stale in 1i32..1000,
    ctx in 0usize..3,
  ) {
    let encoder = Encoder::new(EncoderConfig::default()).unwrap();
    let mut mb = Macroblock::new(&encoder.config);
    let mut mi = ModeInfo::new(BlockSize::BLOCK_32X32, tx_size);
    mi.is_inter = true;
    mb.set_position(0, 0, mi, 64, 64);
    let blk = TxBlock {
      plane: 0,
      block: 0,
      blk_row: 0,
      blk_col: 0,
      plane_bsize: BlockSize::BLOCK_32X32,
      tx_size: tx_size
    };
    let n = tx_size.area();

    // The skip policy, and any policy on a unit with skip_block set
    for (policy, skip_block) in [(QuantPolicy::Skip, false), (QuantPolicy::Fp, true), (QuantPolicy::B, true)] {
      let p = &mut mb.planes[0];
      p.src_diff[..32 * 32].copy_from_slice(&residual);
      p.qcoeff[..n].fill(stale);
      p.dqcoeff[..n].fill(-stale);
      p.eobs[0] = n as u16;
      mb.skip_block = skip_block;

      encoder.xform_quant(&mut mb, &blk, policy, ctx);

      let p = &mb.planes[0];
      prop_assert_eq!(p.eobs[0], 0);
      prop_assert!(p.qcoeff[..n].iter().chain(p.dqcoeff[..n].iter()).all(|&v| v == 0));
    }
  }
}

// Intra-code a whole frame unit by unit, carrying the entropy contexts
// between units
fn encode_intra_frame<T: Pixel>(encoder: &mut Encoder, src: &Frame<T>, bsize: BlockSize, tx_size: TxSize) -> Frame<T> {
  let h = src.y().crop_height();
  let w = src.y().crop_width();
  let size = bsize.width();
  let mut dst = Frame::<T>::new(h, w, src.bit_depth());
  let mut mb = Macroblock::new(&encoder.config);
  let mut contexts = FrameContexts::new(src.y().width() >> 2);
  for y in (0..h).step_by(size) {
    if y % 64 == 0 {
      contexts.reset_left();
    }
    for x in (0..w).step_by(size) {
      let mut mi = ModeInfo::new(bsize, tx_size);
      mi.y_mode = PredictionMode::TM_PRED;
      mi.uv_mode = PredictionMode::DC_PRED;
      mb.set_position(y, x, mi, h, w);
      for plane in 0..MAX_MB_PLANE {
        let p = &mut mb.planes[plane];
        let (col4, row4) = (x >> (2 + p.ss_x), (y % 64) >> (2 + p.ss_y));
        let n = bsize.subsampled(p.ss_x).width_4x4();
        contexts.load(plane, col4, row4, n, &mut p.above_context, &mut p.left_context);
      }
      encoder.encode_intra_sb(&mut mb, &EdgePredictor, src, &mut dst);
      for plane in 0..MAX_MB_PLANE {
        let p = &mb.planes[plane];
        let (col4, row4) = (x >> (2 + p.ss_x), (y % 64) >> (2 + p.ss_y));
        let n = bsize.subsampled(p.ss_x).width_4x4();
        contexts.store(plane, col4, row4, n, &p.above_context, &p.left_context);
      }
    }
  }
  dst
}

#[test]
fn lossless_intra_frame_is_exact() {
  let config = EncoderConfig { lossless: true, qindex: 0, optimize: false, ..Default::default() };
  let mut encoder = Encoder::new(config).unwrap();
  let src = textured_frame(40, 40);
  let dst = encode_intra_frame(&mut encoder, &src, BlockSize::BLOCK_16X16, TxSize::TX_4X4);
  for plane in 0..MAX_MB_PLANE {
    assert_eq!(dst.plane(plane).sse(src.plane(plane)), 0);
  }
}

// Smooth ramp with a little texture, at the given bit depth
fn ramp_frame<T: Pixel>(h: usize, w: usize, bit_depth: u32) -> Frame<T> {
  let mut frame = Frame::<T>::new(h, w, bit_depth);
  for plane in 0..MAX_MB_PLANE {
    frame.plane_mut(plane).pixels_mut()
      .fill_with(|i, j| T::from_i32(((60 + i + 2 * j + (i * j) % 5) as i32) << (bit_depth - 8)));
  }
  frame
}

#[test]
fn optimized_intra_frame_stays_close() {
  let config = EncoderConfig { dc_step: 8, ac_step: 8, ..Default::default() };
  let mut encoder = Encoder::new(config).unwrap();
  let src = ramp_frame::<u8>(48, 48, 8);
  let dst = encode_intra_frame(&mut encoder, &src, BlockSize::BLOCK_32X32, TxSize::TX_8X8);
  let pixels = 48 * 48;
  // Fine steps on a smooth ramp leave a small mean squared error
  assert!(dst.y().sse(src.y()) < 9 * pixels as u64);
}

#[test]
fn high_bitdepth_intra_frame_tracks_8bit() {
  let config = EncoderConfig { dc_step: 8, ac_step: 8, ..Default::default() };
  let mut encoder = Encoder::new(config).unwrap();
  let src8 = ramp_frame::<u8>(48, 48, 8);
  let dst8 = encode_intra_frame(&mut encoder, &src8, BlockSize::BLOCK_32X32, TxSize::TX_8X8);
  let sse8 = dst8.y().sse(src8.y());

  // Same content and steps, four times larger
  let config = EncoderConfig { dc_step: 32, ac_step: 32, bit_depth: 10, ..Default::default() };
  let mut encoder = Encoder::new(config).unwrap();
  let src10 = ramp_frame::<u16>(48, 48, 10);
  let dst10 = encode_intra_frame(&mut encoder, &src10, BlockSize::BLOCK_32X32, TxSize::TX_8X8);
  let sse10 = dst10.y().sse(src10.y());

  // Errors scale with the sample range; allow for rounding at either depth
  let pixels = (48 * 48) as u64;
  assert!(sse10 < 16 * 9 * pixels, "10-bit sse {}", sse10);
  assert!(sse10 <= 2 * 16 * sse8 + 16 * pixels, "10-bit sse {} against 8-bit {}", sse10, sse8);
  for plane in 1..MAX_MB_PLANE {
    assert!(dst10.plane(plane).sse(src10.plane(plane)) < 16 * 9 * pixels / 4);
  }
}
