// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Per-coding-unit encoder state
//
// A `Macroblock` owns every buffer the residual pipeline writes for the
// coding unit currently being encoded. Buffers are sized for the largest
// unit and reused from one unit to the next.

use crate::config::EncoderConfig;
use crate::consts::*;
use crate::enums::*;
use crate::quantize::PlaneQuant;

// Largest coding unit, in pixels and in 4x4 units
pub const MAX_SB_SIZE: usize = 64;
pub const MAX_SB_SQUARE: usize = MAX_SB_SIZE * MAX_SB_SIZE;
const MAX_4X4_BLOCKS: usize = MAX_SB_SQUARE / 16;

pub struct PlaneBuffers {
  // source - prediction, with a stride of the plane block width
  pub src_diff: Box<[i16]>,
  // Coefficients of transform block `block` start at offset block * 16
  pub coeff: Box<[i32]>,
  pub qcoeff: Box<[i32]>,
  pub dqcoeff: Box<[i32]>,
  pub eobs: [u16; MAX_4X4_BLOCKS],
  // Blocks already decided to have no coefficients, indexed by
  // (blk_row << bwl) + blk_col. Only used with variable transform sizes.
  pub blk_skip: [bool; MAX_4X4_BLOCKS],
  // Has-coefficient flags of the neighbouring units, per 4x4 column above
  // and per 4x4 row to the left
  pub above_context: [u8; MAX_4X4_CONTEXTS],
  pub left_context: [u8; MAX_4X4_CONTEXTS],
  pub quant: PlaneQuant,
  pub ss_x: usize,
  pub ss_y: usize,
}

impl PlaneBuffers {
  fn new(quant: PlaneQuant, ss_x: usize, ss_y: usize) -> Self {
    Self {
      src_diff: vec![0i16; MAX_SB_SQUARE].into_boxed_slice(),
      coeff: vec![0i32; MAX_SB_SQUARE].into_boxed_slice(),
      qcoeff: vec![0i32; MAX_SB_SQUARE].into_boxed_slice(),
      dqcoeff: vec![0i32; MAX_SB_SQUARE].into_boxed_slice(),
      eobs: [0; MAX_4X4_BLOCKS],
      blk_skip: [false; MAX_4X4_BLOCKS],
      above_context: [0; MAX_4X4_CONTEXTS],
      left_context: [0; MAX_4X4_CONTEXTS],
      quant: quant,
      ss_x: ss_x,
      ss_y: ss_y
    }
  }

  pub fn qcoeff_block(&self, block: usize, tx_size: TxSize) -> &[i32] {
    let start = block << 4;
    &self.qcoeff[start .. start + tx_size.area()]
  }

  pub fn dqcoeff_block(&self, block: usize, tx_size: TxSize) -> &[i32] {
    let start = block << 4;
    &self.dqcoeff[start .. start + tx_size.area()]
  }

  pub fn clear(&mut self) {
    self.eobs.fill(0);
    self.blk_skip.fill(false);
  }
}

// Mode decisions for the coding unit
#[derive(Clone, Debug)]
pub struct ModeInfo {
  pub bsize: BlockSize,
  pub is_inter: bool,
  // Luma transform size
  pub tx_size: TxSize,
  // Luma transform type
  pub tx_type: TxType,
  pub y_mode: PredictionMode,
  pub uv_mode: PredictionMode,
  // Per 8x8 luma unit transform size, for variable transform sizes
  pub inter_tx_size: [[TxSize; MAX_MIB_SIZE]; MAX_MIB_SIZE],
  // Set when no block in the unit has coefficients
  pub skip: bool,
}

impl ModeInfo {
  pub fn new(bsize: BlockSize, tx_size: TxSize) -> Self {
    Self {
      bsize: bsize,
      is_inter: false,
      tx_size: tx_size,
      tx_type: TxType::DCT_DCT,
      y_mode: PredictionMode::DC_PRED,
      uv_mode: PredictionMode::DC_PRED,
      inter_tx_size: [[tx_size; MAX_MIB_SIZE]; MAX_MIB_SIZE],
      skip: false
    }
  }

  // Transform size used by the given plane
  pub fn plane_tx_size(&self, plane: usize, ss_x: usize) -> TxSize {
    if plane == 0 {
      self.tx_size
    } else {
      let uv_max = self.bsize.subsampled(ss_x).max_tx_size();
      std::cmp::min(self.tx_size, uv_max)
    }
  }
}

// One transform block within a plane of the coding unit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxBlock {
  pub plane: usize,
  // Index of the first 4x4 unit covered by this block
  pub block: usize,
  // Position within the plane block, in 4x4 units
  pub blk_row: usize,
  pub blk_col: usize,
  pub plane_bsize: BlockSize,
  pub tx_size: TxSize,
}

pub struct Macroblock {
  pub planes: [PlaneBuffers; MAX_MB_PLANE],
  pub mi: ModeInfo,
  // Position of the unit's top-left luma pixel
  pub y: usize,
  pub x: usize,
  // Luma pixels from the unit's right/bottom edge to the frame edge;
  // negative when the unit hangs over the frame edge
  pub to_right_edge: i32,
  pub to_bottom_edge: i32,
  pub qindex: u8,
  pub lossless: bool,
  pub rdmult: i64,
  pub rddiv: u32,
  // Replace quantization with all-zero output
  pub skip_block: bool,
  // The unit has already been decided to code no residual
  pub skip: bool,
  pub bit_depth: u32,
}

impl Macroblock {
  // Buffers for 4:2:0 coding units. Lossless units use unit quantizer
  // steps so that the Walsh-Hadamard coefficients survive exactly.
  pub fn new(config: &EncoderConfig) -> Self {
    let quant = if config.lossless {
      PlaneQuant::new(1, 1)
    } else {
      PlaneQuant::new(config.dc_step, config.ac_step)
    };
    Self {
      planes: [
        PlaneBuffers::new(quant.clone(), 0, 0),
        PlaneBuffers::new(quant.clone(), 1, 1),
        PlaneBuffers::new(quant, 1, 1),
      ],
      mi: ModeInfo::new(BlockSize::BLOCK_64X64, TxSize::TX_32X32),
      y: 0,
      x: 0,
      to_right_edge: 0,
      to_bottom_edge: 0,
      qindex: config.qindex,
      lossless: config.lossless,
      rdmult: config.rdmult,
      rddiv: config.rddiv,
      skip_block: false,
      skip: false,
      bit_depth: config.bit_depth
    }
  }

  // Move to a new coding unit, clearing per-unit state
  pub fn set_position(&mut self, y: usize, x: usize, mi: ModeInfo, frame_height: usize, frame_width: usize) {
    let size = mi.bsize.width() as i32;
    self.y = y;
    self.x = x;
    self.to_bottom_edge = std::cmp::min(0, frame_height as i32 - (y as i32 + size));
    self.to_right_edge = std::cmp::min(0, frame_width as i32 - (x as i32 + size));
    self.mi = mi;
    self.skip = false;
    for plane in self.planes.iter_mut() {
      plane.clear();
    }
  }

  pub fn plane_bsize(&self, plane: usize) -> BlockSize {
    self.mi.bsize.subsampled(self.planes[plane].ss_x)
  }

  // Number of 4x4 columns/rows of the plane block inside the frame
  pub fn max_blocks_wide(&self, plane: usize, plane_bsize: BlockSize) -> usize {
    let ss_x = self.planes[plane].ss_x as i32;
    let mut max = plane_bsize.width_4x4() as i32;
    if self.to_right_edge < 0 {
      max += self.to_right_edge >> (2 + ss_x);
    }
    std::cmp::max(max, 0) as usize
  }

  pub fn max_blocks_high(&self, plane: usize, plane_bsize: BlockSize) -> usize {
    let ss_y = self.planes[plane].ss_y as i32;
    let mut max = plane_bsize.width_4x4() as i32;
    if self.to_bottom_edge < 0 {
      max += self.to_bottom_edge >> (2 + ss_y);
    }
    std::cmp::max(max, 0) as usize
  }

  // Top-left pixel of the unit within the given plane
  pub fn plane_origin(&self, plane: usize) -> (usize, usize) {
    let p = &self.planes[plane];
    (self.y >> p.ss_y, self.x >> p.ss_x)
  }

  // Transform blocks of one plane in coding order, skipping those entirely
  // outside the frame
  pub fn transformed_blocks(&self, plane: usize, tx_size: TxSize) -> Vec<TxBlock> {
    let plane_bsize = self.plane_bsize(plane);
    let num_4x4_w = plane_bsize.width_4x4();
    let max_wide = self.max_blocks_wide(plane, plane_bsize);
    let max_high = self.max_blocks_high(plane, plane_bsize);
    let step = tx_size.num_4x4();
    let tx_w = tx_size.width_4x4();
    // Blocks skipped at the end of each row still use up block indices
    let extra_step = ((num_4x4_w - std::cmp::min(max_wide, num_4x4_w)) >> tx_size.width_log2_4x4()) * step;

    let mut blocks = Vec::new();
    let mut block = 0;
    for blk_row in (0..max_high).step_by(tx_w) {
      for blk_col in (0..max_wide).step_by(tx_w) {
        blocks.push(TxBlock {
          plane: plane,
          block: block,
          blk_row: blk_row,
          blk_col: blk_col,
          plane_bsize: plane_bsize,
          tx_size: tx_size
        });
        block += step;
      }
      block += extra_step;
    }
    blocks
  }
}

// Whether a (quadrant) block at (blk_row, blk_col) starts outside the
// visible part of the plane block
pub fn block_outside_visible(blk_row: usize, blk_col: usize, max_blocks_high: usize, max_blocks_wide: usize) -> bool {
  blk_row >= max_blocks_high || blk_col >= max_blocks_wide
}

#[cfg(test)]
mod tests {
  use super::*;

  fn unit(bsize: BlockSize, tx_size: TxSize, y: usize, x: usize, h: usize, w: usize) -> Macroblock {
    let mut mb = Macroblock::new(&EncoderConfig::default());
    mb.set_position(y, x, ModeInfo::new(bsize, tx_size), h, w);
    mb
  }

  #[test]
  fn test_transformed_blocks_interior() {
    let mb = unit(BlockSize::BLOCK_16X16, TxSize::TX_8X8, 0, 0, 64, 64);
    let blocks = mb.transformed_blocks(0, TxSize::TX_8X8);
    let idx: Vec<(usize, usize, usize)> = blocks.iter().map(|b| (b.block, b.blk_row, b.blk_col)).collect();
    assert_eq!(idx, vec![(0, 0, 0), (4, 0, 2), (8, 2, 0), (12, 2, 2)]);

    // Chroma of a 16x16 unit is a single 8x8 block
    let blocks = mb.transformed_blocks(1, TxSize::TX_8X8);
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].plane_bsize, BlockSize::BLOCK_8X8);
  }

  #[test]
  fn test_transformed_blocks_clipped_at_frame_edge() {
    // 16x16 unit with only 8 columns and 12 rows inside the frame
    let mb = unit(BlockSize::BLOCK_16X16, TxSize::TX_4X4, 52, 56, 64, 64);
    assert_eq!(mb.to_right_edge, -8);
    assert_eq!(mb.to_bottom_edge, -4);
    assert_eq!(mb.max_blocks_wide(0, BlockSize::BLOCK_16X16), 2);
    assert_eq!(mb.max_blocks_high(0, BlockSize::BLOCK_16X16), 3);
    let blocks = mb.transformed_blocks(0, TxSize::TX_4X4);
    assert_eq!(blocks.len(), 6);
    // Row stride of block indices still covers the full unit width
    assert_eq!(blocks[2].block, 4);
    assert_eq!((blocks[2].blk_row, blocks[2].blk_col), (1, 0));
  }

  #[test]
  fn test_block_outside_visible() {
    assert!(!block_outside_visible(0, 0, 4, 4));
    assert!(block_outside_visible(4, 0, 4, 4));
    assert!(block_outside_visible(0, 2, 4, 2));
  }

  #[test]
  fn test_uv_tx_size_is_limited_by_plane_block() {
    let mi = ModeInfo::new(BlockSize::BLOCK_16X16, TxSize::TX_16X16);
    assert_eq!(mi.plane_tx_size(0, 0), TxSize::TX_16X16);
    assert_eq!(mi.plane_tx_size(1, 1), TxSize::TX_8X8);
    let mi = ModeInfo::new(BlockSize::BLOCK_8X8, TxSize::TX_4X4);
    assert_eq!(mi.plane_tx_size(2, 1), TxSize::TX_4X4);
  }
}
