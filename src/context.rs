// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Entropy contexts: whether the neighbouring transform blocks above and to
// the left have any nonzero coefficients

use crate::consts::*;
use crate::enums::*;

pub fn combine_entropy_contexts(a: u8, l: u8) -> usize {
  (a != 0) as usize + (l != 0) as usize
}

// Context of a transform block whose above/left flags are kept per 4x4
// unit: a side counts as coded if any 4x4 unit along it is
pub fn get_entropy_context(tx_size: TxSize, a: &[u8], l: &[u8]) -> usize {
  let n = tx_size.width_4x4();
  let above_ec = a[..n].iter().any(|&v| v != 0) as u8;
  let left_ec = l[..n].iter().any(|&v| v != 0) as u8;
  combine_entropy_contexts(above_ec, left_ec)
}

// Build the working above/left context arrays of one plane block from the
// neighbour flags, at the granularity of `tx_size`. Entry i * n holds the
// flag for the i-th transform column (or row); units beyond the visible
// edge of the frame count as uncoded.
pub fn get_entropy_contexts(plane_bsize: BlockSize, tx_size: TxSize,
                            above: &[u8], left: &[u8],
                            max_blocks_wide: usize, max_blocks_high: usize)
                            -> ([u8; MAX_4X4_CONTEXTS], [u8; MAX_4X4_CONTEXTS]) {
  let num_4x4 = plane_bsize.width_4x4();
  let n = tx_size.width_4x4();
  let mut t_above = [0u8; MAX_4X4_CONTEXTS];
  let mut t_left = [0u8; MAX_4X4_CONTEXTS];

  for i in (0..num_4x4).step_by(n) {
    let end = std::cmp::min(i + n, max_blocks_wide);
    t_above[i] = (i < end && above[i..end].iter().any(|&v| v != 0)) as u8;
    let end = std::cmp::min(i + n, max_blocks_high);
    t_left[i] = (i < end && left[i..end].iter().any(|&v| v != 0)) as u8;
  }
  (t_above, t_left)
}

// Expand flags stored at the first 4x4 unit of each transform block across
// the whole span of that block
pub fn spread_contexts(tx_size: TxSize, ctx: &mut [u8], num_4x4: usize) {
  let n = tx_size.width_4x4();
  for i in (0..num_4x4).step_by(n) {
    let v = ctx[i];
    ctx[i .. std::cmp::min(i + n, num_4x4)].fill(v);
  }
}

// Has-coefficient flags for a whole frame: one flag per 4x4 column of each
// plane for the row of units above, and one per 4x4 row for the unit to the
// left. Coding units copy these in before encoding and write them back
// afterwards.
pub struct FrameContexts {
  above: [Vec<u8>; MAX_MB_PLANE],
  left: [[u8; MAX_4X4_CONTEXTS]; MAX_MB_PLANE],
}

impl FrameContexts {
  // `width_4x4` is the luma width of the (padded) frame in 4x4 units
  pub fn new(width_4x4: usize) -> Self {
    Self {
      above: [vec![0; width_4x4], vec![0; width_4x4 / 2], vec![0; width_4x4 / 2]],
      left: [[0; MAX_4X4_CONTEXTS]; MAX_MB_PLANE],
    }
  }

  // Start of a new row of coding units
  pub fn reset_left(&mut self) {
    for left in self.left.iter_mut() {
      left.fill(0);
    }
  }

  // Copy the flags bordering a unit at 4x4 column `col4` of the plane into
  // `above_out` / `left_out`. `row4` is the unit's 4x4 row within its
  // 64x64 superblock row.
  pub fn load(&self, plane: usize, col4: usize, row4: usize, num_4x4: usize,
              above_out: &mut [u8; MAX_4X4_CONTEXTS], left_out: &mut [u8; MAX_4X4_CONTEXTS]) {
    let above = &self.above[plane];
    above_out.fill(0);
    left_out.fill(0);
    let n = std::cmp::min(num_4x4, above.len().saturating_sub(col4));
    above_out[..n].copy_from_slice(&above[col4 .. col4 + n]);
    let n = std::cmp::min(num_4x4, MAX_4X4_CONTEXTS - row4);
    left_out[..n].copy_from_slice(&self.left[plane][row4 .. row4 + n]);
  }

  pub fn store(&mut self, plane: usize, col4: usize, row4: usize, num_4x4: usize,
               above_in: &[u8], left_in: &[u8]) {
    let above = &mut self.above[plane];
    let n = std::cmp::min(num_4x4, above.len().saturating_sub(col4));
    above[col4 .. col4 + n].copy_from_slice(&above_in[..n]);
    let n = std::cmp::min(num_4x4, MAX_4X4_CONTEXTS - row4);
    self.left[plane][row4 .. row4 + n].copy_from_slice(&left_in[..n]);
  }
}
