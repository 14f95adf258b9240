// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::enums::*;

// Largest number of coefficients in one transform block (32x32)
pub const MAX_TX_SQUARE: usize = 1024;

// Maximum coding-unit size, in 8x8 mode-info units
pub const MAX_MIB_SIZE: usize = 8;

// Entropy contexts are kept at 4x4 granularity, two per mode-info unit
pub const MAX_4X4_CONTEXTS: usize = 2 * MAX_MIB_SIZE;

pub const COEF_BANDS: usize = 6;
pub const COEFF_CONTEXTS: usize = 6;

// Costs are measured in units of 1/512 bit
pub const AV1_PROB_COST_SHIFT: u32 = 9;

pub const CAT6_MIN_VAL: i32 = 67;

// Number of tabulated reconstruction levels in a non-uniform quantizer
pub const NUQ_KNOTS: usize = 3;
pub const QUANT_PROFILES: usize = 3;

// Rate multipliers per [is_inter][plane type]. These numbers are empirically obtained.
pub const plane_rd_mult: [[i64; PLANE_TYPES]; REF_TYPES] = [
  [10, 6],
  [8, 5],
];

// Coefficient band of each scan position
const coefband_trans_4x4: [u8; 16] = [
  0, 1, 1, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 5, 5, 5
];

const coefband_trans_8x8plus_head: [u8; 21] = [
  0, 1, 1, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4
];

pub fn band_translate(tx_size: TxSize, scan_idx: usize) -> usize {
  if tx_size == TxSize::TX_4X4 {
    coefband_trans_4x4[scan_idx] as usize
  } else if scan_idx < coefband_trans_8x8plus_head.len() {
    coefband_trans_8x8plus_head[scan_idx] as usize
  } else {
    5
  }
}

// Number of scan positions in each band
pub const band_count_table: [[u16; COEF_BANDS]; TX_SIZES] = [
  [1, 2, 3, 4, 3, 16 - 13],
  [1, 2, 3, 4, 11, 64 - 21],
  [1, 2, 3, 4, 11, 256 - 21],
  [1, 2, 3, 4, 11, 1024 - 21],
];

// First scan position of each band, plus the total
pub const band_cum_count_table: [[u16; COEF_BANDS + 1]; TX_SIZES] = [
  [0, 1, 3, 6, 10, 13, 16],
  [0, 1, 3, 6, 10, 21, 64],
  [0, 1, 3, 6, 10, 21, 256],
  [0, 1, 3, 6, 10, 21, 1024],
];
