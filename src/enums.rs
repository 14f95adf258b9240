// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Square transform sizes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TxSize {
  TX_4X4 = 0,
  TX_8X8 = 1,
  TX_16X16 = 2,
  TX_32X32 = 3,
}

pub const TX_SIZES: usize = 4;

impl TxSize {
  pub const ALL: [TxSize; TX_SIZES] = [TxSize::TX_4X4, TxSize::TX_8X8, TxSize::TX_16X16, TxSize::TX_32X32];

  pub fn from_index(idx: usize) -> TxSize {
    TxSize::ALL[idx]
  }

  // log2 of the width, in 4x4 units
  pub fn width_log2_4x4(self) -> usize {
    self as usize
  }

  // Width (= height) in pixels
  pub fn width(self) -> usize {
    4 << (self as usize)
  }

  // Width (= height) in 4x4 units
  pub fn width_4x4(self) -> usize {
    1 << (self as usize)
  }

  // Number of 4x4 units covered
  pub fn num_4x4(self) -> usize {
    1 << (2 * self as usize)
  }

  // Number of coefficients
  pub fn area(self) -> usize {
    self.width() * self.width()
  }

  // The next size down, used when splitting into quadrants
  pub fn split(self) -> TxSize {
    assert!(self != TxSize::TX_4X4);
    TxSize::from_index(self as usize - 1)
  }

  // 32x32 transforms use half-size quantizer steps
  pub fn log_scale(self) -> u32 {
    if self == TxSize::TX_32X32 { 1 } else { 0 }
  }
}

// Combination of vertical and horizontal 1D kernels, named as VERT_HORZ
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxType {
  DCT_DCT = 0,
  ADST_DCT = 1,
  DCT_ADST = 2,
  ADST_ADST = 3,
}

pub const TX_TYPES: usize = 4;

impl TxType {
  pub fn vertical_is_adst(self) -> bool {
    matches!(self, TxType::ADST_DCT | TxType::ADST_ADST)
  }

  pub fn horizontal_is_adst(self) -> bool {
    matches!(self, TxType::DCT_ADST | TxType::ADST_ADST)
  }
}

// Square coding-unit sizes
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockSize {
  BLOCK_4X4 = 0,
  BLOCK_8X8 = 1,
  BLOCK_16X16 = 2,
  BLOCK_32X32 = 3,
  BLOCK_64X64 = 4,
}

impl BlockSize {
  pub const ALL: [BlockSize; 5] = [
    BlockSize::BLOCK_4X4, BlockSize::BLOCK_8X8, BlockSize::BLOCK_16X16,
    BlockSize::BLOCK_32X32, BlockSize::BLOCK_64X64
  ];

  pub fn from_width(width: usize) -> Option<BlockSize> {
    BlockSize::ALL.iter().copied().find(|b| b.width() == width)
  }

  pub fn width(self) -> usize {
    4 << (self as usize)
  }

  pub fn width_4x4(self) -> usize {
    1 << (self as usize)
  }

  // Block size as seen by a plane with the given subsampling.
  // Chroma of a 4x4 luma block still covers a (shared) 4x4 area.
  pub fn subsampled(self, ss: usize) -> BlockSize {
    BlockSize::ALL[(self as usize).saturating_sub(ss)]
  }

  // Largest transform that fits inside this block
  pub fn max_tx_size(self) -> TxSize {
    TxSize::from_index(std::cmp::min(self as usize, TxSize::TX_32X32 as usize))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaneType {
  Y = 0,
  UV = 1,
}

pub const PLANE_TYPES: usize = 2;
pub const REF_TYPES: usize = 2;
pub const MAX_MB_PLANE: usize = 3;

impl PlaneType {
  pub fn from_plane(plane: usize) -> PlaneType {
    if plane == 0 { PlaneType::Y } else { PlaneType::UV }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PredictionMode {
  #[default]
  DC_PRED,
  V_PRED,
  H_PRED,
  TM_PRED,
}

impl PredictionMode {
  // Transform type best matched to the residual statistics of each mode
  pub fn intra_tx_type(self) -> TxType {
    match self {
      PredictionMode::DC_PRED => TxType::DCT_DCT,
      PredictionMode::V_PRED => TxType::ADST_DCT,
      PredictionMode::H_PRED => TxType::DCT_ADST,
      PredictionMode::TM_PRED => TxType::ADST_ADST,
    }
  }
}

// Coefficient tokens. Values 5 and up are coded as a category token
// plus extra bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Token {
  ZERO_TOKEN = 0,
  ONE_TOKEN = 1,
  TWO_TOKEN = 2,
  THREE_TOKEN = 3,
  FOUR_TOKEN = 4,
  CATEGORY1_TOKEN = 5,
  CATEGORY2_TOKEN = 6,
  CATEGORY3_TOKEN = 7,
  CATEGORY4_TOKEN = 8,
  CATEGORY5_TOKEN = 9,
  CATEGORY6_TOKEN = 10,
  EOB_TOKEN = 11,
}

pub const ENTROPY_TOKENS: usize = 12;

impl Token {
  // Coarse magnitude class used to derive the context of later tokens
  pub fn energy_class(self) -> u8 {
    const pt_energy_class: [u8; ENTROPY_TOKENS] = [0, 1, 2, 3, 3, 4, 4, 5, 5, 5, 5, 5];
    pt_energy_class[self as usize]
  }
}
