// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Small numeric helpers shared across the crate

pub fn clamp<T: PartialOrd>(value: T, low: T, high: T) -> T {
  debug_assert!(low <= high);
  if value < low {
    low
  } else if value > high {
    high
  } else {
    value
  }
}

// Divide by 2^bits, rounding halves upward
pub trait Round2 {
  fn round2(self, bits: u32) -> Self;
}

impl Round2 for i32 {
  fn round2(self, bits: u32) -> i32 {
    if bits == 0 {
      self
    } else {
      (self + (1 << (bits - 1))) >> bits
    }
  }
}

impl Round2 for i64 {
  fn round2(self, bits: u32) -> i64 {
    if bits == 0 {
      self
    } else {
      (self + (1 << (bits - 1))) >> bits
    }
  }
}

impl Round2 for usize {
  fn round2(self, bits: u32) -> usize {
    if bits == 0 {
      self
    } else {
      (self + (1 << (bits - 1))) >> bits
    }
  }
}

pub fn round2<T: Round2>(value: T, bits: u32) -> T {
  value.round2(bits)
}

// Clamp a value to the pixel range of the given bit depth
pub fn clip_pixel(value: i32, bit_depth: u32) -> i32 {
  clamp(value, 0, (1 << bit_depth) - 1)
}
