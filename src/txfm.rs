// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Forward and inverse 2D transforms
//
// The encoder only talks to transforms through the `Transform` trait.
// `ReferenceTransform` is a straightforward separable implementation:
// each 1D kernel is a fixed-point basis matrix, applied to columns first
// and then to rows, with intermediate rounding.

use std::f64::consts::PI;

use crate::consts::MAX_TX_SQUARE;
use crate::enums::*;
use crate::util::*;

// Precision of the basis matrices
const BASIS_BITS: u32 = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FwdTxfmOpt {
  Normal,
  // Only the DC coefficient is needed; all others are written as zero
  DcOnly,
}

#[derive(Clone, Copy, Debug)]
pub struct FwdTxfmParam {
  pub tx_type: TxType,
  pub tx_size: TxSize,
  pub opt: FwdTxfmOpt,
  // Reduced-precision intermediate for 32x32, used during RD search
  pub lowp: bool,
  pub lossless: bool,
  pub bit_depth: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct InvTxfmParam {
  pub tx_type: TxType,
  pub tx_size: TxSize,
  pub eob: usize,
  pub lossless: bool,
  pub bit_depth: u32,
}

pub trait Transform {
  // Transform the residual block whose top-left sample is src_diff[0],
  // writing tx_size.area() coefficients in raster order
  fn forward(&self, src_diff: &[i16], stride: usize, coeff: &mut [i32], param: &FwdTxfmParam);

  // Invert dequantized coefficients (raster order) into a raster residual
  fn inverse(&self, dqcoeff: &[i32], residual: &mut [i32], param: &InvTxfmParam);
}

pub struct ReferenceTransform {
  // Basis matrices per size, row k holding frequency k
  dct: [Box<[i32]>; TX_SIZES],
  adst: [Box<[i32]>; TX_SIZES],
}

fn dct_basis(n: usize) -> Box<[i32]> {
  let scale = (1 << BASIS_BITS) as f64;
  let mut b = vec![0i32; n * n].into_boxed_slice();
  for k in 0..n {
    let norm = if k == 0 { (1.0 / n as f64).sqrt() } else { (2.0 / n as f64).sqrt() };
    for i in 0..n {
      let v = norm * (PI * ((2 * i + 1) * k) as f64 / (2 * n) as f64).cos();
      b[k * n + i] = (v * scale).round() as i32;
    }
  }
  b
}

// DST-VII
fn adst_basis(n: usize) -> Box<[i32]> {
  let scale = (1 << BASIS_BITS) as f64;
  let mut b = vec![0i32; n * n].into_boxed_slice();
  let norm = 2.0 / ((2 * n + 1) as f64).sqrt();
  for k in 0..n {
    for i in 0..n {
      let v = norm * (PI * ((2 * k + 1) * (i + 1)) as f64 / (2 * n + 1) as f64).sin();
      b[k * n + i] = (v * scale).round() as i32;
    }
  }
  b
}

// Output of the forward transform is the orthonormal transform scaled by 8,
// or by 4 for 32x32 (whose quantizers compensate with log_scale)
fn output_scale_log2(tx_size: TxSize) -> u32 {
  3 - tx_size.log_scale()
}

impl ReferenceTransform {
  pub fn new() -> Self {
    Self {
      dct: std::array::from_fn(|i| dct_basis(TxSize::from_index(i).width())),
      adst: std::array::from_fn(|i| adst_basis(TxSize::from_index(i).width())),
    }
  }

  fn kernels(&self, tx_type: TxType, tx_size: TxSize) -> (&[i32], &[i32]) {
    let idx = tx_size as usize;
    let vert = if tx_type.vertical_is_adst() { &self.adst[idx] } else { &self.dct[idx] };
    let horz = if tx_type.horizontal_is_adst() { &self.adst[idx] } else { &self.dct[idx] };
    (vert, horz)
  }
}

impl Default for ReferenceTransform {
  fn default() -> Self {
    Self::new()
  }
}

// One lifting stage of the reversible 4-point Walsh-Hadamard transform
fn fwht4(ip: [i32; 4]) -> [i32; 4] {
  let mut a1 = ip[0];
  let mut b1 = ip[1];
  let mut c1 = ip[2];
  let mut d1 = ip[3];
  a1 += b1;
  d1 -= c1;
  let e1 = (a1 - d1) >> 1;
  b1 = e1 - b1;
  c1 = e1 - c1;
  a1 -= c1;
  d1 += b1;
  [a1, c1, d1, b1]
}

fn iwht4(ip: [i32; 4]) -> [i32; 4] {
  let mut a1 = ip[0];
  let mut c1 = ip[1];
  let mut d1 = ip[2];
  let mut b1 = ip[3];
  a1 += c1;
  d1 -= b1;
  let e1 = (a1 - d1) >> 1;
  b1 = e1 - b1;
  c1 = e1 - c1;
  a1 -= b1;
  d1 += c1;
  [a1, b1, c1, d1]
}

fn fwd_wht4x4(src_diff: &[i16], stride: usize, coeff: &mut [i32]) {
  for i in 0..4 {
    let row = [0, 1, 2, 3].map(|j| src_diff[i * stride + j] as i32);
    coeff[4 * i .. 4 * i + 4].copy_from_slice(&fwht4(row));
  }
  for j in 0..4 {
    let col = fwht4([0, 1, 2, 3].map(|i| coeff[4 * i + j]));
    for i in 0..4 {
      coeff[4 * i + j] = col[i];
    }
  }
}

fn inv_wht4x4(dqcoeff: &[i32], residual: &mut [i32]) {
  residual[..16].copy_from_slice(&dqcoeff[..16]);
  for j in 0..4 {
    let col = iwht4([0, 1, 2, 3].map(|i| residual[4 * i + j]));
    for i in 0..4 {
      residual[4 * i + j] = col[i];
    }
  }
  for i in 0..4 {
    let row = iwht4([0, 1, 2, 3].map(|j| residual[4 * i + j]));
    residual[4 * i .. 4 * i + 4].copy_from_slice(&row);
  }
}

impl Transform for ReferenceTransform {
  fn forward(&self, src_diff: &[i16], stride: usize, coeff: &mut [i32], param: &FwdTxfmParam) {
    let n = param.tx_size.width();

    if param.lossless {
      assert!(param.tx_size == TxSize::TX_4X4);
      fwd_wht4x4(src_diff, stride, coeff);
      return;
    }

    let (vert, horz) = self.kernels(param.tx_type, param.tx_size);
    let out_log2 = output_scale_log2(param.tx_size);
    // The reduced-precision path keeps one bit of headroom instead of three
    let mid_log2 = if param.lowp && param.tx_size == TxSize::TX_32X32 { 1 } else { 3 };
    let shift1 = BASIS_BITS - mid_log2;
    let shift2 = BASIS_BITS + mid_log2 - out_log2;

    // Only the first row of frequencies is needed for DC-only
    let rows_out = if param.opt == FwdTxfmOpt::DcOnly { 1 } else { n };

    // Column transforms
    let mut mid = [0i32; MAX_TX_SQUARE];
    for k in 0..rows_out {
      for c in 0..n {
        let mut sum = 0i64;
        for r in 0..n {
          sum += vert[k * n + r] as i64 * src_diff[r * stride + c] as i64;
        }
        mid[k * n + c] = round2(sum, shift1) as i32;
      }
    }

    // Row transforms
    coeff[..n * n].fill(0);
    for k in 0..rows_out {
      let cols_out = if param.opt == FwdTxfmOpt::DcOnly { 1 } else { n };
      for l in 0..cols_out {
        let mut sum = 0i64;
        for c in 0..n {
          sum += mid[k * n + c] as i64 * horz[l * n + c] as i64;
        }
        coeff[k * n + l] = round2(sum, shift2) as i32;
      }
    }
  }

  fn inverse(&self, dqcoeff: &[i32], residual: &mut [i32], param: &InvTxfmParam) {
    let n = param.tx_size.width();
    if param.eob == 0 {
      residual[..n * n].fill(0);
      return;
    }

    if param.lossless {
      assert!(param.tx_size == TxSize::TX_4X4);
      inv_wht4x4(dqcoeff, residual);
      return;
    }

    let (vert, horz) = self.kernels(param.tx_type, param.tx_size);
    let in_log2 = output_scale_log2(param.tx_size);
    // Dequantized values beyond this range cannot come from a valid residual
    let range = 1i64 << (param.bit_depth + 8 + in_log2);

    // Column transforms
    let mut mid = [0i32; MAX_TX_SQUARE];
    for r in 0..n {
      for l in 0..n {
        let mut sum = 0i64;
        for k in 0..n {
          let c = clamp(dqcoeff[k * n + l] as i64, -range, range - 1);
          sum += vert[k * n + r] as i64 * c;
        }
        mid[r * n + l] = round2(sum, BASIS_BITS) as i32;
      }
    }

    // Row transforms
    for r in 0..n {
      for c in 0..n {
        let mut sum = 0i64;
        for l in 0..n {
          sum += mid[r * n + l] as i64 * horz[l * n + c] as i64;
        }
        residual[r * n + c] = round2(sum, BASIS_BITS + in_log2) as i32;
      }
    }
  }
}
