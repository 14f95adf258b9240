// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Quantization primitives
//
// Every quantizer walks the coefficients in scan order, writes quantized and
// dequantized values in raster order, and returns the end-of-block: one past
// the scan index of the last nonzero quantized value.
//
// `log_scale` is 1 for 32x32 transforms, whose coefficients carry one bit
// less scaling than the quantizer steps assume.

use crate::consts::*;
use crate::enums::*;
use crate::util::*;

// Non-uniform quantizer tables for one profile.
// Bins are in the (coefficient << log_scale) domain and indexed by band;
// band 0 only ever holds the DC coefficient.
#[derive(Clone, Debug)]
pub struct NuqProfile {
  // Upper edges of the first NUQ_KNOTS quantization bins
  pub cuml_bins: [[i32; NUQ_KNOTS]; COEF_BANDS],
  // Reconstruction value of levels 0..=NUQ_KNOTS
  pub dequant_val: [[i32; NUQ_KNOTS + 1]; COEF_BANDS],
}

impl NuqProfile {
  // `knots` are the widths of the first bins in 1/128 of a step (the first
  // being the dead zone), `doff` pulls reconstruction toward zero by that
  // many 1/128 steps
  pub fn new(dc_step: i32, ac_step: i32, knots: [i32; NUQ_KNOTS], doff: i32) -> Self {
    let mut cuml_bins = [[0; NUQ_KNOTS]; COEF_BANDS];
    let mut dequant_val = [[0; NUQ_KNOTS + 1]; COEF_BANDS];
    for band in 0..COEF_BANDS {
      let step = if band == 0 { dc_step } else { ac_step };
      let mut edge = 0;
      for k in 0..NUQ_KNOTS {
        edge += (knots[k] * step) >> 7;
        cuml_bins[band][k] = edge;
      }
      let off = (doff * step) >> 7;
      for v in 1..NUQ_KNOTS {
        let lo = cuml_bins[band][v - 1];
        let hi = cuml_bins[band][v];
        dequant_val[band][v] = (lo + hi) / 2 - off;
      }
      dequant_val[band][NUQ_KNOTS] = cuml_bins[band][NUQ_KNOTS - 1] + step / 2 - off;
    }
    Self {
      cuml_bins: cuml_bins,
      dequant_val: dequant_val
    }
  }
}

// Reconstruction magnitude of level v
pub fn dequant_abscoeff_nuq(v: i32, q: i32, dqv: &[i32; NUQ_KNOTS + 1]) -> i32 {
  debug_assert!(v >= 0);
  if v <= NUQ_KNOTS as i32 {
    dqv[v as usize]
  } else {
    dqv[NUQ_KNOTS] + (v - NUQ_KNOTS as i32) * q
  }
}

pub fn dequant_coeff_nuq(v: i32, q: i32, dqv: &[i32; NUQ_KNOTS + 1]) -> i32 {
  let dq = dequant_abscoeff_nuq(v.abs(), q, dqv);
  if v < 0 { -dq } else { dq }
}

// Choose the non-uniform quantizer profile for a block.
// Blocks without coded neighbours and chroma blocks use the neutral profile.
pub fn dq_profile_from_ctx(qindex: u8, ctx: usize, is_inter: bool, plane_type: PlaneType) -> usize {
  if qindex == 0 || ctx == 0 || plane_type == PlaneType::UV {
    0
  } else if is_inter {
    1
  } else {
    2
  }
}

// Per-plane quantizer state. Index 0 holds DC values, index 1 AC values.
#[derive(Clone, Debug)]
pub struct PlaneQuant {
  pub dequant: [i16; 2],
  pub quant_fp: [i32; 2],
  pub round_fp: [i32; 2],
  pub round: [i32; 2],
  pub zbin: [i32; 2],
  pub nuq: [NuqProfile; QUANT_PROFILES],
}

const nuq_knots: [[i32; NUQ_KNOTS]; QUANT_PROFILES] = [
  [84, 128, 128],
  [88, 128, 128],
  [80, 128, 128],
];
const nuq_doff: [i32; QUANT_PROFILES] = [0, 8, 4];

impl PlaneQuant {
  pub fn new(dc_step: i16, ac_step: i16) -> Self {
    assert!(dc_step > 0 && ac_step > 0);
    let steps = [dc_step as i32, ac_step as i32];
    Self {
      dequant: [dc_step, ac_step],
      quant_fp: steps.map(|s| (1 << 16) / s),
      round_fp: steps.map(|s| (64 * s) >> 7),
      round: steps.map(|s| (48 * s) >> 7),
      zbin: steps.map(|s| round2(84 * s, 7)),
      nuq: std::array::from_fn(|p| NuqProfile::new(steps[0], steps[1], nuq_knots[p], nuq_doff[p])),
    }
  }
}

fn apply_sign(value: i32, negative: bool) -> i32 {
  if negative { -value } else { value }
}

pub fn quantize_skip(n: usize, qcoeff: &mut [i32], dqcoeff: &mut [i32]) -> usize {
  qcoeff[..n].fill(0);
  dqcoeff[..n].fill(0);
  0
}

// Fast-path quantizer: multiply by the reciprocal step with half-step rounding
pub fn quantize_fp(coeff: &[i32], n: usize, pq: &PlaneQuant, qcoeff: &mut [i32], dqcoeff: &mut [i32],
                   scan: &[u16], log_scale: u32) -> usize {
  qcoeff[..n].fill(0);
  dqcoeff[..n].fill(0);
  let mut eob = 0;
  for i in 0..n {
    let rc = scan[i] as usize;
    let idx = (rc != 0) as usize;
    let c = coeff[rc];
    let tmp = ((c.abs() as i64) << log_scale) + pq.round_fp[idx] as i64;
    let q = ((tmp * pq.quant_fp[idx] as i64) >> 16) as i32;
    if q != 0 {
      qcoeff[rc] = apply_sign(q, c < 0);
      dqcoeff[rc] = apply_sign((q * pq.dequant[idx] as i32) >> log_scale, c < 0);
      eob = i + 1;
    }
  }
  eob
}

// Exact quantizer with a dead zone
pub fn quantize_b(coeff: &[i32], n: usize, pq: &PlaneQuant, qcoeff: &mut [i32], dqcoeff: &mut [i32],
                  scan: &[u16], log_scale: u32) -> usize {
  qcoeff[..n].fill(0);
  dqcoeff[..n].fill(0);
  let mut eob = 0;
  for i in 0..n {
    let rc = scan[i] as usize;
    let idx = (rc != 0) as usize;
    let c = coeff[rc];
    let abs = (c.abs() as i64) << log_scale;
    if abs < pq.zbin[idx] as i64 {
      continue;
    }
    let q = ((abs + pq.round[idx] as i64) / pq.dequant[idx] as i64) as i32;
    if q != 0 {
      qcoeff[rc] = apply_sign(q, c < 0);
      dqcoeff[rc] = apply_sign((q * pq.dequant[idx] as i32) >> log_scale, c < 0);
      eob = i + 1;
    }
  }
  eob
}

// Quantize only the DC coefficient; everything else becomes zero
pub fn quantize_dc(coeff: &[i32], n: usize, pq: &PlaneQuant, qcoeff: &mut [i32], dqcoeff: &mut [i32],
                   log_scale: u32) -> usize {
  qcoeff[..n].fill(0);
  dqcoeff[..n].fill(0);
  let c = coeff[0];
  let abs = (c.abs() as i64) << log_scale;
  let q = ((abs + pq.round[0] as i64) / pq.dequant[0] as i64) as i32;
  if q == 0 {
    return 0;
  }
  qcoeff[0] = apply_sign(q, c < 0);
  dqcoeff[0] = apply_sign((q * pq.dequant[0] as i32) >> log_scale, c < 0);
  1
}

// Level of one coefficient magnitude under a non-uniform quantizer.
// `fp` selects the reciprocal-multiply rounding of the fast path.
fn nuq_level(abs: i64, step: i32, quant_fp: i32, cuml_bins: &[i32; NUQ_KNOTS], fp: bool) -> i32 {
  for k in 0..NUQ_KNOTS {
    if abs < cuml_bins[k] as i64 {
      return k as i32;
    }
  }
  let rem = abs - cuml_bins[NUQ_KNOTS - 1] as i64;
  let extra = if fp {
    (rem * quant_fp as i64) >> 16
  } else {
    rem / step as i64
  };
  NUQ_KNOTS as i32 + extra as i32
}

fn nuq_write(c: i32, q: i32, step: i32, dqv: &[i32; NUQ_KNOTS + 1], log_scale: u32,
             qcoeff: &mut i32, dqcoeff: &mut i32) {
  *qcoeff = apply_sign(q, c < 0);
  *dqcoeff = apply_sign(round2(dequant_abscoeff_nuq(q, step, dqv), log_scale), c < 0);
}

fn quantize_nuq_impl(coeff: &[i32], n: usize, pq: &PlaneQuant, profile: &NuqProfile,
                     qcoeff: &mut [i32], dqcoeff: &mut [i32], scan: &[u16],
                     tx_size: TxSize, fp: bool) -> usize {
  let log_scale = tx_size.log_scale();
  qcoeff[..n].fill(0);
  dqcoeff[..n].fill(0);
  let mut eob = 0;
  for i in 0..n {
    let rc = scan[i] as usize;
    let idx = (rc != 0) as usize;
    let band = band_translate(tx_size, i);
    let step = pq.dequant[idx] as i32;
    let c = coeff[rc];
    let abs = (c.abs() as i64) << log_scale;
    let q = nuq_level(abs, step, pq.quant_fp[idx], &profile.cuml_bins[band], fp);
    if q != 0 {
      nuq_write(c, q, step, &profile.dequant_val[band], log_scale, &mut qcoeff[rc], &mut dqcoeff[rc]);
      eob = i + 1;
    }
  }
  eob
}

pub fn quantize_nuq(coeff: &[i32], n: usize, pq: &PlaneQuant, profile: &NuqProfile,
                    qcoeff: &mut [i32], dqcoeff: &mut [i32], scan: &[u16], tx_size: TxSize) -> usize {
  quantize_nuq_impl(coeff, n, pq, profile, qcoeff, dqcoeff, scan, tx_size, false)
}

pub fn quantize_fp_nuq(coeff: &[i32], n: usize, pq: &PlaneQuant, profile: &NuqProfile,
                       qcoeff: &mut [i32], dqcoeff: &mut [i32], scan: &[u16], tx_size: TxSize) -> usize {
  quantize_nuq_impl(coeff, n, pq, profile, qcoeff, dqcoeff, scan, tx_size, true)
}

fn quantize_dc_nuq_impl(coeff: &[i32], n: usize, pq: &PlaneQuant, profile: &NuqProfile,
                        qcoeff: &mut [i32], dqcoeff: &mut [i32], tx_size: TxSize, fp: bool) -> usize {
  let log_scale = tx_size.log_scale();
  qcoeff[..n].fill(0);
  dqcoeff[..n].fill(0);
  let step = pq.dequant[0] as i32;
  let c = coeff[0];
  let abs = (c.abs() as i64) << log_scale;
  let q = nuq_level(abs, step, pq.quant_fp[0], &profile.cuml_bins[0], fp);
  if q == 0 {
    return 0;
  }
  nuq_write(c, q, step, &profile.dequant_val[0], log_scale, &mut qcoeff[0], &mut dqcoeff[0]);
  1
}

pub fn quantize_dc_nuq(coeff: &[i32], n: usize, pq: &PlaneQuant, profile: &NuqProfile,
                       qcoeff: &mut [i32], dqcoeff: &mut [i32], tx_size: TxSize) -> usize {
  quantize_dc_nuq_impl(coeff, n, pq, profile, qcoeff, dqcoeff, tx_size, false)
}

pub fn quantize_dc_fp_nuq(coeff: &[i32], n: usize, pq: &PlaneQuant, profile: &NuqProfile,
                          qcoeff: &mut [i32], dqcoeff: &mut [i32], tx_size: TxSize) -> usize {
  quantize_dc_nuq_impl(coeff, n, pq, profile, qcoeff, dqcoeff, tx_size, true)
}

#[cfg(test)]
mod tests {
  use super::*;

  const scan_identity: [u16; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

  #[test]
  fn test_quantize_fp_rounds_to_nearest() {
    let pq = PlaneQuant::new(16, 20);
    let mut coeff = [0i32; 16];
    coeff[0] = 23; // 1.44 steps
    coeff[3] = -31; // -1.55 steps
    coeff[5] = 9; // 0.45 steps
    let mut q = [1i32; 16];
    let mut dq = [1i32; 16];
    let eob = quantize_fp(&coeff, 16, &pq, &mut q, &mut dq, &scan_identity, 0);
    assert_eq!(q[0], 1);
    assert_eq!(q[3], -2);
    assert_eq!(dq[3], -40);
    assert_eq!(q[5], 0);
    assert_eq!(eob, 4);
  }

  #[test]
  fn test_quantize_b_dead_zone() {
    let pq = PlaneQuant::new(16, 20);
    let mut coeff = [0i32; 16];
    coeff[1] = 12; // below the zero bin of 13
    let mut q = [0i32; 16];
    let mut dq = [0i32; 16];
    let eob = quantize_b(&coeff, 16, &pq, &mut q, &mut dq, &scan_identity, 0);
    assert_eq!(q[1], 0);
    assert_eq!(eob, 0);

    coeff[2] = 14; // (14 + 7) / 20
    coeff[4] = -33; // (33 + 7) / 20
    let eob = quantize_b(&coeff, 16, &pq, &mut q, &mut dq, &scan_identity, 0);
    assert_eq!(q[1], 0);
    assert_eq!(q[2], 1);
    assert_eq!(dq[2], 20);
    assert_eq!(q[4], -2);
    assert_eq!(dq[4], -40);
    assert_eq!(eob, 5);
  }

  #[test]
  fn test_unit_step_is_exact() {
    let pq = PlaneQuant::new(1, 1);
    let coeff: Vec<i32> = (0..16).map(|i| i * 7 - 50).collect();
    let mut q = [0i32; 16];
    let mut dq = [0i32; 16];
    quantize_fp(&coeff, 16, &pq, &mut q, &mut dq, &scan_identity, 0);
    assert_eq!(&q[..], &coeff[..]);
    quantize_b(&coeff, 16, &pq, &mut q, &mut dq, &scan_identity, 0);
    assert_eq!(&dq[..], &coeff[..]);
  }

  #[test]
  fn test_log_scale_halves_reconstruction() {
    let pq = PlaneQuant::new(40, 40);
    let mut coeff = [0i32; 16];
    coeff[0] = 40;
    let mut q = [0i32; 16];
    let mut dq = [0i32; 16];
    quantize_fp(&coeff, 16, &pq, &mut q, &mut dq, &scan_identity, 1);
    assert_eq!(q[0], 2);
    assert_eq!(dq[0], 40);
  }

  #[test]
  fn test_quantize_dc_ignores_ac() {
    let pq = PlaneQuant::new(10, 10);
    let coeff = [25i32; 16];
    let mut q = [3i32; 16];
    let mut dq = [3i32; 16];
    let eob = quantize_dc(&coeff, 16, &pq, &mut q, &mut dq, 0);
    assert_eq!(eob, 1);
    assert_eq!(q[0], 2);
    assert!(q[1..].iter().all(|&v| v == 0));
    assert!(dq[1..].iter().all(|&v| v == 0));
  }

  #[test]
  fn test_quantize_skip_zeroes() {
    let mut q = [3i32; 16];
    let mut dq = [3i32; 16];
    assert_eq!(quantize_skip(16, &mut q, &mut dq), 0);
    assert!(q.iter().chain(dq.iter()).all(|&v| v == 0));
  }

  #[test]
  fn test_nuq_levels_and_reconstruction() {
    let pq = PlaneQuant::new(128, 128);
    let profile = &pq.nuq[0];
    // Bins: [0, 84) -> 0, [84, 212) -> 1, [212, 340) -> 2, then steps of 128
    assert_eq!(profile.cuml_bins[1], [84, 212, 340]);
    assert_eq!(profile.dequant_val[1], [0, 148, 276, 404]);

    let mut coeff = [0i32; 16];
    coeff[0] = 83;
    coeff[1] = -100;
    coeff[2] = 600;
    let mut q = [0i32; 16];
    let mut dq = [0i32; 16];
    let eob = quantize_nuq(&coeff, 16, &pq, profile, &mut q, &mut dq, &scan_identity, TxSize::TX_4X4);
    assert_eq!(q[0], 0);
    assert_eq!(q[1], -1);
    assert_eq!(dq[1], -148);
    assert_eq!(q[2], 5);
    assert_eq!(dq[2], dequant_abscoeff_nuq(5, 128, &profile.dequant_val[1]));
    assert_eq!(dq[2], 404 + 2 * 128);
    assert_eq!(eob, 3);
  }

  #[test]
  fn test_dq_profile_selection() {
    assert_eq!(dq_profile_from_ctx(100, 0, true, PlaneType::Y), 0);
    assert_eq!(dq_profile_from_ctx(100, 1, true, PlaneType::Y), 1);
    assert_eq!(dq_profile_from_ctx(100, 2, false, PlaneType::Y), 2);
    assert_eq!(dq_profile_from_ctx(100, 2, false, PlaneType::UV), 0);
    assert_eq!(dq_profile_from_ctx(0, 2, false, PlaneType::Y), 0);
  }
}
