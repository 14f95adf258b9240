// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Trellis optimization of quantized coefficients
//
// Starting from an already-quantized block, each nonzero coefficient may
// either keep its value or be lowered by one step in magnitude. The block
// is walked backwards from the end-of-block, keeping two candidate paths per
// scan position, and the path with the lowest rate-distortion cost is
// written back.

use tracing::trace;

use crate::consts::*;
use crate::costs::*;
use crate::enums::*;
use crate::quantize::*;
use crate::scan::ScanOrder;
use crate::util::round2;

#[derive(Clone, Copy, Debug)]
struct TokenState {
  rate: i64,
  error: i64,
  // Scan index of the next node on this path
  next: usize,
  token: Token,
  qc: i32,
  dqc: i32,
}

const EMPTY_STATE: TokenState = TokenState {
  rate: 0,
  error: 0,
  next: 0,
  token: Token::EOB_TOKEN,
  qc: 0,
  dqc: 0
};

// Scratch space for the trellis, allocated once and reused for every block
pub struct TrellisWorkspace {
  tokens: Box<[[TokenState; 2]]>,
  best_index: Box<[[u8; 2]]>,
  token_cache: Box<[u8]>,
}

impl TrellisWorkspace {
  pub fn new() -> Self {
    Self {
      tokens: vec![[EMPTY_STATE; 2]; MAX_TX_SQUARE + 1].into_boxed_slice(),
      best_index: vec![[0u8; 2]; MAX_TX_SQUARE + 1].into_boxed_slice(),
      token_cache: vec![0u8; MAX_TX_SQUARE].into_boxed_slice(),
    }
  }
}

impl Default for TrellisWorkspace {
  fn default() -> Self {
    Self::new()
  }
}

// Everything about the block being optimized other than its coefficients
pub struct TrellisParams<'a> {
  pub plane: usize,
  pub plane_type: PlaneType,
  pub tx_size: TxSize,
  pub is_inter: bool,
  // Entropy context of the block, from its above and left neighbours
  pub ctx: usize,
  pub scan_order: &'a ScanOrder,
  pub token_costs: &'a TokenCosts,
  // DC and AC quantizer steps
  pub dequant: [i16; 2],
  // Non-uniform quantizer profile, if the block was quantized with one
  pub nuq: Option<&'a NuqProfile>,
  pub rdmult: i64,
  pub rddiv: u32,
  pub bit_depth: u32,
}

// Walks the coefficient bands backwards in step with the scan position.
// The band changes one position later than band_translate() would suggest;
// the cost tables are trained with this offset.
struct BandCursor {
  band: usize,
  band_left: usize,
  tx_size: TxSize,
}

impl BandCursor {
  fn new(tx_size: TxSize, eob: usize) -> Self {
    let default_eob = tx_size.area();
    let band = if eob < default_eob {
      band_translate(tx_size, eob)
    } else {
      band_translate(tx_size, eob - 1)
    };
    let band_left = eob + 1 - band_cum_count_table[tx_size as usize][band] as usize;
    Self {
      band: band,
      band_left: band_left,
      tx_size: tx_size
    }
  }

  fn step(&mut self) {
    self.band_left -= 1;
    if self.band_left == 0 {
      self.band -= 1;
      self.band_left = band_count_table[self.tx_size as usize][self.band] as usize;
    }
  }
}

// Optimize the coefficients of one transform block in place.
// Returns the new end-of-block, which is never larger than `eob`.
pub fn optimize_b(ws: &mut TrellisWorkspace, coeff: &[i32], qcoeff: &mut [i32], dqcoeff: &mut [i32],
                  eob: usize, params: &TrellisParams) -> usize {
  let tx_size = params.tx_size;
  let default_eob = tx_size.area();
  let plane_type = params.plane_type;
  let shift = tx_size.log_scale();
  let hbd_shift = params.bit_depth - 8;
  let scan = &params.scan_order.scan;
  let costs = params.token_costs;
  let dequant = [params.dequant[0] as i32, params.dequant[1] as i32];
  let dq_step = [dequant[0] >> shift, dequant[1] >> shift];
  let rdmult = (params.rdmult * plane_rd_mult[params.is_inter as usize][plane_type as usize]) >> 1;
  let rddiv = params.rddiv;

  assert!((params.plane == 0) == (plane_type == PlaneType::Y));
  assert!(eob <= default_eob);

  let TrellisWorkspace { tokens, best_index, token_cache } = ws;
  let mut bands = BandCursor::new(tx_size, eob);

  // Sentinel node at the end-of-block
  tokens[eob][0] = TokenState {
    rate: 0,
    error: 0,
    next: default_eob,
    token: Token::EOB_TOKEN,
    qc: 0,
    dqc: 0
  };
  tokens[eob][1] = tokens[eob][0];

  for i in 0..eob {
    let rc = scan[i] as usize;
    let (rate, t) = token_value_cost(qcoeff[rc], params.bit_depth);
    tokens[i][0].rate = rate as i64;
    tokens[i][0].token = t;
    token_cache[rc] = t.energy_class();
  }

  let mut next = eob;
  let mut shortcut = false;

  for i in (0..eob).rev() {
    let rc = scan[i] as usize;
    let idx = (rc != 0) as usize;
    let band_costs = &costs[bands.band];
    let mut x = qcoeff[rc];
    let next_shortcut = shortcut;

    if x != 0 {
      let error0 = tokens[next][0].error;
      let error1 = tokens[next][1].error;

      // Keep this coefficient as it is
      let mut rate0 = tokens[next][0].rate;
      let mut rate1 = tokens[next][1].rate;
      let mut best;
      if next_shortcut {
        if next < default_eob {
          let pt = params.scan_order.coef_context(&token_cache[..], i + 1);
          rate0 += band_costs[0][pt][tokens[next][0].token as usize] as i64;
          rate1 += band_costs[0][pt][tokens[next][1].token as usize] as i64;
        }
        best = rdcost(rdmult, rddiv, rate1, error1) < rdcost(rdmult, rddiv, rate0, error0);
      } else {
        if next < default_eob {
          let pt = params.scan_order.coef_context(&token_cache[..], i + 1);
          rate0 += band_costs[0][pt][tokens[next][0].token as usize] as i64;
        }
        best = false;
      }

      let mut dx = (dqcoeff[rc] - coeff[rc]) * (1 << shift);
      dx >>= hbd_shift;
      let d2 = dx as i64 * dx as i64;
      tokens[i][0].rate += if best { rate1 } else { rate0 };
      tokens[i][0].error = d2 + if best { error1 } else { error0 };
      tokens[i][0].next = next;
      tokens[i][0].qc = x;
      tokens[i][0].dqc = dqcoeff[rc];
      best_index[i][0] = best as u8;

      // Lower the magnitude by one step, if that might pay off
      let mut rate0 = tokens[next][0].rate;
      let mut rate1 = tokens[next][1].rate;

      let abs_x = x.abs();
      let abs_c = coeff[rc].abs() << shift;
      shortcut = if abs_x > 3 {
        false
      } else if let Some(profile) = params.nuq {
        let dqv = &profile.dequant_val[band_translate(tx_size, i)];
        dequant_abscoeff_nuq(abs_x, dequant[idx], dqv) > abs_c &&
          dequant_abscoeff_nuq(abs_x - 1, dequant[idx], dqv) < abs_c
      } else {
        abs_x * dequant[idx] > abs_c && abs_x * dequant[idx] < abs_c + dequant[idx]
      };

      if !shortcut {
        tokens[i][1] = tokens[i][0];
        best_index[i][1] = best_index[i][0];
        next = i;
        bands.step();
        continue;
      }

      let sz = -((x < 0) as i32);
      x -= 2 * sz + 1;

      let (base_bits, t0, t1) = if x == 0 {
        // Dropping to zero may move the end-of-block back to here
        let t0 = if tokens[next][0].token == Token::EOB_TOKEN { Token::EOB_TOKEN } else { Token::ZERO_TOKEN };
        let t1 = if tokens[next][1].token == Token::EOB_TOKEN { Token::EOB_TOKEN } else { Token::ZERO_TOKEN };
        (0, t0, t1)
      } else {
        let (bits, t) = token_value_cost(x, params.bit_depth);
        (bits as i64, t, t)
      };
      let after_zero = (x == 0) as usize;

      if next_shortcut {
        if next < default_eob {
          if t0 != Token::EOB_TOKEN {
            token_cache[rc] = t0.energy_class();
            let pt = params.scan_order.coef_context(&token_cache[..], i + 1);
            rate0 += band_costs[after_zero][pt][tokens[next][0].token as usize] as i64;
          }
          if t1 != Token::EOB_TOKEN {
            token_cache[rc] = t1.energy_class();
            let pt = params.scan_order.coef_context(&token_cache[..], i + 1);
            rate1 += band_costs[after_zero][pt][tokens[next][1].token as usize] as i64;
          }
        }
        best = rdcost(rdmult, rddiv, rate1, error1) < rdcost(rdmult, rddiv, rate0, error0);
      } else {
        // Both successor states are identical
        if next < default_eob && t0 != Token::EOB_TOKEN {
          token_cache[rc] = t0.energy_class();
          let pt = params.scan_order.coef_context(&token_cache[..], i + 1);
          rate0 += band_costs[after_zero][pt][tokens[next][0].token as usize] as i64;
        }
        best = false;
      }

      if let Some(profile) = params.nuq {
        let dqv = &profile.dequant_val[band_translate(tx_size, i)];
        dx = dequant_coeff_nuq(x, dequant[idx], dqv) - (coeff[rc] << shift);
        dx >>= hbd_shift;
      } else {
        dx -= ((dequant[idx] >> hbd_shift) + sz) ^ sz;
      }
      let d2 = dx as i64 * dx as i64;

      tokens[i][1].rate = base_bits + if best { rate1 } else { rate0 };
      tokens[i][1].error = d2 + if best { error1 } else { error0 };
      tokens[i][1].next = next;
      tokens[i][1].token = if best { t1 } else { t0 };
      tokens[i][1].qc = x;

      tokens[i][1].dqc = if x == 0 {
        0
      } else if let Some(profile) = params.nuq {
        let dqv = &profile.dequant_val[band_translate(tx_size, i)];
        let dqc = round2(dequant_abscoeff_nuq(x.abs(), dequant[idx], dqv), shift);
        if sz != 0 { -dqc } else { dqc }
      } else {
        let mut offset = dq_step[idx];
        // 32x32 coefficients use a half step; dropping from an even to an odd
        // level picks up the rounding difference of an odd step
        if (shift as i32 & x) != 0 {
          offset += dequant[idx] & 1;
        }
        if sz == 0 { dqcoeff[rc] - offset } else { dqcoeff[rc] + offset }
      };

      best_index[i][1] = best as u8;
      next = i;
    } else {
      // No choice to make for a zero coefficient, but every path past the
      // end-of-block now codes one more zero token
      for path in 0..2 {
        let t = tokens[next][path].token;
        if t != Token::EOB_TOKEN {
          let pt = params.scan_order.coef_context(&token_cache[..], i + 1);
          tokens[next][path].rate += band_costs[1][pt][t as usize] as i64;
          tokens[next][path].token = Token::ZERO_TOKEN;
        }
      }
      best_index[i] = [0, 0];
      shortcut = tokens[next][0].rate != tokens[next][1].rate;
    }

    bands.step();
  }

  // Pick the best path through the whole trellis
  let band_costs = &costs[bands.band];
  let rate0 = tokens[next][0].rate + band_costs[0][params.ctx][tokens[next][0].token as usize] as i64;
  let rate1 = tokens[next][1].rate + band_costs[0][params.ctx][tokens[next][1].token as usize] as i64;
  let mut best = (rdcost(rdmult, rddiv, rate1, tokens[next][1].error) <
                  rdcost(rdmult, rddiv, rate0, tokens[next][0].error)) as usize;

  let mut final_eob = 0;
  let mut i = next;
  while i < eob {
    let state = tokens[i][best];
    let rc = scan[i] as usize;
    if state.qc != 0 {
      final_eob = i + 1;
    }
    qcoeff[rc] = state.qc;
    dqcoeff[rc] = state.dqc;
    best = best_index[i][best] as usize;
    i = state.next;
  }

  trace!(plane = params.plane, tx_size = ?tx_size, eob, final_eob, "trellis");
  assert!(final_eob <= eob);
  final_eob
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::scan::ScanTables;

  // Costs which depend only on the token: ONE_TOKEN is free and end-of-block
  // costs `eob_cost`
  fn flat_costs(eob_cost: u32) -> CoeffCosts {
    CoeffCosts::from_fn(|_, _, _, _, _, _, token| match token {
      Token::EOB_TOKEN => eob_cost,
      Token::ONE_TOKEN => 0,
      _ => 700,
    })
  }

  fn run_dc_block(costs: &CoeffCosts, coeff_dc: i32, q_dc: i32, dequant: i16) -> (usize, i32, i32) {
    let scans = ScanTables::new();
    let scan_order = scans.get(TxSize::TX_4X4, TxType::DCT_DCT, false);
    let mut coeff = [0i32; 16];
    let mut qcoeff = [0i32; 16];
    let mut dqcoeff = [0i32; 16];
    coeff[0] = coeff_dc;
    qcoeff[0] = q_dc;
    dqcoeff[0] = q_dc * dequant as i32;
    let params = TrellisParams {
      plane: 0,
      plane_type: PlaneType::Y,
      tx_size: TxSize::TX_4X4,
      is_inter: false,
      ctx: 0,
      scan_order: scan_order,
      token_costs: costs.get(TxSize::TX_4X4, PlaneType::Y, false),
      dequant: [dequant, dequant],
      nuq: None,
      rdmult: 1024,
      rddiv: 0,
      bit_depth: 8
    };
    let mut ws = TrellisWorkspace::new();
    let eob = optimize_b(&mut ws, &coeff, &mut qcoeff, &mut dqcoeff, 1, &params);
    (eob, qcoeff[0], dqcoeff[0])
  }

  #[test]
  fn test_large_coefficient_is_kept() {
    let costs = CoeffCosts::default_model();
    assert_eq!(run_dc_block(&costs, 400, 5, 80), (1, 5, 400));
    assert_eq!(run_dc_block(&costs, -330, -4, 80), (1, -4, -320));
  }

  #[test]
  fn test_tie_between_keep_and_zero_keeps() {
    // Keeping costs one sign bit (5120 after scaling) plus an error of 8^2;
    // zeroing costs an error of 72^2 = 5184. Equal costs favour keeping.
    let costs = flat_costs(300);
    assert_eq!(run_dc_block(&costs, 72, 1, 80), (1, 1, 80));
  }

  #[test]
  fn test_cheaper_zero_is_chosen() {
    // 5120 + 9^2 against 71^2
    let costs = flat_costs(300);
    assert_eq!(run_dc_block(&costs, 71, 1, 80), (0, 0, 0));
    let costs = flat_costs(0);
    assert_eq!(run_dc_block(&costs, -71, -1, 80), (0, 0, 0));
  }

  #[test]
  fn test_all_zero_block_is_untouched() {
    let scans = ScanTables::new();
    let costs = CoeffCosts::default_model();
    let coeff = [3i32; 64];
    let mut qcoeff = [0i32; 64];
    let mut dqcoeff = [0i32; 64];
    let params = TrellisParams {
      plane: 1,
      plane_type: PlaneType::UV,
      tx_size: TxSize::TX_8X8,
      is_inter: true,
      ctx: 2,
      scan_order: scans.get(TxSize::TX_8X8, TxType::DCT_DCT, true),
      token_costs: costs.get(TxSize::TX_8X8, PlaneType::UV, true),
      dequant: [40, 48],
      nuq: None,
      rdmult: 300,
      rddiv: 7,
      bit_depth: 8
    };
    let mut ws = TrellisWorkspace::new();
    assert_eq!(optimize_b(&mut ws, &coeff, &mut qcoeff, &mut dqcoeff, 0, &params), 0);
    assert!(qcoeff.iter().all(|&v| v == 0));
    assert!(dqcoeff.iter().all(|&v| v == 0));
  }

  #[test]
  fn test_band_cursor_lands_on_dc_band() {
    for tx_size in TxSize::ALL {
      for eob in 0..=tx_size.area() {
        let mut bands = BandCursor::new(tx_size, eob);
        for _ in 0..eob {
          bands.step();
        }
        assert_eq!(bands.band, 0);
      }
    }
  }
}
