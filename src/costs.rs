// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Rate estimation for coefficient tokens
//
// All rates are in units of 1/512 bit (see AV1_PROB_COST_SHIFT).

use crate::consts::*;
use crate::enums::*;
use crate::util::*;

// Token costs for one (tx size, plane type, ref type) combination,
// indexed by [band][previous token was zero][context][token]
pub type TokenCosts = [[[[u32; ENTROPY_TOKENS]; COEFF_CONTEXTS]; 2]; COEF_BANDS];

pub struct CoeffCosts {
  tables: Box<[TokenCosts]>,
}

fn table_index(tx_size: TxSize, plane_type: PlaneType, is_inter: bool) -> usize {
  ((tx_size as usize) * PLANE_TYPES + plane_type as usize) * REF_TYPES + is_inter as usize
}

impl CoeffCosts {
  // Build tables from a cost function of
  // (tx size, plane type, is_inter, band, after_zero, context, token)
  pub fn from_fn<F>(mut f: F) -> Self
  where
    F: FnMut(TxSize, PlaneType, bool, usize, bool, usize, Token) -> u32
  {
    let n = TX_SIZES * PLANE_TYPES * REF_TYPES;
    let mut tables = vec![[[[[0u32; ENTROPY_TOKENS]; COEFF_CONTEXTS]; 2]; COEF_BANDS]; n].into_boxed_slice();
    for tx_size in TxSize::ALL {
      for plane_type in [PlaneType::Y, PlaneType::UV] {
        for is_inter in [false, true] {
          let table = &mut tables[table_index(tx_size, plane_type, is_inter)];
          for band in 0..COEF_BANDS {
            for after_zero in 0..2 {
              for ctx in 0..COEFF_CONTEXTS {
                for tok in 0..ENTROPY_TOKENS {
                  table[band][after_zero][ctx][tok] =
                    f(tx_size, plane_type, is_inter, band, after_zero == 1, ctx, ALL_TOKENS[tok]);
                }
              }
            }
          }
        }
      }
    }
    Self { tables: tables }
  }

  // A plausible static probability model: end-of-block becomes likelier in
  // later bands, zeros likelier in quiet contexts, and magnitudes decay
  // geometrically with a slower decay in busy contexts
  pub fn default_model() -> Self {
    Self::from_fn(|tx_size, plane_type, is_inter, band, after_zero, ctx, token| {
      let busy = ctx as f64 / (COEFF_CONTEXTS - 1) as f64;
      let late = band as f64 / (COEF_BANDS - 1) as f64;
      let size_bias = 0.03 * tx_size as usize as f64;
      let chroma_bias = if plane_type == PlaneType::UV { 0.05 } else { 0.0 };
      let inter_bias = if is_inter { 0.03 } else { 0.0 };

      let p_eob = if after_zero {
        0.0
      } else {
        clamp(0.08 + 0.45 * late - 0.3 * busy + chroma_bias + inter_bias - size_bias, 0.02, 0.9)
      };
      let p_zero = (1.0 - p_eob) * clamp(0.25 + 0.35 * late - 0.2 * busy + chroma_bias, 0.05, 0.9);
      let p_nonzero = 1.0 - p_eob - p_zero;

      let ratio = 0.3 + 0.3 * busy;
      let nonzero_tokens = (Token::CATEGORY6_TOKEN as usize) - (Token::ONE_TOKEN as usize) + 1;
      let norm: f64 = (0..nonzero_tokens).map(|k| ratio.powi(k as i32)).sum();

      let p = match token {
        Token::EOB_TOKEN => p_eob,
        Token::ZERO_TOKEN => p_zero,
        _ => p_nonzero * ratio.powi(token as i32 - Token::ONE_TOKEN as i32) / norm,
      };

      if p <= 0.0 {
        // Never coded; make it prohibitively expensive
        1 << 20
      } else {
        (-p.log2() * (1 << AV1_PROB_COST_SHIFT) as f64).round() as u32
      }
    })
  }

  pub fn get(&self, tx_size: TxSize, plane_type: PlaneType, is_inter: bool) -> &TokenCosts {
    &self.tables[table_index(tx_size, plane_type, is_inter)]
  }
}

const ALL_TOKENS: [Token; ENTROPY_TOKENS] = [
  Token::ZERO_TOKEN, Token::ONE_TOKEN, Token::TWO_TOKEN, Token::THREE_TOKEN,
  Token::FOUR_TOKEN, Token::CATEGORY1_TOKEN, Token::CATEGORY2_TOKEN, Token::CATEGORY3_TOKEN,
  Token::CATEGORY4_TOKEN, Token::CATEGORY5_TOKEN, Token::CATEGORY6_TOKEN, Token::EOB_TOKEN
];

// (first value, number of extra bits) of each category token
const cat_info: [(i32, u32); 6] = [(5, 1), (7, 2), (11, 3), (19, 4), (35, 5), (CAT6_MIN_VAL, 14)];

// Token of a coefficient value, and the cost of everything coded alongside
// the token itself: the category extra bits and the sign
pub fn token_value_cost(v: i32, bit_depth: u32) -> (u32, Token) {
  let a = v.abs();
  let one_bit = 1u32 << AV1_PROB_COST_SHIFT;
  if a == 0 {
    return (0, Token::ZERO_TOKEN);
  }
  if a <= 4 {
    return (one_bit, ALL_TOKENS[a as usize]);
  }
  let mut cat = cat_info.len() - 1;
  while a < cat_info[cat].0 {
    cat -= 1;
  }
  let mut extra_bits = cat_info[cat].1;
  if cat == cat_info.len() - 1 {
    // Category 6 widens with the coefficient range
    extra_bits += bit_depth - 8;
  }
  let token = ALL_TOKENS[Token::CATEGORY1_TOKEN as usize + cat];
  ((1 + extra_bits) * one_bit, token)
}

// Combined rate-distortion cost
pub fn rdcost(rdmult: i64, rddiv: u32, rate: i64, dist: i64) -> i64 {
  round2(rate * rdmult, AV1_PROB_COST_SHIFT) + (dist << rddiv)
}
