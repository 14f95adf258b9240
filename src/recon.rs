// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Reconstruction functions: prediction, residual formation, and adding the
// inverse-transformed residual back onto the prediction

use crate::array2d::Array2D;
use crate::consts::MAX_TX_SQUARE;
use crate::enums::*;
use crate::frame::Pixel;
use crate::txfm::{InvTxfmParam, Transform};
use crate::util::*;

// Largest intra-predicted block
const MAX_PRED_SIZE: usize = 64;

pub trait IntraPredictor<T: Pixel> {
  // Predict the size x size block at (y0, x0) of `pixels` in place, from
  // already-reconstructed neighbours in the same buffer
  fn predict(&self, pixels: &mut Array2D<T>, mode: PredictionMode,
             y0: usize, x0: usize, size: usize, bit_depth: u32);
}

// Predictor using the row above and the column to the left of the block.
// For now, as we only ever use one tile, neighbour availability is simply
// whether the block touches the top or left edge of the plane.
pub struct EdgePredictor;

impl<T: Pixel> IntraPredictor<T> for EdgePredictor {
  fn predict(&self, pixels: &mut Array2D<T>, mode: PredictionMode,
             y0: usize, x0: usize, size: usize, bit_depth: u32) {
    assert!(size <= MAX_PRED_SIZE);
    let haveAbove = y0 > 0;
    let haveLeft = x0 > 0;
    let base = 1i32 << (bit_depth - 1);

    let mut above = [base - 1; MAX_PRED_SIZE];
    let mut left = [base + 1; MAX_PRED_SIZE];
    if haveAbove {
      for j in 0..size {
        above[j] = pixels[y0 - 1][x0 + j].into();
      }
    }
    if haveLeft {
      for i in 0..size {
        left[i] = pixels[y0 + i][x0 - 1].into();
      }
    }
    let above_left: i32 = if haveAbove && haveLeft {
      pixels[y0 - 1][x0 - 1].into()
    } else {
      base
    };

    match mode {
      PredictionMode::DC_PRED => {
        let sum_above: i32 = above[..size].iter().sum();
        let sum_left: i32 = left[..size].iter().sum();
        let s = size as i32;
        let avg = if haveAbove && haveLeft {
          (sum_above + sum_left + s) / (2 * s)
        } else if haveAbove {
          (sum_above + s / 2) / s
        } else if haveLeft {
          (sum_left + s / 2) / s
        } else {
          base
        };
        let pred = T::from_i32(clip_pixel(avg, bit_depth));
        pixels.fill_region(y0, x0, size, size, &pred);
      },
      PredictionMode::V_PRED => {
        for i in 0..size {
          for j in 0..size {
            pixels[y0 + i][x0 + j] = T::from_i32(clip_pixel(above[j], bit_depth));
          }
        }
      },
      PredictionMode::H_PRED => {
        for i in 0..size {
          let pred = T::from_i32(clip_pixel(left[i], bit_depth));
          pixels[y0 + i][x0 .. x0 + size].fill(pred);
        }
      },
      PredictionMode::TM_PRED => {
        for i in 0..size {
          for j in 0..size {
            let v = left[i] + above[j] - above_left;
            pixels[y0 + i][x0 + j] = T::from_i32(clip_pixel(v, bit_depth));
          }
        }
      },
    }
  }
}

// residual = source - prediction over an h x w region, written to a
// residual buffer with the given stride
pub fn subtract_block<T: Pixel>(h: usize, w: usize, diff: &mut [i16], diff_stride: usize,
                                src: &Array2D<T>, pred: &Array2D<T>, y0: usize, x0: usize) {
  for i in 0..h {
    let src_row = &src[y0 + i][x0 .. x0 + w];
    let pred_row = &pred[y0 + i][x0 .. x0 + w];
    let diff_row = &mut diff[i * diff_stride .. i * diff_stride + w];
    for j in 0..w {
      let s: i32 = src_row[j].into();
      let p: i32 = pred_row[j].into();
      diff_row[j] = (s - p) as i16;
    }
  }
}

// Inverse transform the dequantized coefficients and add the result onto
// the prediction at (y0, x0)
pub fn inv_txfm_add<T: Pixel, X: Transform + ?Sized>(txfm: &X, dqcoeff: &[i32], dst: &mut Array2D<T>,
                                                      y0: usize, x0: usize, param: &InvTxfmParam) {
  let n = param.tx_size.width();
  let mut residual = [0i32; MAX_TX_SQUARE];
  txfm.inverse(dqcoeff, &mut residual, param);

  for i in 0..n {
    let row = &mut dst[y0 + i][x0 .. x0 + n];
    for j in 0..n {
      let p: i32 = row[j].into();
      row[j] = T::from_i32(clip_pixel(p + residual[i * n + j], param.bit_depth));
    }
  }
}
