// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Residual coding of a coding unit: subtract the prediction, transform,
// quantize, optimize, and reconstruct

use tracing::{debug, trace};

use crate::block::*;
use crate::config::*;
use crate::consts::*;
use crate::context::*;
use crate::costs::CoeffCosts;
use crate::enums::*;
use crate::error::Result;
use crate::frame::{Frame, Pixel, Plane};
use crate::quantize::*;
use crate::recon::*;
use crate::scan::ScanTables;
use crate::trellis::*;
use crate::txfm::*;

// Transform type of a block. Lossless blocks and 32x32 transforms always
// use DCT_DCT; chroma follows the chroma prediction mode for intra units.
pub fn get_tx_type(mb: &Macroblock, plane_type: PlaneType, tx_size: TxSize) -> TxType {
  if mb.lossless || tx_size == TxSize::TX_32X32 {
    TxType::DCT_DCT
  } else if plane_type == PlaneType::Y {
    mb.mi.tx_type
  } else if mb.mi.is_inter {
    TxType::DCT_DCT
  } else {
    mb.mi.uv_mode.intra_tx_type()
  }
}

// Residual of a whole plane block against the prediction already in `dst`
pub fn subtract_plane<T: Pixel>(mb: &mut Macroblock, plane: usize, src: &Plane<T>, dst: &Plane<T>) {
  let bw = mb.plane_bsize(plane).width();
  let (y0, x0) = mb.plane_origin(plane);
  subtract_block(bw, bw, &mut mb.planes[plane].src_diff, bw, src.pixels(), dst.pixels(), y0, x0);
}

pub struct Encoder<X: Transform = ReferenceTransform> {
  pub config: EncoderConfig,
  scans: ScanTables,
  costs: CoeffCosts,
  txfm: X,
  trellis: TrellisWorkspace,
}

impl Encoder<ReferenceTransform> {
  pub fn new(config: EncoderConfig) -> Result<Self> {
    Self::with_parts(config, ReferenceTransform::new(), CoeffCosts::default_model())
  }
}

impl<X: Transform> Encoder<X> {
  pub fn with_parts(config: EncoderConfig, txfm: X, costs: CoeffCosts) -> Result<Self> {
    config.validate()?;
    Ok(Self {
      config: config,
      scans: ScanTables::new(),
      costs: costs,
      txfm: txfm,
      trellis: TrellisWorkspace::new()
    })
  }

  pub fn transform(&self) -> &X {
    &self.txfm
  }

  // Forward transform and quantize one block with the given policy,
  // recording its end-of-block. `ctx` is the block's entropy context, which
  // selects the non-uniform quantizer profile.
  pub fn xform_quant(&self, mb: &mut Macroblock, blk: &TxBlock, policy: QuantPolicy, ctx: usize) {
    let plane = blk.plane;
    let tx_size = blk.tx_size;
    let plane_type = PlaneType::from_plane(plane);
    let tx_type = get_tx_type(mb, plane_type, tx_size);
    let is_inter = mb.mi.is_inter;
    let scan_order = self.scans.get(tx_size, tx_type, is_inter);
    let scan = &scan_order.scan[..];
    let n = tx_size.area();
    let log_scale = tx_size.log_scale();
    let diff_stride = blk.plane_bsize.width();
    let qindex = mb.qindex;
    let skip_block = mb.skip_block;

    assert!((qindex == 0) == mb.lossless);

    let p = &mut mb.planes[plane];
    let range = (blk.block << 4) .. (blk.block << 4) + n;
    let coeff = &mut p.coeff[range.clone()];
    let qcoeff = &mut p.qcoeff[range.clone()];
    let dqcoeff = &mut p.dqcoeff[range];

    if policy == QuantPolicy::Skip {
      p.eobs[blk.block] = quantize_skip(n, qcoeff, dqcoeff) as u16;
      return;
    }

    let fwd_param = FwdTxfmParam {
      tx_type: tx_type,
      tx_size: tx_size,
      opt: if policy.is_dc_only() { FwdTxfmOpt::DcOnly } else { FwdTxfmOpt::Normal },
      lowp: self.config.lowp_32x32,
      lossless: mb.lossless,
      bit_depth: mb.bit_depth
    };
    let src_diff = &p.src_diff[4 * (blk.blk_row * diff_stride + blk.blk_col) ..];
    self.txfm.forward(src_diff, diff_stride, coeff, &fwd_param);

    if policy == QuantPolicy::TransformOnly {
      return;
    }

    let pq = &p.quant;
    let profile = &pq.nuq[dq_profile_from_ctx(qindex, ctx, is_inter, plane_type)];
    let eob = if skip_block {
      quantize_skip(n, qcoeff, dqcoeff)
    } else {
      match policy {
        QuantPolicy::Fp => quantize_fp(coeff, n, pq, qcoeff, dqcoeff, scan, log_scale),
        QuantPolicy::B => quantize_b(coeff, n, pq, qcoeff, dqcoeff, scan, log_scale),
        QuantPolicy::Dc => quantize_dc(coeff, n, pq, qcoeff, dqcoeff, log_scale),
        QuantPolicy::Nuq => quantize_nuq(coeff, n, pq, profile, qcoeff, dqcoeff, scan, tx_size),
        QuantPolicy::FpNuq => quantize_fp_nuq(coeff, n, pq, profile, qcoeff, dqcoeff, scan, tx_size),
        QuantPolicy::DcNuq => quantize_dc_nuq(coeff, n, pq, profile, qcoeff, dqcoeff, tx_size),
        QuantPolicy::DcFpNuq => quantize_dc_fp_nuq(coeff, n, pq, profile, qcoeff, dqcoeff, tx_size),
        QuantPolicy::Skip | QuantPolicy::TransformOnly => unreachable!(),
      }
    };
    p.eobs[blk.block] = eob as u16;
  }

  // Run the trellis over a quantized block, returning its new end-of-block
  pub fn optimize_block(&mut self, mb: &mut Macroblock, blk: &TxBlock, ctx: usize, nuq: bool) -> usize {
    let plane = blk.plane;
    let tx_size = blk.tx_size;
    let plane_type = PlaneType::from_plane(plane);
    let tx_type = get_tx_type(mb, plane_type, tx_size);
    let is_inter = mb.mi.is_inter;
    let dq = dq_profile_from_ctx(mb.qindex, ctx, is_inter, plane_type);
    let (rdmult, rddiv, bit_depth) = (mb.rdmult, mb.rddiv, mb.bit_depth);

    assert!((mb.qindex == 0) == mb.lossless);

    let p = &mut mb.planes[plane];
    let params = TrellisParams {
      plane: plane,
      plane_type: plane_type,
      tx_size: tx_size,
      is_inter: is_inter,
      ctx: ctx,
      scan_order: self.scans.get(tx_size, tx_type, is_inter),
      token_costs: self.costs.get(tx_size, plane_type, is_inter),
      dequant: p.quant.dequant,
      nuq: if nuq { Some(&p.quant.nuq[dq]) } else { None },
      rdmult: rdmult,
      rddiv: rddiv,
      bit_depth: bit_depth
    };
    let range = (blk.block << 4) .. (blk.block << 4) + tx_size.area();
    let eob = p.eobs[blk.block] as usize;
    let final_eob = optimize_b(&mut self.trellis, &p.coeff[range.clone()], &mut p.qcoeff[range.clone()],
                               &mut p.dqcoeff[range], eob, &params);
    p.eobs[blk.block] = final_eob as u16;
    final_eob
  }

  fn reconstruct<T: Pixel>(&self, mb: &Macroblock, blk: &TxBlock, dst: &mut Plane<T>) {
    let plane = blk.plane;
    let eob = mb.planes[plane].eobs[blk.block] as usize;
    let param = InvTxfmParam {
      tx_type: get_tx_type(mb, PlaneType::from_plane(plane), blk.tx_size),
      tx_size: blk.tx_size,
      eob: eob,
      lossless: mb.lossless,
      bit_depth: mb.bit_depth
    };
    let (y0, x0) = mb.plane_origin(plane);
    let dqcoeff = mb.planes[plane].dqcoeff_block(blk.block, blk.tx_size);
    inv_txfm_add(&self.txfm, dqcoeff, dst.pixels_mut(), y0 + 4 * blk.blk_row, x0 + 4 * blk.blk_col, &param);
  }

  // Code one transform block of an inter unit whose residual has already
  // been computed. With variable transform sizes the above/left contexts
  // are kept per 4x4 unit, otherwise per transform block.
  fn encode_block<T: Pixel>(&mut self, mb: &mut Macroblock, blk: &TxBlock,
                            ta: &mut [u8; MAX_4X4_CONTEXTS], tl: &mut [u8; MAX_4X4_CONTEXTS],
                            dst: &mut Plane<T>, var_tx: bool) {
    let plane = blk.plane;
    let a = &mut ta[blk.blk_col ..];
    let l = &mut tl[blk.blk_row ..];
    let ctx = if var_tx {
      get_entropy_context(blk.tx_size, a, l)
    } else {
      combine_entropy_contexts(a[0], l[0])
    };

    let policy = if self.config.optimize {
      self.config.optimize_policy()
    } else {
      self.config.plain_policy()
    };
    let skip_idx = blk.blk_row * blk.plane_bsize.width_4x4() + blk.blk_col;
    if var_tx && mb.planes[plane].blk_skip[skip_idx] {
      mb.planes[plane].eobs[blk.block] = 0;
    } else {
      self.xform_quant(mb, blk, policy, ctx);
    }

    let eob = mb.planes[plane].eobs[blk.block] as usize;
    let final_eob = if eob > 0 && self.config.optimize {
      self.optimize_block(mb, blk, ctx, policy.is_nuq())
    } else {
      eob
    };
    trace!(plane, block = blk.block, tx_size = ?blk.tx_size, eob, final_eob, "encode_block");

    let coded = (final_eob > 0) as u8;
    if var_tx {
      let n = blk.tx_size.width_4x4();
      a[..n].fill(coded);
      l[..n].fill(coded);
    } else {
      a[0] = coded;
      l[0] = coded;
    }

    if final_eob == 0 {
      return;
    }
    mb.mi.skip = false;
    self.reconstruct(mb, blk, dst);
  }

  // Variable transform size: split the block into quadrants until the
  // transform size chosen for that area is reached
  fn encode_block_inter<T: Pixel>(&mut self, mb: &mut Macroblock, blk: TxBlock,
                                  ta: &mut [u8; MAX_4X4_CONTEXTS], tl: &mut [u8; MAX_4X4_CONTEXTS],
                                  dst: &mut Plane<T>) {
    let plane = blk.plane;
    let max_blocks_high = mb.max_blocks_high(plane, blk.plane_bsize);
    let max_blocks_wide = mb.max_blocks_wide(plane, blk.plane_bsize);
    if block_outside_visible(blk.blk_row, blk.blk_col, max_blocks_high, max_blocks_wide) {
      return;
    }

    let ss_x = mb.planes[plane].ss_x;
    let ss_y = mb.planes[plane].ss_y;
    let tx_row = blk.blk_row >> (1 - ss_y);
    let tx_col = blk.blk_col >> (1 - ss_x);
    let inter_tx_size = mb.mi.inter_tx_size[tx_row][tx_col];
    let plane_tx_size = if plane == 0 {
      inter_tx_size
    } else {
      std::cmp::min(inter_tx_size, blk.tx_size)
    };

    if blk.tx_size == plane_tx_size || blk.tx_size == TxSize::TX_4X4 {
      self.encode_block(mb, &blk, ta, tl, dst, true);
      return;
    }

    let sub_tx_size = blk.tx_size.split();
    let half = sub_tx_size.width_4x4();
    let step = sub_tx_size.num_4x4();
    for i in 0..4 {
      let blk_row = blk.blk_row + (i >> 1) * half;
      let blk_col = blk.blk_col + (i & 1) * half;
      if block_outside_visible(blk_row, blk_col, max_blocks_high, max_blocks_wide) {
        continue;
      }
      let quadrant = TxBlock {
        block: blk.block + i * step,
        blk_row: blk_row,
        blk_col: blk_col,
        tx_size: sub_tx_size,
        ..blk
      };
      self.encode_block_inter(mb, quadrant, ta, tl, dst);
    }
  }

  // Code the residual of an inter coding unit whose prediction is already
  // in `dst`. Leaves mb.mi.skip set if no block has coefficients, and the
  // unit's own has-coefficient flags in each plane's above/left contexts.
  pub fn encode_sb<T: Pixel>(&mut self, mb: &mut Macroblock, src: &Frame<T>, dst: &mut Frame<T>) {
    mb.mi.skip = true;
    if mb.skip {
      // A skipped unit codes no coefficients, so its own flags are all zero
      for p in mb.planes.iter_mut() {
        p.above_context.fill(0);
        p.left_context.fill(0);
      }
      debug!(y = mb.y, x = mb.x, "unit skipped");
      return;
    }

    let var_tx = self.config.tx_size_selection == TxSizeSelection::Variable && mb.mi.is_inter;
    for plane in 0..MAX_MB_PLANE {
      let plane_bsize = mb.plane_bsize(plane);
      let num_4x4 = plane_bsize.width_4x4();
      let max_blocks_wide = mb.max_blocks_wide(plane, plane_bsize);
      let max_blocks_high = mb.max_blocks_high(plane, plane_bsize);
      let tx_size = mb.mi.plane_tx_size(plane, mb.planes[plane].ss_x);
      let ctx_tx_size = if var_tx { TxSize::TX_4X4 } else { tx_size };
      let (mut ta, mut tl) = get_entropy_contexts(plane_bsize, ctx_tx_size,
                                                  &mb.planes[plane].above_context,
                                                  &mb.planes[plane].left_context,
                                                  max_blocks_wide, max_blocks_high);
      subtract_plane(mb, plane, src.plane(plane), dst.plane(plane));

      if var_tx {
        let max_tx_size = plane_bsize.max_tx_size();
        let bh = max_tx_size.width_4x4();
        let step = max_tx_size.num_4x4();
        let mut block = 0;
        for blk_row in (0..num_4x4).step_by(bh) {
          for blk_col in (0..num_4x4).step_by(bh) {
            let blk = TxBlock {
              plane: plane,
              block: block,
              blk_row: blk_row,
              blk_col: blk_col,
              plane_bsize: plane_bsize,
              tx_size: max_tx_size
            };
            self.encode_block_inter(mb, blk, &mut ta, &mut tl, dst.plane_mut(plane));
            block += step;
          }
        }
      } else {
        for blk in mb.transformed_blocks(plane, tx_size) {
          self.encode_block(mb, &blk, &mut ta, &mut tl, dst.plane_mut(plane), false);
        }
        spread_contexts(tx_size, &mut ta, num_4x4);
        spread_contexts(tx_size, &mut tl, num_4x4);
      }

      mb.planes[plane].above_context = ta;
      mb.planes[plane].left_context = tl;
    }
    debug!(y = mb.y, x = mb.x, bsize = ?mb.mi.bsize, var_tx, skip = mb.mi.skip, "encode_sb");
  }

  // Predict, code and reconstruct one transform block of an intra unit
  fn encode_block_intra<T: Pixel, P: IntraPredictor<T> + ?Sized>(
      &mut self, mb: &mut Macroblock, blk: &TxBlock,
      ta: &mut [u8; MAX_4X4_CONTEXTS], tl: &mut [u8; MAX_4X4_CONTEXTS],
      enable_optimize: bool, predictor: &P, src: &Plane<T>, dst: &mut Plane<T>) {
    let plane = blk.plane;
    let tx_w = blk.tx_size.width();
    let (y0, x0) = mb.plane_origin(plane);
    let y = y0 + 4 * blk.blk_row;
    let x = x0 + 4 * blk.blk_col;
    let mode = if plane == 0 { mb.mi.y_mode } else { mb.mi.uv_mode };

    predictor.predict(dst.pixels_mut(), mode, y, x, tx_w, mb.bit_depth);
    let diff_stride = blk.plane_bsize.width();
    let diff_offset = 4 * (blk.blk_row * diff_stride + blk.blk_col);
    subtract_block(tx_w, tx_w, &mut mb.planes[plane].src_diff[diff_offset ..], diff_stride,
                   src.pixels(), dst.pixels(), y, x);

    let ctx = combine_entropy_contexts(ta[blk.blk_col], tl[blk.blk_row]);

    let (eob, final_eob) = if enable_optimize {
      let policy = self.config.optimize_policy();
      self.xform_quant(mb, blk, policy, ctx);
      let eob = mb.planes[plane].eobs[blk.block] as usize;
      let final_eob = if eob > 0 { self.optimize_block(mb, blk, ctx, policy.is_nuq()) } else { 0 };
      (eob, final_eob)
    } else {
      self.xform_quant(mb, blk, QuantPolicy::B, ctx);
      let eob = mb.planes[plane].eobs[blk.block] as usize;
      (eob, eob)
    };
    trace!(plane, block = blk.block, mode = ?mode, eob, final_eob, "encode_block_intra");

    let coded = (final_eob > 0) as u8;
    ta[blk.blk_col] = coded;
    tl[blk.blk_row] = coded;

    if final_eob > 0 {
      self.reconstruct(mb, blk, dst);
      mb.mi.skip = false;
    }
  }

  // Code one plane of an intra unit block by block, each block predicted
  // from the reconstruction of the ones before it
  pub fn encode_intra_block_plane<T: Pixel, P: IntraPredictor<T> + ?Sized>(
      &mut self, mb: &mut Macroblock, plane: usize, enable_optimize: bool,
      predictor: &P, src: &Frame<T>, dst: &mut Frame<T>) {
    let plane_bsize = mb.plane_bsize(plane);
    let num_4x4 = plane_bsize.width_4x4();
    let tx_size = mb.mi.plane_tx_size(plane, mb.planes[plane].ss_x);
    let (mut ta, mut tl) = if enable_optimize {
      get_entropy_contexts(plane_bsize, tx_size,
                           &mb.planes[plane].above_context, &mb.planes[plane].left_context,
                           mb.max_blocks_wide(plane, plane_bsize), mb.max_blocks_high(plane, plane_bsize))
    } else {
      ([0; MAX_4X4_CONTEXTS], [0; MAX_4X4_CONTEXTS])
    };

    for blk in mb.transformed_blocks(plane, tx_size) {
      self.encode_block_intra(mb, &blk, &mut ta, &mut tl, enable_optimize, predictor,
                              src.plane(plane), dst.plane_mut(plane));
    }

    spread_contexts(tx_size, &mut ta, num_4x4);
    spread_contexts(tx_size, &mut tl, num_4x4);
    mb.planes[plane].above_context = ta;
    mb.planes[plane].left_context = tl;
  }

  // Code all planes of an intra unit
  pub fn encode_intra_sb<T: Pixel, P: IntraPredictor<T> + ?Sized>(
      &mut self, mb: &mut Macroblock, predictor: &P, src: &Frame<T>, dst: &mut Frame<T>) {
    mb.mi.skip = true;
    let enable_optimize = self.config.optimize;
    for plane in 0..MAX_MB_PLANE {
      self.encode_intra_block_plane(mb, plane, enable_optimize, predictor, src, dst);
    }
    debug!(y = mb.y, x = mb.x, bsize = ?mb.mi.bsize, skip = mb.mi.skip, "encode_intra_sb");
  }

  // First-pass luma coding: plain quantization without the trellis or
  // entropy contexts. The prediction must already be in `dst`.
  pub fn encode_sby_pass1<T: Pixel>(&mut self, mb: &mut Macroblock, src: &Frame<T>, dst: &mut Frame<T>) {
    subtract_plane(mb, 0, src.y(), dst.y());
    let policy = match self.config.quantizer {
      QuantizerKind::Uniform => QuantPolicy::B,
      QuantizerKind::NonUniform => QuantPolicy::FpNuq,
    };
    for blk in mb.transformed_blocks(0, mb.mi.tx_size) {
      self.xform_quant(mb, &blk, policy, 0);
      if mb.planes[0].eobs[blk.block] > 0 {
        self.reconstruct(mb, &blk, dst.y_mut());
      }
    }
  }
}
