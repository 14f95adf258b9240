// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Residual coding for an AV1-style encoder: prediction residuals, forward
// transform and quantization, rate-distortion trellis optimization of the
// quantized coefficients, and reconstruction

// Disable name styling checks, so that we can name things in line with the AV1 standard
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]

pub mod array2d;
pub mod block;
pub mod config;
pub mod consts;
pub mod context;
pub mod costs;
pub mod encode;
pub mod enums;
pub mod error;
pub mod frame;
pub mod quantize;
pub mod recon;
pub mod scan;
pub mod trellis;
pub mod txfm;
pub mod util;
pub mod y4m;

pub use crate::block::Macroblock;
pub use crate::config::{EncoderConfig, QuantPolicy, QuantizerKind, TxSizeSelection};
pub use crate::context::FrameContexts;
pub use crate::encode::Encoder;
pub use crate::error::{Error, Result};
pub use crate::frame::{Frame, Pixel, Plane};
