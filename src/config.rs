// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Encoder-wide settings which select between the alternative quantization
// and transform-size strategies. These are resolved once and then passed
// down to every coding unit.

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QuantizerKind {
  #[default]
  Uniform,
  NonUniform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TxSizeSelection {
  // One transform size per coding unit
  #[default]
  Fixed,
  // Inter blocks may split each transform block into a quadtree
  Variable,
}

// Quantization strategy for one transform block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantPolicy {
  // Rounding seed for the trellis
  Fp,
  // Dead-zone quantizer
  B,
  Dc,
  Skip,
  // Forward transform only, coefficients left unquantized
  TransformOnly,
  Nuq,
  FpNuq,
  DcNuq,
  DcFpNuq,
}

impl QuantPolicy {
  pub fn is_nuq(self) -> bool {
    matches!(self, QuantPolicy::Nuq | QuantPolicy::FpNuq | QuantPolicy::DcNuq | QuantPolicy::DcFpNuq)
  }

  pub fn is_dc_only(self) -> bool {
    matches!(self, QuantPolicy::Dc | QuantPolicy::DcNuq | QuantPolicy::DcFpNuq)
  }
}

#[derive(Clone, Debug)]
pub struct EncoderConfig {
  pub quantizer: QuantizerKind,
  pub tx_size_selection: TxSizeSelection,
  pub lowp_32x32: bool,
  pub optimize: bool,
  pub rdmult: i64,
  pub rddiv: u32,
  pub qindex: u8,
  pub lossless: bool,
  pub dc_step: i16,
  pub ac_step: i16,
  pub bit_depth: u32,
}

impl Default for EncoderConfig {
  fn default() -> Self {
    Self {
      quantizer: QuantizerKind::Uniform,
      tx_size_selection: TxSizeSelection::Fixed,
      lowp_32x32: false,
      optimize: true,
      rdmult: 1024,
      rddiv: 7,
      qindex: 100,
      lossless: false,
      dc_step: 64,
      ac_step: 72,
      bit_depth: 8,
    }
  }
}

impl EncoderConfig {
  pub fn validate(&self) -> Result<()> {
    if !matches!(self.bit_depth, 8 | 10 | 12) {
      return Err(Error::InvalidConfig(format!("bit depth {} must be 8, 10 or 12", self.bit_depth)));
    }
    if self.lossless != (self.qindex == 0) {
      return Err(Error::InvalidConfig(format!(
        "lossless = {} is inconsistent with qindex = {}", self.lossless, self.qindex)));
    }
    if self.dc_step <= 0 || self.ac_step <= 0 {
      return Err(Error::InvalidConfig(format!(
        "quantizer steps must be positive, got dc {} ac {}", self.dc_step, self.ac_step)));
    }
    if self.rdmult <= 0 {
      return Err(Error::InvalidConfig(format!("rdmult {} must be positive", self.rdmult)));
    }
    if self.rddiv > 16 {
      return Err(Error::InvalidConfig(format!("rddiv {} is out of range", self.rddiv)));
    }
    Ok(())
  }

  // Policy used ahead of the trellis: the FP rounding seed, or its
  // non-uniform counterpart
  pub fn optimize_policy(&self) -> QuantPolicy {
    match self.quantizer {
      QuantizerKind::Uniform => QuantPolicy::Fp,
      QuantizerKind::NonUniform => QuantPolicy::FpNuq,
    }
  }

  // Policy used when the trellis is not run
  pub fn plain_policy(&self) -> QuantPolicy {
    match self.quantizer {
      QuantizerKind::Uniform => QuantPolicy::B,
      QuantizerKind::NonUniform => QuantPolicy::Nuq,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    assert!(EncoderConfig::default().validate().is_ok());
  }

  #[test]
  fn test_lossless_requires_zero_qindex() {
    let config = EncoderConfig { lossless: true, ..Default::default() };
    assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

    let config = EncoderConfig { lossless: true, qindex: 0, ..Default::default() };
    assert!(config.validate().is_ok());

    let config = EncoderConfig { qindex: 0, ..Default::default() };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_rejects_bad_steps_and_depth() {
    let config = EncoderConfig { ac_step: 0, ..Default::default() };
    assert!(config.validate().is_err());
    let config = EncoderConfig { bit_depth: 9, ..Default::default() };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_policies_follow_quantizer_kind() {
    let mut config = EncoderConfig::default();
    assert_eq!(config.optimize_policy(), QuantPolicy::Fp);
    assert_eq!(config.plain_policy(), QuantPolicy::B);
    config.quantizer = QuantizerKind::NonUniform;
    assert_eq!(config.optimize_policy(), QuantPolicy::FpNuq);
    assert!(config.plain_policy().is_nuq());
    assert!(QuantPolicy::DcFpNuq.is_dc_only());
  }
}
