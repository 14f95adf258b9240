// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Errors raised at the edges of the encoder: file input/output and
// configuration. The residual pipeline itself only asserts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid Y4M header: {0}")]
  InvalidY4mHeader(String),

  #[error("Y4M header is missing the {0} tag")]
  MissingY4mTag(char),

  #[error("Invalid Y4M frame marker")]
  InvalidY4mFrame,

  #[error("Unsupported Y4M colour space: {0}")]
  UnsupportedColorspace(String),

  #[error("Invalid encoder configuration: {0}")]
  InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
