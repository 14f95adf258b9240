// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

// Coefficient scan orders and their neighbour maps
//
// Scans are generated rather than tabulated. A 2D transform uses a
// zig-zag (anti-diagonal) scan; transforms with an ADST in only one
// direction concentrate energy along the other axis, so they use a scan
// biased toward that axis.

use crate::enums::*;

pub const MAX_NEIGHBORS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScanClass {
  Default,
  // Visit rows before columns: used when only the vertical kernel is an ADST
  Col,
  // Visit columns before rows: used when only the horizontal kernel is an ADST
  Row,
}

pub struct ScanOrder {
  // scan[i] = raster position (row * width + col) of the i-th coded coefficient
  pub scan: Box<[u16]>,
  // iscan[raster position] = scan index
  pub iscan: Box<[u16]>,
  // For each scan index, two raster positions of earlier-coded neighbours,
  // used to derive the token context
  pub neighbors: Box<[u16]>,
}

impl ScanOrder {
  fn generate(tx_size: TxSize, class: ScanClass) -> Self {
    let w = tx_size.width();
    let n = tx_size.area();

    let mut positions: Vec<(usize, usize)> = (0..n).map(|rc| (rc / w, rc % w)).collect();
    match class {
      ScanClass::Default => {
        // Anti-diagonals, alternating direction
        positions.sort_by_key(|&(r, c)| {
          let d = r + c;
          (d, if d % 2 == 0 { c } else { r })
        });
      },
      ScanClass::Col => {
        positions.sort_by_key(|&(r, c)| (r + 2 * c, c));
      },
      ScanClass::Row => {
        positions.sort_by_key(|&(r, c)| (2 * r + c, r));
      },
    }

    let mut scan = vec![0u16; n].into_boxed_slice();
    let mut iscan = vec![0u16; n].into_boxed_slice();
    for (i, &(r, c)) in positions.iter().enumerate() {
      let rc = r * w + c;
      scan[i] = rc as u16;
      iscan[rc] = i as u16;
    }

    // Every generated order visits (r-1, c) and (r, c-1) before (r, c),
    // so the above and left neighbours are always already coded
    let mut neighbors = vec![0u16; MAX_NEIGHBORS * n].into_boxed_slice();
    for (i, &(r, c)) in positions.iter().enumerate() {
      let above = if r > 0 { Some((r - 1) * w + c) } else { None };
      let left = if c > 0 { Some(r * w + c - 1) } else { None };
      let (a, b) = match (above, left) {
        (Some(a), Some(l)) => (a, l),
        (Some(a), None) => (a, a),
        (None, Some(l)) => (l, l),
        (None, None) => (0, 0),
      };
      neighbors[MAX_NEIGHBORS * i] = a as u16;
      neighbors[MAX_NEIGHBORS * i + 1] = b as u16;
    }

    Self {
      scan: scan,
      iscan: iscan,
      neighbors: neighbors
    }
  }

  pub fn len(&self) -> usize {
    self.scan.len()
  }

  // Token context of scan position `c`, from the energy classes of the
  // already-coded neighbours
  pub fn coef_context(&self, token_cache: &[u8], c: usize) -> usize {
    let a = token_cache[self.neighbors[MAX_NEIGHBORS * c] as usize] as usize;
    let b = token_cache[self.neighbors[MAX_NEIGHBORS * c + 1] as usize] as usize;
    (1 + a + b) >> 1
  }
}

// All scan orders, built once and shared by every block
pub struct ScanTables {
  orders: Vec<ScanOrder>,
}

impl ScanTables {
  pub fn new() -> Self {
    let mut orders = Vec::with_capacity(TX_SIZES * 3);
    for tx_size in TxSize::ALL {
      for class in [ScanClass::Default, ScanClass::Col, ScanClass::Row] {
        orders.push(ScanOrder::generate(tx_size, class));
      }
    }
    Self { orders: orders }
  }

  // Inter blocks use the same orders as intra blocks; the flag is kept so
  // callers do not need to know that
  pub fn get(&self, tx_size: TxSize, tx_type: TxType, _is_inter: bool) -> &ScanOrder {
    let class = match (tx_type.vertical_is_adst(), tx_type.horizontal_is_adst()) {
      (true, false) => ScanClass::Col,
      (false, true) => ScanClass::Row,
      _ => ScanClass::Default,
    };
    let class_idx = match class {
      ScanClass::Default => 0,
      ScanClass::Col => 1,
      ScanClass::Row => 2,
    };
    &self.orders[3 * (tx_size as usize) + class_idx]
  }
}

impl Default for ScanTables {
  fn default() -> Self {
    Self::new()
  }
}
