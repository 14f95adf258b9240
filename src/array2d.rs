// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use bytemuck::Zeroable;
use bytemuck::allocation::zeroed_slice_box;

use std::ops::{Index, IndexMut};

// Two-dimensional array type, used for pixel planes and residual buffers
#[derive(Clone, Debug)]
pub struct Array2D<T> {
  rows: usize,
  cols: usize,
  stride: usize,
  data: Box<[T]>,
}

impl<T> Array2D<T> {
  pub fn rows(&self) -> usize {
    self.rows
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  // Flat view of the whole buffer, rows `stride` elements apart
  pub fn data(&self) -> &[T] {
    &self.data
  }

  fn check_region(&self, row_start: usize, col_start: usize, rows: usize, cols: usize) {
    let row_end = row_start.checked_add(rows).unwrap();
    let col_end = col_start.checked_add(cols).unwrap();

    if row_end > self.rows {
      panic!("Array2D row indices out of bounds (index {}..{} vs. size {})", row_start, row_end, self.rows);
    }
    if col_end > self.cols {
      panic!("Array2D column indices out of bounds (index {}..{} vs. size {})", col_start, col_end, self.cols);
    }
  }

  pub fn fill_with<F: FnMut(usize, usize) -> T>(&mut self, mut f: F) {
    for i in 0..self.rows {
      for j in 0..self.cols {
        self[i][j] = f(i, j);
      }
    }
  }
}

impl<T: Clone> Array2D<T> {
  // Fill a region of a given size with (cloned) copies of `value`
  pub fn fill_region(&mut self, row_start: usize, col_start: usize, rows: usize, cols: usize, value: &T) {
    self.check_region(row_start, col_start, rows, cols);
    for row in row_start .. row_start + rows {
      self[row][col_start .. col_start + cols].fill(value.clone());
    }
  }
}

impl<T: Zeroable> Array2D<T> {
  pub fn zeroed(rows: usize, cols: usize) -> Self {
    let stride = cols;
    let num_elements = rows * stride;
    let data = zeroed_slice_box(num_elements);

    Self {
      rows: rows,
      cols: cols,
      stride: stride,
      data: data
    }
  }

  pub fn new_with<F: FnMut(usize, usize) -> T>(rows: usize, cols: usize, f: F) -> Self {
    let mut result = Array2D::zeroed(rows, cols);
    result.fill_with(f);
    return result;
  }
}

// Allow indexing by array[row][col]
// This is done by having array[row] return a normal slice which
// references the entire row in question. Then a normal slice index
// can pick out the desired element
impl<T> Index<usize> for Array2D<T> {
  type Output = [T];
  fn index(&self, index: usize) -> &[T] {
    if index >= self.rows {
      panic!("Array2D row index out of bounds (index {} vs. size {})", index, self.rows);
    }
    // Due to the above check, these calculations should never overflow
    let start_index = index * self.stride;
    let end_index = start_index + self.cols;
    &self.data[start_index .. end_index]
  }
}

impl<T> IndexMut<usize> for Array2D<T> {
  fn index_mut(&mut self, index: usize) -> &mut [T] {
    if index >= self.rows {
      panic!("Array2D row index out of bounds (index {} vs. size {})", index, self.rows);
    }
    // Due to the above check, these calculations should never overflow
    let start_index = index * self.stride;
    let end_index = start_index + self.cols;
    &mut self.data[start_index .. end_index]
  }
}
