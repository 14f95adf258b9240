// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::fmt::Debug;
use std::io;
use std::io::prelude::*;

use bytemuck::{Pod, Zeroable};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::array2d::Array2D;
use crate::util::*;

// Planes are padded so that a whole superblock can always be addressed
pub const SUPERBLOCK_SIZE: usize = 64;

// Sample storage type. u8 holds 8-bit video, u16 holds 8 to 12 bits.
pub trait Pixel: Copy + Clone + Debug + Default + Zeroable + Pod + Into<i32> + Send + Sync + 'static {
  // Convert from an in-range value; callers clamp to the bit depth first
  fn from_i32(value: i32) -> Self;

  fn read_from<R: Read>(r: &mut R) -> io::Result<Self>;
  fn write_to<W: Write>(self, w: &mut W) -> io::Result<()>;
}

impl Pixel for u8 {
  fn from_i32(value: i32) -> Self {
    debug_assert!((0..=255).contains(&value));
    value as u8
  }

  fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
    r.read_u8()
  }

  fn write_to<W: Write>(self, w: &mut W) -> io::Result<()> {
    w.write_u8(self)
  }
}

impl Pixel for u16 {
  fn from_i32(value: i32) -> Self {
    debug_assert!((0..=65535).contains(&value));
    value as u16
  }

  fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
    r.read_u16::<LittleEndian>()
  }

  fn write_to<W: Write>(self, w: &mut W) -> io::Result<()> {
    w.write_u16::<LittleEndian>(self)
  }
}

pub struct Plane<T: Pixel> {
  // Pixel data
  // The width() / height() methods of this array give the padded size.
  // For the real size, use the .crop_width / .crop_height members below
  pixels: Array2D<T>,

  crop_width: usize,
  crop_height: usize,
}

impl<T: Pixel> Plane<T> {
  // ss_y / ss_x are log2 of the subsampling factor relative to luma
  pub fn new(crop_height: usize, crop_width: usize, ss_y: usize, ss_x: usize) -> Self {
    let width = crop_width.next_multiple_of(SUPERBLOCK_SIZE >> ss_x);
    let height = crop_height.next_multiple_of(SUPERBLOCK_SIZE >> ss_y);
    Self {
      pixels: Array2D::zeroed(height, width),
      crop_width: crop_width,
      crop_height: crop_height
    }
  }

  pub fn pixels(&self) -> &Array2D<T> {
    &self.pixels
  }

  pub fn pixels_mut(&mut self) -> &mut Array2D<T> {
    &mut self.pixels
  }

  pub fn width(&self) -> usize {
    self.pixels.cols()
  }

  pub fn height(&self) -> usize {
    self.pixels.rows()
  }

  pub fn crop_width(&self) -> usize {
    self.crop_width
  }

  pub fn crop_height(&self) -> usize {
    self.crop_height
  }

  // Fill in the pixels outside the crop region, by copying the rightmost and
  // bottommost pixels from within the crop region
  // This *must* be called after any modification which may potentially affect
  // the last row/column of pixels, or which may disturb the padding region
  pub fn fill_padding(&mut self) {
    let crop_width = self.crop_width;
    let crop_height = self.crop_height;
    let width = self.width();
    let height = self.height();

    for row in 0 .. crop_height {
      let rightmost_pixel = self.pixels[row][crop_width - 1];
      self.pixels[row][crop_width .. width].fill(rightmost_pixel);
    }

    for row in crop_height .. height {
      for col in 0 .. width {
        self.pixels[row][col] = self.pixels[crop_height - 1][col];
      }
    }
  }

  pub fn read_from<R: Read>(&mut self, r: &mut R) -> io::Result<()> {
    for row in 0 .. self.crop_height {
      for col in 0 .. self.crop_width {
        self.pixels[row][col] = T::read_from(r)?;
      }
    }
    self.fill_padding();
    Ok(())
  }

  pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
    for row in 0 .. self.crop_height {
      for &px in &self.pixels[row][0 .. self.crop_width] {
        px.write_to(w)?;
      }
    }
    Ok(())
  }

  // Sum of squared differences over the crop region
  pub fn sse(&self, other: &Plane<T>) -> u64 {
    assert!(self.crop_width == other.crop_width && self.crop_height == other.crop_height);
    let mut sse = 0u64;
    for row in 0 .. self.crop_height {
      for col in 0 .. self.crop_width {
        let diff: i32 = self.pixels[row][col].into() - other.pixels[row][col].into();
        sse += (diff as i64 * diff as i64) as u64;
      }
    }
    sse
  }
}

// A 4:2:0 frame
pub struct Frame<T: Pixel> {
  planes: [Plane<T>; 3],
  bit_depth: u32,
}

impl<T: Pixel> Frame<T> {
  pub fn new(y_crop_height: usize, y_crop_width: usize, bit_depth: u32) -> Self {
    assert!(8 * std::mem::size_of::<T>() >= bit_depth as usize);

    let uv_crop_width = round2(y_crop_width, 1);
    let uv_crop_height = round2(y_crop_height, 1);

    Self {
      planes: [
        Plane::new(y_crop_height, y_crop_width, 0, 0),
        Plane::new(uv_crop_height, uv_crop_width, 1, 1),
        Plane::new(uv_crop_height, uv_crop_width, 1, 1),
      ],
      bit_depth: bit_depth
    }
  }

  pub fn bit_depth(&self) -> u32 {
    self.bit_depth
  }

  pub fn plane(&self, idx: usize) -> &Plane<T> {
    &self.planes[idx]
  }

  pub fn plane_mut(&mut self, idx: usize) -> &mut Plane<T> {
    &mut self.planes[idx]
  }

  pub fn y(&self) -> &Plane<T> {
    &self.planes[0]
  }

  pub fn y_mut(&mut self) -> &mut Plane<T> {
    &mut self.planes[0]
  }

  pub fn u(&self) -> &Plane<T> {
    &self.planes[1]
  }

  pub fn v(&self) -> &Plane<T> {
    &self.planes[2]
  }
}
