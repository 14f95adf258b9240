// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::io::prelude::*;

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::frame::{Frame, Pixel};

const Y4M_FILE_MAGIC: &str = "YUV4MPEG2 ";
const Y4M_FRAME_MAGIC: &str = "FRAME";

pub struct Y4MReader<R> {
  inner: R,
  width: usize,
  height: usize,
  bit_depth: u32,
}

pub struct Y4MWriter<W> {
  inner: W,
  width: usize,
  height: usize,
  bit_depth: u32,
}

fn is_whitespace(byte: u8) -> bool {
  matches!(byte, b' ' | b'\t' | b'\n')
}

// Read one header parameter value, up to and including the following
// whitespace character, which is returned alongside the value
fn read_token<R: Read>(r: &mut R) -> Result<(String, u8)> {
  let mut token = String::new();
  loop {
    let byte = r.read_u8()?;
    if is_whitespace(byte) {
      return Ok((token, byte));
    }
    token.push(byte as char);
  }
}

fn parse_decimal(tag: char, value: &str) -> Result<usize> {
  value.parse().map_err(|_| Error::InvalidY4mHeader(format!("bad value {:?} for {}", value, tag)))
}

// Map a colorspace tag to a bit depth. Only 4:2:0 is supported.
fn parse_colorspace(value: &str) -> Result<u32> {
  match value {
    "420" | "420jpeg" | "420paldv" | "420mpeg2" => Ok(8),
    "420p10" => Ok(10),
    "420p12" => Ok(12),
    _ => Err(Error::UnsupportedColorspace(value.to_string()))
  }
}

impl<R: Read> Y4MReader<R> {
  pub fn new(mut inner: R) -> Result<Self> {
    // Read header line
    let mut file_magic = [0u8; 10];
    inner.read_exact(&mut file_magic)?;
    if file_magic != Y4M_FILE_MAGIC.as_bytes() {
      return Err(Error::InvalidY4mHeader("bad file magic".to_string()));
    }

    let mut width = None;
    let mut height = None;
    let mut bit_depth = 8;

    // Parse parameter line
    loop {
      let tag = inner.read_u8()?;
      if tag == b'\n' {
        break;
      }
      if is_whitespace(tag) {
        continue;
      }
      let (value, terminator) = read_token(&mut inner)?;
      match tag {
        b'W' => { width = Some(parse_decimal('W', &value)?); },
        b'H' => { height = Some(parse_decimal('H', &value)?); },
        b'C' => { bit_depth = parse_colorspace(&value)?; },
        // Frame rate, aspect ratio, interlacing etc. don't affect us
        _ => {}
      }
      if terminator == b'\n' {
        break;
      }
    }

    let width = width.ok_or(Error::MissingY4mTag('W'))?;
    let height = height.ok_or(Error::MissingY4mTag('H'))?;
    if width == 0 || height == 0 {
      return Err(Error::InvalidY4mHeader(format!("invalid size {}x{}", width, height)));
    }

    Ok(Y4MReader {
      inner: inner,
      width: width,
      height: height,
      bit_depth: bit_depth
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn bit_depth(&self) -> u32 {
    self.bit_depth
  }

  // Read the next frame. The sample type must be wide enough for the
  // stream's bit depth, and 8-bit streams must be read as bytes.
  pub fn read_frame<T: Pixel>(&mut self) -> Result<Frame<T>> {
    let sample_bytes = if self.bit_depth > 8 { 2 } else { 1 };
    if std::mem::size_of::<T>() != sample_bytes {
      return Err(Error::UnsupportedColorspace(format!(
        "{}-bit samples read as {}-byte pixels", self.bit_depth, std::mem::size_of::<T>())));
    }

    // Frame lines can technically carry parameters, but none of them are
    // useful to us. So check the magic number and skip the rest of the line.
    let mut frame_magic = [0u8; 5];
    self.inner.read_exact(&mut frame_magic)?;
    if frame_magic != Y4M_FRAME_MAGIC.as_bytes() {
      return Err(Error::InvalidY4mFrame);
    }
    while self.inner.read_u8()? != b'\n' {}

    let mut frame = Frame::new(self.height, self.width, self.bit_depth);
    for plane in 0 .. 3 {
      frame.plane_mut(plane).read_from(&mut self.inner)?;
    }
    Ok(frame)
  }
}

impl<W: Write> Y4MWriter<W> {
  pub fn new(mut inner: W, width: usize, height: usize, bit_depth: u32) -> Result<Self> {
    let colorspace = match bit_depth {
      8 => "420jpeg",
      10 => "420p10",
      12 => "420p12",
      _ => return Err(Error::UnsupportedColorspace(format!("{}-bit output", bit_depth)))
    };
    inner.write_all(Y4M_FILE_MAGIC.as_bytes())?;
    write!(inner, "W{} H{} F25:1 Ip A0:0 C{}\n", width, height, colorspace)?;

    Ok(Y4MWriter {
      inner: inner,
      width: width,
      height: height,
      bit_depth: bit_depth
    })
  }

  pub fn write_frame<T: Pixel>(&mut self, frame: &Frame<T>) -> Result<()> {
    if frame.y().crop_width() != self.width || frame.y().crop_height() != self.height
       || frame.bit_depth() != self.bit_depth {
      return Err(Error::InvalidY4mFrame);
    }

    self.inner.write_all(Y4M_FRAME_MAGIC.as_bytes())?;
    self.inner.write_u8(b'\n')?;
    for plane in 0 .. 3 {
      frame.plane(plane).write_to(&mut self.inner)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn tiny_stream(header: &str) -> Vec<u8> {
    let mut data = header.as_bytes().to_vec();
    data.extend_from_slice(b"FRAME\n");
    // 2x2 luma, 1x1 chroma
    data.extend_from_slice(&[10, 20, 30, 40, 128, 64]);
    data
  }

  #[test]
  fn test_read_frame() {
    let data = tiny_stream("YUV4MPEG2 W2 H2 F30:1 C420jpeg\n");
    let mut reader = Y4MReader::new(Cursor::new(data)).unwrap();
    assert_eq!((reader.width(), reader.height(), reader.bit_depth()), (2, 2, 8));
    let frame: Frame<u8> = reader.read_frame().unwrap();
    assert_eq!(frame.y().pixels()[1][0], 30);
    // Padding replicates the last visible pixel
    assert_eq!(frame.y().pixels()[0][5], 20);
    assert_eq!(frame.u().pixels()[0][0], 128);
    assert_eq!(frame.v().pixels()[0][0], 64);
  }

  #[test]
  fn test_rejects_bad_headers() {
    let data = tiny_stream("YUV4MPEG2 W2 H2 C444\n");
    assert!(matches!(Y4MReader::new(Cursor::new(data)), Err(Error::UnsupportedColorspace(_))));
    let data = tiny_stream("YUV4MPEG2 H2\n");
    assert!(matches!(Y4MReader::new(Cursor::new(data)), Err(Error::MissingY4mTag('W'))));
    let data = tiny_stream("YUV4MPEG1 W2 H2\n");
    assert!(matches!(Y4MReader::new(Cursor::new(data)), Err(Error::InvalidY4mHeader(_))));
  }

  #[test]
  fn test_write_then_read() {
    let data = tiny_stream("YUV4MPEG2 W2 H2\n");
    let mut reader = Y4MReader::new(Cursor::new(data)).unwrap();
    let frame: Frame<u8> = reader.read_frame().unwrap();

    let mut out = Vec::new();
    let mut writer = Y4MWriter::new(&mut out, 2, 2, 8).unwrap();
    writer.write_frame(&frame).unwrap();
    assert!(out.starts_with(b"YUV4MPEG2 W2 H2 "));
    assert!(out.ends_with(&[b'F', b'R', b'A', b'M', b'E', b'\n', 10, 20, 30, 40, 128, 64]));

    let mut reader = Y4MReader::new(Cursor::new(out)).unwrap();
    assert!(reader.read_frame::<u16>().is_err());
  }
}
