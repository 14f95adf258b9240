// Copyright (c) 2024-2025, The tinyavif contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info};

use tinyresid::block::ModeInfo;
use tinyresid::enums::*;
use tinyresid::frame::SUPERBLOCK_SIZE;
use tinyresid::recon::EdgePredictor;
use tinyresid::y4m::{Y4MReader, Y4MWriter};
use tinyresid::*;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IntraMode {
  Dc,
  V,
  H,
  Tm,
}

impl IntraMode {
  fn prediction_mode(self) -> PredictionMode {
    match self {
      IntraMode::Dc => PredictionMode::DC_PRED,
      IntraMode::V => PredictionMode::V_PRED,
      IntraMode::H => PredictionMode::H_PRED,
      IntraMode::Tm => PredictionMode::TM_PRED,
    }
  }
}

#[derive(Parser)]
#[command(override_usage = "tinyresid <INPUT> [-o <OUTPUT>] [--qindex <QINDEX>]")]
struct CommandlineArgs {
  /// Input file, must end in .y4m
  input: PathBuf,
  /// Write the reconstructed frame to this .y4m file
  #[arg(short, long)]
  output: Option<PathBuf>,
  /// Quantizer index. 0 selects lossless coding
  #[arg(short, long, default_value_t = 100)]
  qindex: u8,
  /// DC quantizer step
  #[arg(long, default_value_t = 64)]
  dc_step: i16,
  /// AC quantizer step
  #[arg(long, default_value_t = 72)]
  ac_step: i16,
  /// Coding unit size in luma pixels: 8, 16, 32 or 64
  #[arg(short, long, default_value_t = 64)]
  block_size: usize,
  /// Luma transform size: 4, 8, 16 or 32 [default: largest that fits]
  #[arg(short, long)]
  tx_size: Option<usize>,
  /// Intra prediction mode used for every unit
  #[arg(long, value_enum, default_value_t = IntraMode::Dc)]
  mode: IntraMode,
  /// Use the non-uniform quantizer
  #[arg(long)]
  nuq: bool,
  /// Disable trellis optimization of the quantized coefficients
  #[arg(long)]
  no_optimize: bool,
  /// Print per-unit debug output
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Default)]
struct Stats {
  units: usize,
  skipped_units: usize,
  coded_blocks: usize,
  nonzero_coeffs: usize,
}

// Intra-code every unit of the frame in raster order, threading the entropy
// contexts from unit to unit
fn encode_frame<T: Pixel>(encoder: &mut Encoder, args: &CommandlineArgs, bsize: BlockSize,
                          tx_size: TxSize, source: &Frame<T>) -> (Frame<T>, Stats) {
  let crop_width = source.y().crop_width();
  let crop_height = source.y().crop_height();
  let mut recon = Frame::<T>::new(crop_height, crop_width, source.bit_depth());
  let mut mb = Macroblock::new(&encoder.config);
  let mut contexts = FrameContexts::new(source.y().width() >> 2);
  let mut stats = Stats::default();
  let size = bsize.width();
  let mode = args.mode.prediction_mode();

  for y in (0 .. crop_height).step_by(size) {
    if y % SUPERBLOCK_SIZE == 0 {
      contexts.reset_left();
    }
    for x in (0 .. crop_width).step_by(size) {
      let mut mi = ModeInfo::new(bsize, tx_size);
      mi.y_mode = mode;
      mi.uv_mode = mode;
      mi.tx_type = mode.intra_tx_type();
      mb.set_position(y, x, mi, crop_height, crop_width);

      for plane in 0 .. MAX_MB_PLANE {
        let p = &mut mb.planes[plane];
        let col4 = x >> (2 + p.ss_x);
        let row4 = (y % SUPERBLOCK_SIZE) >> (2 + p.ss_y);
        let num_4x4 = bsize.subsampled(p.ss_x).width_4x4();
        contexts.load(plane, col4, row4, num_4x4, &mut p.above_context, &mut p.left_context);
      }

      encoder.encode_intra_sb(&mut mb, &EdgePredictor, source, &mut recon);

      for plane in 0 .. MAX_MB_PLANE {
        let p = &mb.planes[plane];
        let col4 = x >> (2 + p.ss_x);
        let row4 = (y % SUPERBLOCK_SIZE) >> (2 + p.ss_y);
        let num_4x4 = bsize.subsampled(p.ss_x).width_4x4();
        contexts.store(plane, col4, row4, num_4x4, &p.above_context, &p.left_context);

        let plane_tx_size = mb.mi.plane_tx_size(plane, p.ss_x);
        for blk in mb.transformed_blocks(plane, plane_tx_size) {
          if p.eobs[blk.block] > 0 {
            stats.coded_blocks += 1;
            stats.nonzero_coeffs += p.qcoeff_block(blk.block, plane_tx_size).iter().filter(|&&q| q != 0).count();
          }
        }
      }
      stats.units += 1;
      stats.skipped_units += mb.mi.skip as usize;
    }
  }

  for plane in 0 .. 3 {
    recon.plane_mut(plane).fill_padding();
  }
  (recon, stats)
}

fn psnr(sse: u64, pixels: usize, bit_depth: u32) -> f64 {
  if sse == 0 {
    return f64::INFINITY;
  }
  let peak = ((1u32 << bit_depth) - 1) as f64;
  10.0 * (peak * peak * pixels as f64 / sse as f64).log10()
}

fn run_with<T: Pixel>(args: &CommandlineArgs, encoder: &mut Encoder, bsize: BlockSize, tx_size: TxSize,
                      reader: &mut Y4MReader<BufReader<File>>) -> Result<()> {
  let source = reader.read_frame::<T>()?;
  let (recon, stats) = encode_frame(encoder, args, bsize, tx_size, &source);

  info!(units = stats.units, skipped = stats.skipped_units, coded_blocks = stats.coded_blocks,
        nonzero_coeffs = stats.nonzero_coeffs, "Encoded frame");
  for (plane, name) in ["Y", "U", "V"].iter().enumerate() {
    let p = source.plane(plane);
    let sse = p.sse(recon.plane(plane));
    let pixels = p.crop_width() * p.crop_height();
    info!("PSNR {}: {:.3} dB", name, psnr(sse, pixels, source.bit_depth()));
  }

  if let Some(output_path) = &args.output {
    let file = BufWriter::new(File::create(output_path)?);
    let mut writer = Y4MWriter::new(file, recon.y().crop_width(), recon.y().crop_height(),
                                    recon.bit_depth())?;
    writer.write_frame(&recon)?;
  }
  Ok(())
}

fn run(args: &CommandlineArgs) -> Result<()> {
  match args.input.extension().and_then(|ext| ext.to_str()) {
    Some("y4m") => {},
    _ => return Err(Error::InvalidConfig("input file must end in .y4m".to_string()))
  }

  let bsize = match BlockSize::from_width(args.block_size) {
    Some(bsize) if bsize >= BlockSize::BLOCK_8X8 => bsize,
    _ => return Err(Error::InvalidConfig(format!("unsupported block size {}", args.block_size)))
  };
  let tx_size = match args.tx_size {
    None => bsize.max_tx_size(),
    Some(width) => match TxSize::ALL.iter().copied().find(|t| t.width() == width) {
      Some(tx_size) if tx_size <= bsize.max_tx_size() => tx_size,
      _ => return Err(Error::InvalidConfig(format!(
        "transform size {} does not fit in a {}x{} block", width, args.block_size, args.block_size)))
    }
  };

  let mut reader = Y4MReader::new(BufReader::new(File::open(&args.input)?))?;

  let lossless = args.qindex == 0;
  let config = EncoderConfig {
    quantizer: if args.nuq { QuantizerKind::NonUniform } else { QuantizerKind::Uniform },
    // Lossless coding must keep every coefficient as quantized
    optimize: !args.no_optimize && !lossless,
    qindex: args.qindex,
    lossless: lossless,
    dc_step: args.dc_step,
    ac_step: args.ac_step,
    bit_depth: reader.bit_depth(),
    ..Default::default()
  };
  // Lossless coding always uses 4x4 Walsh-Hadamard transforms
  let tx_size = if lossless { TxSize::TX_4X4 } else { tx_size };
  let mut encoder = Encoder::new(config)?;

  info!("Encoding {}x{} at {} bits, {:?} units with {:?}",
        reader.width(), reader.height(), reader.bit_depth(), bsize, tx_size);
  if reader.bit_depth() > 8 {
    run_with::<u16>(args, &mut encoder, bsize, tx_size, &mut reader)
  } else {
    run_with::<u8>(args, &mut encoder, bsize, tx_size, &mut reader)
  }
}

fn main() -> ExitCode {
  let args = CommandlineArgs::parse();

  let subscriber = tracing_subscriber::fmt()
    .with_max_level(if args.verbose {
      tracing::Level::DEBUG
    } else {
      tracing::Level::INFO
    })
    .with_target(false)
    .finish();
  let _ = tracing::subscriber::set_global_default(subscriber);

  match run(&args) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!("{}", e);
      ExitCode::from(2)
    }
  }
}
