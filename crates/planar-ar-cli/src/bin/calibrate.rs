use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info, LevelFilter};

use planar_ar::{init_with_level, CalibrationStore};
use planar_ar_cli::{list_frames, load_rgb, write_frame, CliError};

/// Calibrate a camera from a checkerboard frame sequence.
#[derive(Parser)]
#[command(name = "calibrate")]
struct Args {
    /// Directory holding the calibration frames, in name order
    #[arg(long)]
    frames: PathBuf,

    /// Output directory for the intrinsics document and calibration images
    #[arg(long, default_value = "calibration")]
    out: PathBuf,

    /// Inner-corner columns of the checkerboard
    #[arg(long, default_value_t = 9)]
    pattern_cols: usize,

    /// Inner-corner rows of the checkerboard
    #[arg(long, default_value_t = 6)]
    pattern_rows: usize,

    /// Commit every Nth valid detection
    #[arg(long, default_value_t = 1)]
    every: usize,

    /// Optional directory for annotated detection overlays
    #[arg(long)]
    annotated: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let frames = list_frames(&args.frames)?;
    fs::create_dir_all(&args.out).map_err(|source| CliError::OutputDir {
        path: args.out.display().to_string(),
        source,
    })?;
    if let Some(dir) = &args.annotated {
        fs::create_dir_all(dir).map_err(|source| CliError::OutputDir {
            path: dir.display().to_string(),
            source,
        })?;
    }

    let mut store = CalibrationStore::new(args.pattern_cols, args.pattern_rows);
    let every = args.every.max(1);
    let mut valid = 0usize;

    for (i, path) in frames.iter().enumerate() {
        let frame = load_rgb(path)?;
        let outcome = store.capture_candidate(&frame);
        if outcome.detected {
            valid += 1;
            if valid % every == 0 {
                store.commit_last_valid();
            }
        } else {
            debug!("frame {i}: pattern not found");
        }
        if let Some(dir) = &args.annotated {
            write_frame(dir, i, &outcome.overlay)?;
        }
    }
    info!(
        "{valid} of {} frames produced detections, {} samples committed",
        frames.len(),
        store.sample_count()
    );

    store.run_fit()?;
    let doc = args.out.join("intrinsics.json");
    store.persist(&doc)?;
    info!("wrote {}", doc.display());
    store.write_calibration_images(&args.out)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = init_with_level(level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
