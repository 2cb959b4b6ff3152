use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};

use planar_ar::model::adjust;
use planar_ar::vision::{draw_point_grid, Color};
use planar_ar::{
    init_with_level, load_intrinsics, load_obj, Model, Pattern, PoseEngine, PoseError,
};
use planar_ar_cli::{list_frames, load_rgb, write_frame, CliError};

/// Render an AR overlay anchored to a checkerboard across a frame sequence.
#[derive(Parser)]
#[command(name = "pose_demo")]
struct Args {
    /// Directory holding the input frames, in name order
    #[arg(long)]
    frames: PathBuf,

    /// Intrinsics document written by `calibrate`
    #[arg(long, default_value = "calibration/intrinsics.json")]
    intrinsics: PathBuf,

    /// Output directory for the annotated frames
    #[arg(long, default_value = "pose_out")]
    out: PathBuf,

    /// Optional wireframe model (Wavefront OBJ) to anchor on the target
    #[arg(long)]
    model: Option<PathBuf>,

    /// Uniform model scale
    #[arg(long, default_value_t = 1.0)]
    model_scale: f64,

    /// Z offset keeping the model above the target plane
    #[arg(long, default_value_t = 5.0)]
    model_z_offset: f64,

    #[arg(long, default_value_t = 9)]
    pattern_cols: usize,

    #[arg(long, default_value_t = 6)]
    pattern_rows: usize,

    /// Length of the rendered coordinate axes, in target units
    #[arg(long, default_value_t = 3.0)]
    axis_length: f64,

    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let (intrinsics, distortion) = load_intrinsics(&args.intrinsics)?;
    info!(
        "loaded intrinsics from {}: f = {:.2}, c = ({:.2}, {:.2}), dist = {:?}",
        args.intrinsics.display(),
        intrinsics.fx,
        intrinsics.cx,
        intrinsics.cy,
        distortion.coeffs(),
    );

    let model: Option<Model> = match &args.model {
        Some(path) => {
            let mut m = load_obj(path)?;
            adjust(&mut m.vertices, args.model_scale, args.model_z_offset);
            info!(
                "model {}: {} vertices, {} faces",
                path.display(),
                m.vertices.len(),
                m.faces.len()
            );
            Some(m)
        }
        None => None,
    };

    let frames = list_frames(&args.frames)?;
    fs::create_dir_all(&args.out).map_err(|source| CliError::OutputDir {
        path: args.out.display().to_string(),
        source,
    })?;

    let engine = PoseEngine::new(intrinsics, distortion);
    let pattern = Pattern::Checkerboard {
        cols: args.pattern_cols,
        rows: args.pattern_rows,
    };
    let object = pattern.object_points();

    for (i, path) in frames.iter().enumerate() {
        let mut frame = load_rgb(path)?;

        match engine.detect_checkerboard(&frame, args.pattern_cols, args.pattern_rows) {
            Ok(corners) => {
                draw_point_grid(&mut frame, &corners, Color::GREEN);
                match engine.solve_pose(&object, &corners) {
                    Ok(pose) => {
                        if let Some(m) = &model {
                            engine.render_model(&mut frame, m, &pose);
                        }
                        engine.render_axes(&mut frame, &pose, args.axis_length);
                    }
                    Err(e) => warn!("frame {i}: {e}"),
                }
            }
            Err(PoseError::NotFound) => debug!("frame {i}: pattern not found"),
            Err(e) => warn!("frame {i}: {e}"),
        }

        write_frame(&args.out, i, &frame)?;
    }
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
