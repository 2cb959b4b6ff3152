use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};

use planar_ar::model::adjust;
use planar_ar::vision::{draw_circle_filled, draw_marker_quad, Color};
use planar_ar::{
    init_with_level, load_intrinsics, load_obj, DetectTrackMachine, Model, Pattern, PoseEngine,
};
use planar_ar_cli::{list_frames, load_rgb, write_frame, CliError};

/// Detect and track a rectangular target, rendering an AR overlay on it.
#[derive(Parser)]
#[command(name = "ar_detect")]
struct Args {
    /// Directory holding the input frames, in name order
    #[arg(long)]
    frames: PathBuf,

    /// Intrinsics document written by `calibrate`
    #[arg(long, default_value = "calibration/intrinsics.json")]
    intrinsics: PathBuf,

    /// Output directory for the annotated frames
    #[arg(long, default_value = "ar_out")]
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

    /// Width of the tracked rectangle, in target units
    #[arg(long, default_value_t = 8.0)]
    rect_width: f64,

    /// Height of the tracked rectangle, in target units
    #[arg(long, default_value_t = 6.0)]
    rect_height: f64,

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
    let object = Pattern::Rectangle {
        width: args.rect_width,
        height: args.rect_height,
    }
    .object_points();
    let mut machine = DetectTrackMachine::new();

    for (i, path) in frames.iter().enumerate() {
        let mut frame = load_rgb(path)?;

        match machine.process_frame(&frame) {
            Some(corners) => {
                draw_marker_quad(&mut frame, &corners, Color::GREEN);
                for c in &corners {
                    draw_circle_filled(&mut frame, *c, 3, Color::RED);
                }
                match engine.solve_pose(&object, &corners) {
                    Ok(pose) => {
                        if let Some(m) = &model {
                            engine.render_model(&mut frame, m, &pose);
                        }
                        engine.render_axes(&mut frame, &pose, args.axis_length);
                    }
                    // The machine keeps its state; only the overlay is lost.
                    Err(e) => warn!("frame {i}: {e}"),
                }
            }
            None => debug!("frame {i}: no target ({:?})", machine.state()),
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
