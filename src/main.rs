//! Camera calibration from recorded pattern detections.
//!
//! Replays a JSON detection log through a calibration session, calibrates
//! once the samples are well distributed (or unconditionally with `--force`),
//! prints the result and saves samples and results to the output directory.
//!
//! Usage:
//! ```bash
//! camera-calibration \
//!   --calibration-mode intrinsic \
//!   --camera-model pinhole \
//!   --pattern chessboard --rows 6 --columns 9 --square-size-mm 25 \
//!   --detections detections.json
//! ```

use camera_calibration::config::PatternConfig;
use camera_calibration::detections::DetectionLog;
use camera_calibration::result::CalibrationResult;
use camera_calibration::session::SessionCommand;
use camera_calibration::{
    CalibrationConfig, CalibrationError, CalibrationMode, CalibrationSession, CameraModel,
    Calibrator, ConfigurationError, LevenbergMarquardtSolver, PatternType,
};
use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{error, info, warn};
use std::path::PathBuf;

/// Camera calibration tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Calibration mode: intrinsic, stereo, hand_eye
    #[arg(long)]
    calibration_mode: Option<CalibrationMode>,

    /// Camera model for intrinsic/hand-eye calibration, or the left camera for stereo:
    /// pinhole, fisheye. Required unless a --config file provides it
    #[arg(long)]
    camera_model: Option<CameraModel>,

    /// Model of the right camera in stereo calibration (defaults to the left camera model)
    #[arg(long)]
    right_camera_model: Option<CameraModel>,

    /// Calibration pattern type: chessboard, acircles, radon_checkerboard (repeatable)
    #[arg(long = "pattern")]
    patterns: Vec<PatternType>,

    /// Number of rows in the pattern, one per --pattern
    #[arg(long)]
    rows: Vec<usize>,

    /// Number of columns in the pattern, one per --pattern
    #[arg(long)]
    columns: Vec<usize>,

    /// Square size of the pattern in millimeters, one per --pattern
    #[arg(long = "square-size-mm")]
    square_size_mm: Vec<f64>,

    /// Allowed slop in seconds when pairing images from unsynchronized stereo cameras
    #[arg(long)]
    approximate: Option<f64>,

    /// Number of radial distortion coefficients to use
    #[arg(long)]
    k_coefficients: Option<usize>,

    /// Fix the principal point at the center
    #[arg(long)]
    fix_principal_point: bool,

    /// Fix the aspect ratio
    #[arg(long)]
    fix_aspect_ratio: bool,

    /// YAML configuration; command line flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// JSON log of pattern detections to calibrate from
    #[arg(short = 'd', long)]
    detections: PathBuf,

    /// Directory receiving samples and results
    #[arg(short = 'o', long, default_value = "output")]
    output_dir: PathBuf,

    /// Calibrate even if the sample distribution is insufficient
    #[arg(short = 'f', long)]
    force: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Zips the repeated pattern flags into complete pattern groups.
fn pattern_groups(cli: &Cli) -> Result<Vec<PatternConfig>, ConfigurationError> {
    let n = cli.patterns.len();
    if cli.rows.len() != n || cli.columns.len() != n || cli.square_size_mm.len() != n {
        return Err(ConfigurationError::IncompletePattern(
            "each --pattern needs its own --rows, --columns and --square-size-mm".to_string(),
        ));
    }
    Ok(cli
        .patterns
        .iter()
        .zip(&cli.rows)
        .zip(&cli.columns)
        .zip(&cli.square_size_mm)
        .map(|(((&pattern_type, &rows), &columns), &square_size)| PatternConfig {
            pattern_type,
            rows,
            columns,
            square_size,
        })
        .collect())
}

/// Overlays command line flags on the configuration file (or the defaults).
fn build_config(cli: &Cli) -> Result<CalibrationConfig, ConfigurationError> {
    let mut config = match &cli.config {
        Some(path) => CalibrationConfig::load(path)?,
        None => CalibrationConfig::default(),
    };
    if let Some(mode) = cli.calibration_mode {
        config.mode = mode;
    }
    match (cli.camera_model, &cli.config) {
        (Some(model), _) => config.camera_model = model,
        (None, Some(_)) => {}
        (None, None) => {
            return Err(ConfigurationError::Invalid(
                "--camera-model is required without --config".to_string(),
            ))
        }
    }
    if cli.right_camera_model.is_some() {
        config.right_camera_model = cli.right_camera_model;
    }
    let patterns = pattern_groups(cli)?;
    if !patterns.is_empty() {
        config.patterns = patterns;
    }
    if let Some(approximate) = cli.approximate {
        config.approximate = approximate;
    }
    if let Some(k) = cli.k_coefficients {
        config.k_coefficients = k;
    }
    config.fix_principal_point |= cli.fix_principal_point;
    config.fix_aspect_ratio |= cli.fix_aspect_ratio;
    config.validate()?;
    Ok(config)
}

fn print_result(result: &CalibrationResult) {
    match result {
        CalibrationResult::Mono(r) => print!("{}", r.intrinsics),
        CalibrationResult::Stereo(r) => {
            println!("# left");
            print!("{}", r.left.intrinsics);
            println!("# right");
            print!("{}", r.right.intrinsics);
            println!("# extrinsics");
            print!("{}", r.extrinsics_text());
        }
        CalibrationResult::HandEye(r) => {
            print!("{}", r.camera.intrinsics);
            let t = r.gripper_to_camera.translation.vector;
            let q = r.gripper_to_camera.rotation;
            println!("gripper_to_camera:");
            println!("  translation: [{:.8}, {:.8}, {:.8}]", t.x, t.y, t.z);
            println!(
                "  rotation_xyzw: [{:.8}, {:.8}, {:.8}, {:.8}]",
                q.i, q.j, q.k, q.w
            );
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    Logger::try_with_str(&cli.log_level)?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        // error;warn;info;debug;trace
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let mut config = build_config(&cli)?;
    let log = DetectionLog::load(&cli.detections)?;
    if log.resolution != config.resolution {
        info!(
            "Using image size {}x{} from the detection log",
            log.resolution.width, log.resolution.height
        );
        config.resolution = log.resolution;
    }
    info!(
        "{} calibration of a {} camera with {} pattern(s), {} frames",
        config.mode,
        config.camera_model,
        config.patterns.len(),
        log.frames.len()
    );

    let calibrator = Calibrator::from_config(&config)?;
    let mut session = CalibrationSession::new(
        calibrator,
        LevenbergMarquardtSolver::default(),
        config.build_patterns()?,
        &cli.output_dir,
    );

    for (index, frame) in log.frames.iter().enumerate() {
        if let Err(e) = session.observe_detection(index, frame) {
            warn!("Skipping frame: {e}");
        }
    }
    let stats = session.calibrator().stats();
    info!(
        "{} samples, {} points, distribution good: {}",
        session.calibrator().sample_count(),
        stats.total_points,
        session.calibrator().distribution_is_good()
    );

    match session.calibrate(cli.force) {
        Ok(result) => {
            print_result(&result);
            Ok(())
        }
        Err(camera_calibration::session::SessionError::Calibration(CalibrationError::NotReady)) => {
            error!("Not enough well distributed samples; rerun with --force to calibrate anyway");
            session.save()?;
            info!(
                "Commands of an interactive session:\n{}",
                SessionCommand::instructions()
            );
            Err(CalibrationError::NotReady.into())
        }
        Err(e) => {
            session.save()?;
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["camera-calibration", "--detections", "d.json"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_repeated_pattern_groups() {
        let cli = parse(&[
            "--camera-model", "pinhole",
            "--pattern", "chessboard", "--rows", "6", "--columns", "9", "--square-size-mm", "25",
            "--pattern", "acircles", "--rows", "4", "--columns", "11", "--square-size-mm", "20",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.patterns.len(), 2);
        assert_eq!(config.patterns[1].pattern_type, PatternType::AcirclesGrid);
        assert_eq!(config.patterns[1].columns, 11);
    }

    #[test]
    fn test_incomplete_pattern_is_rejected() {
        let cli = parse(&[
            "--camera-model", "pinhole", "--pattern", "chessboard", "--rows", "6", "--columns", "9",
        ]);
        assert!(matches!(
            build_config(&cli),
            Err(ConfigurationError::IncompletePattern(_))
        ));
    }

    #[test]
    fn test_right_model_requires_stereo_mode() {
        let cli = parse(&["--camera-model", "pinhole", "--right-camera-model", "fisheye"]);
        assert!(build_config(&cli).is_err());

        let cli = parse(&[
            "--calibration-mode",
            "stereo",
            "--camera-model",
            "pinhole",
            "--right-camera-model",
            "fisheye",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.right_model(), CameraModel::Fisheye);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "--k-coefficients",
            "3",
            "--fix-principal-point",
            "--camera-model",
            "fisheye",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.k_coefficients, 3);
        assert!(config.fix_principal_point);
        assert!(!config.fix_aspect_ratio);
        assert_eq!(config.camera_model, CameraModel::Fisheye);
    }

    #[test]
    fn test_unknown_mode_fails_to_parse() {
        let result = Cli::try_parse_from([
            "camera-calibration",
            "--detections",
            "d.json",
            "--calibration-mode",
            "mono",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_camera_model_required_without_config() {
        let cli = parse(&["--calibration-mode", "intrinsic"]);
        assert!(matches!(build_config(&cli), Err(ConfigurationError::Invalid(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration.yaml");
        CalibrationConfig {
            camera_model: CameraModel::Fisheye,
            ..Default::default()
        }
        .save(&path)
        .unwrap();
        let config_arg = path.to_string_lossy().into_owned();
        let cli = parse(&["--config", config_arg.as_str()]);
        assert_eq!(
            build_config(&cli).unwrap().camera_model,
            CameraModel::Fisheye
        );
    }
}
