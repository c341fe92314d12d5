use crate::config::ExtractConfig;
use crate::gaze::GazeEstimator;
use crate::media;
use crate::overlay;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;

/// Rendered clips always use this rate, whatever the source had
const RENDER_FPS: f64 = 30.0;

/// One successfully scored frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameObservation {
    pub video: String,
    pub frame: usize,
    pub face_count: usize,
    pub pitch: f32,
    pub yaw: f32,
}

/// Per-video scoring result
struct VideoScore {
    observations: Vec<FrameObservation>,
    errors: Vec<String>,
    /// Annotated frames written to the render scratch dir
    rendered: usize,
}

/// Score every video in the configured input directory and write the
/// accumulated observation table to results.csv.
pub fn run(cfg: &ExtractConfig, estimator: &mut dyn GazeEstimator) -> Result<()> {
    let started = Instant::now();

    let videos = list_videos(&cfg.input_dir)?;
    let mut results: Vec<FrameObservation> = Vec::new();

    let mut processed = 0;
    for video in &videos {
        if cfg.max_videos > 0 && processed >= cfg.max_videos {
            break;
        }
        processed += 1;

        let name = video
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("video")
            .to_string();
        let video_started = Instant::now();

        // A video that cannot even be decoded is reported and skipped; it
        // must not take the rest of the batch down with it.
        match process_video(video, &name, cfg, estimator, &mut results) {
            Ok(errors) if errors.is_empty() => {
                println!(
                    "Processed {} in {:.2}s",
                    name,
                    video_started.elapsed().as_secs_f64()
                );
            }
            Ok(errors) => {
                println!(
                    "Processed {} in {:.2}s with {} errors",
                    name,
                    video_started.elapsed().as_secs_f64(),
                    errors.len()
                );
            }
            Err(e) => {
                println!("Failed to process {}: {:#}", name, e);
            }
        }
    }

    write_results(&results, cfg)?;

    println!(
        "Finished processing. Time elapsed: {:.2}s",
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Video files to score, in name order
fn list_videos(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut videos: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read input directory {}", input_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    videos.sort();
    Ok(videos)
}

/// Dump one video's frames, score each, and encode the annotated copy when
/// rendering is on. Returns the per-frame error list.
fn process_video(
    video: &Path,
    name: &str,
    cfg: &ExtractConfig,
    estimator: &mut dyn GazeEstimator,
    results: &mut Vec<FrameObservation>,
) -> Result<Vec<String>> {
    let frames_dir = TempDir::new().context("Failed to create frame directory")?;
    let frame_count = media::dump_frames(video, frames_dir.path())?;

    let render_dir = if cfg.save_videos {
        Some(TempDir::new().context("Failed to create render directory")?)
    } else {
        None
    };

    let score = score_frames(
        name,
        frames_dir.path(),
        frame_count,
        estimator,
        render_dir.as_ref().map(|d| d.path()),
    )?;

    if let Some(render_dir) = &render_dir {
        if score.rendered > 0 {
            std::fs::create_dir_all(cfg.videos_dir())
                .with_context(|| format!("Failed to create {}", cfg.videos_dir().display()))?;
            media::encode_frames(render_dir.path(), &cfg.rendered_path(name), RENDER_FPS)?;
        } else {
            println!("WARNING: No frames found for {}", name);
        }
    }

    results.extend(score.observations);
    Ok(score.errors)
}

/// Run the estimator over dumped frames 1..=frame_count.
///
/// A frame with no detection or a failed estimate contributes an error entry
/// instead of an observation; a frame with several detections is recorded
/// with its face count but only the first detection's angles.
fn score_frames(
    video_name: &str,
    frames_dir: &Path,
    frame_count: usize,
    estimator: &mut dyn GazeEstimator,
    render_dir: Option<&Path>,
) -> Result<VideoScore> {
    let pb = ProgressBar::new(frame_count as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut observations = Vec::new();
    let mut errors = Vec::new();
    let mut rendered = 0;
    let mut face_count_warned = false;

    for index in 1..=frame_count {
        pb.inc(1);
        let frame_path = media::frame_path(frames_dir, index);
        let frame_number = index - 1;

        let output = match estimator.estimate(&frame_path) {
            Ok(output) => output,
            Err(e) => {
                errors.push(format!("frame {}: {:#}", frame_number, e));
                continue;
            }
        };

        let Some((pitch, yaw)) = output.primary() else {
            errors.push(format!("frame {}: no face detected", frame_number));
            continue;
        };

        let face_count = output.face_count();
        if face_count != 1 && !face_count_warned {
            println!(
                "WARNING: Found {} faces in frame {} of {}. Using the first entry.",
                face_count, frame_number, video_name
            );
            face_count_warned = true;
        }

        observations.push(FrameObservation {
            video: video_name.to_string(),
            frame: frame_number,
            face_count,
            pitch,
            yaw,
        });

        if let Some(render_dir) = render_dir {
            match render_frame(&frame_path, &output, render_dir, rendered + 1) {
                Ok(()) => rendered += 1,
                Err(e) => errors.push(format!("frame {}: render: {:#}", frame_number, e)),
            }
        }
    }

    pb.finish_and_clear();
    Ok(VideoScore {
        observations,
        errors,
        rendered,
    })
}

/// Annotate one frame and write it into the render scratch dir. Rendered
/// frames are renumbered from 1 so skipped frames leave no gaps in the
/// encoder's input pattern.
fn render_frame(
    frame_path: &Path,
    output: &crate::gaze::GazeOutput,
    render_dir: &Path,
    index: usize,
) -> Result<()> {
    let frame = image::open(frame_path)
        .with_context(|| format!("Failed to open {}", frame_path.display()))?
        .to_rgb8();
    let annotated = overlay::annotate(&frame, output);
    annotated
        .save(media::frame_path(render_dir, index))
        .context("Failed to save annotated frame")?;
    Ok(())
}

/// Write the observation table; the header is always present, even for an
/// empty run.
fn write_results(results: &[FrameObservation], cfg: &ExtractConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("Failed to create {}", cfg.output_dir.display()))?;

    let path = cfg.results_path();
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(["video", "frame", "face_count", "pitch", "yaw"])?;
    for observation in results {
        writer.serialize(observation)?;
    }
    writer.flush()?;

    println!("Results written to {}", path.display());
    Ok(())
}
