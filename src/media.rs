use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Timing metadata probed from a video file
#[derive(Debug, Clone)]
pub struct VideoMeta {
    pub fps: f64,
    pub duration: f64,
    pub frame_count: usize,
    pub timestamps: Vec<f64>,
}

/// Narrow seam over the external probe/re-encode binaries so the trimming
/// logic can run against a fake in tests.
pub trait MediaTools {
    /// Probe per-frame timestamps and derived timing for a video file
    fn probe(&self, input: &Path) -> Result<VideoMeta>;

    /// Re-encode `input` from `start` seconds to its end at `fps`, writing `output`
    fn cut(&self, input: &Path, start: f64, fps: f64, output: &Path) -> Result<()>;
}

/// MediaTools backed by the ffprobe/ffmpeg binaries on PATH
pub struct Ffmpeg;

impl MediaTools for Ffmpeg {
    fn probe(&self, input: &Path) -> Result<VideoMeta> {
        let output = Command::new("ffprobe")
            .args(["-hide_banner", "-loglevel", "error"])
            .arg(input)
            .args([
                "-show_frames",
                "-show_entries",
                "frame=pkt_pts_time",
                "-of",
                "csv=p=0",
            ])
            .output()
            .context("Failed to run ffprobe")?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                input.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn cut(&self, input: &Path, start: f64, fps: f64, output: &Path) -> Result<()> {
        let start_str = format!("{}", start);
        let fps_str = format!("{}", fps);

        // Regenerate timestamps while seeking; lossless quality, overwrite target
        let status = Command::new("ffmpeg")
            .args(["-fflags", "+genpts", "-ss", start_str.as_str(), "-i"])
            .arg(input)
            .args(["-r", fps_str.as_str(), "-qscale", "0", "-y"])
            .arg(output)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .context("Failed to run ffmpeg")?;

        if !status.success() {
            anyhow::bail!("ffmpeg re-encode failed for {}", input.display());
        }

        Ok(())
    }
}

/// Parse ffprobe's newline-separated frame timestamps. The last line is the
/// total duration, the line count is the frame count.
pub fn parse_probe_output(raw: &str) -> Result<VideoMeta> {
    let timestamps: Vec<f64> = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            l.parse::<f64>()
                .with_context(|| format!("Bad frame timestamp: {:?}", l))
        })
        .collect::<Result<_>>()?;

    let duration = *timestamps
        .last()
        .context("Probe returned no frame timestamps")?;
    if duration <= 0.0 {
        anyhow::bail!("Probed duration is not positive: {}", duration);
    }

    let frame_count = timestamps.len();
    Ok(VideoMeta {
        fps: frame_count as f64 / duration,
        duration,
        frame_count,
        timestamps,
    })
}

/// Dump every frame of a video to numbered JPEGs in `output_dir`.
/// Returns the number of frames written.
pub fn dump_frames(input: &Path, output_dir: &Path) -> Result<usize> {
    let output_pattern = output_dir.join("frame_%06d.jpg");

    let status = Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args([
            "-vsync",
            "0",
            "-q:v",
            "2", // High quality JPEG
        ])
        .arg(&output_pattern)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .context("Failed to run ffmpeg for frame extraction")?;

    if !status.success() {
        anyhow::bail!("FFmpeg frame extraction failed for {}", input.display());
    }

    // Count extracted frames
    let count = std::fs::read_dir(output_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map_or(false, |ext| ext == "jpg"))
        .count();

    Ok(count)
}

/// Path of the `index`-th (1-based) dumped frame in `frames_dir`
pub fn frame_path(frames_dir: &Path, index: usize) -> std::path::PathBuf {
    frames_dir.join(format!("frame_{:06}.jpg", index))
}

/// Encode a directory of numbered JPEG frames into an mp4 at `fps`
pub fn encode_frames(frames_dir: &Path, output: &Path, fps: f64) -> Result<()> {
    let input_pattern = frames_dir.join("frame_%06d.jpg");

    let status = Command::new("ffmpeg")
        .args(["-framerate", &format!("{}", fps), "-i"])
        .arg(&input_pattern)
        .args([
            "-c:v",
            "libx264",
            "-preset",
            "fast",
            "-crf",
            "18",
            "-pix_fmt",
            "yuv420p",
            "-y",
        ])
        .arg(output)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .context("Failed to run ffmpeg for encoding")?;

    if !status.success() {
        anyhow::bail!("FFmpeg encoding failed");
    }

    Ok(())
}
