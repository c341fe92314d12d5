use std::path::{Path, PathBuf};

/// Recording starts this long before the trial screen appears (milliseconds)
pub const VIDEO_DELAY_MS: f64 = 1600.0;
/// Additional on-screen delay before the stimulus is visible (milliseconds)
pub const SCREEN_DELAY_MS: f64 = 750.0;

/// Upload folders living alongside the per-session export folders
pub const RAW_UPLOADS_DIR: &str = "raw_uploads";
pub const PROCESSED_UPLOADS_DIR: &str = "processed_uploads";

/// Configuration for the joiner + trimmer pipeline
#[derive(Debug, Clone)]
pub struct TrimConfig {
    /// Root of the raw experiment exports (session folders + upload folders)
    pub data_dir: PathBuf,
    /// Substring identifying the task's export files, e.g. "task-wk8y"
    pub task_tag: String,
    /// Where the merged trial/video/outcome table is written
    pub output_csv: PathBuf,
    /// Treat an existing processed file as success instead of re-encoding
    pub skip_processed: bool,
    /// Per-row progress lines on stdout
    pub verbose: bool,
}

impl TrimConfig {
    /// Directory holding the uploaded recordings
    pub fn raw_uploads(&self) -> PathBuf {
        self.data_dir.join(RAW_UPLOADS_DIR)
    }

    /// Directory the trimmed clips are written to
    pub fn processed_uploads(&self) -> PathBuf {
        self.data_dir.join(PROCESSED_UPLOADS_DIR)
    }
}

/// Configuration for the gaze extraction pipeline
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Directory of videos to score
    pub input_dir: PathBuf,
    /// Directory for results.csv and rendered clips
    pub output_dir: PathBuf,
    /// Encode annotated copies of the scored videos
    pub save_videos: bool,
    /// Stop after this many videos (0 = no limit)
    pub max_videos: usize,
}

impl ExtractConfig {
    pub fn results_path(&self) -> PathBuf {
        self.output_dir.join("results.csv")
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.output_dir.join("videos")
    }

    pub fn rendered_path(&self, video_name: &str) -> PathBuf {
        self.videos_dir().join(format!("{}.mp4", video_name))
    }
}

/// Output filename for a trimmed clip: source stem + "_processed.mp4"
pub fn processed_name(vid_fname: &str) -> String {
    let stem = Path::new(vid_fname)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(vid_fname);
    format!("{}_processed.mp4", stem)
}
