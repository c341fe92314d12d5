use crate::config::{processed_name, TrimConfig};
use crate::media::MediaTools;
use crate::trials::MergedRow;
use anyhow::{Context, Result};

/// Result of trimming one merged row. Every row gets exactly one of these;
/// `code()` and `output_name()` become the two extra columns of the output
/// table.
#[derive(Debug, Clone, PartialEq)]
pub enum TrimOutcome {
    /// Clip written to the processed-uploads folder
    Trimmed { output: String },
    /// Existing clip accepted because skip-processed is enabled
    AlreadyProcessed { output: String },
    /// The trial has no recording at all
    NoVideoRecorded,
    /// A recording was logged but the file is not in raw_uploads
    FileMissing,
    /// A recording exists but the row carries no usable reaction time
    NoReactionTime,
    /// The probe tool failed on the source file
    ProbeFailed,
    /// The reaction-time window is longer than the recording
    StartBeforeZero,
    /// The re-encode tool failed
    EncodeFailed,
}

impl TrimOutcome {
    /// Outcome code recorded in the output table; "0" means success
    pub fn code(&self) -> String {
        match self {
            TrimOutcome::Trimmed { .. } | TrimOutcome::AlreadyProcessed { .. } => "0".to_string(),
            TrimOutcome::NoVideoRecorded => "No video recorded".to_string(),
            TrimOutcome::FileMissing => "1".to_string(),
            TrimOutcome::NoReactionTime => "no reaction time".to_string(),
            TrimOutcome::ProbeFailed => "Could not probe video".to_string(),
            TrimOutcome::StartBeforeZero => "start time < 0".to_string(),
            TrimOutcome::EncodeFailed => "could not run ffmpeg".to_string(),
        }
    }

    /// Processed filename, present only on success
    pub fn output_name(&self) -> Option<&str> {
        match self {
            TrimOutcome::Trimmed { output } | TrimOutcome::AlreadyProcessed { output } => {
                Some(output)
            }
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TrimOutcome::Trimmed { .. } | TrimOutcome::AlreadyProcessed { .. }
        )
    }
}

/// Trim one row's recording to its reaction-time window.
///
/// The clip keeps the end of the recording: the window ends when the video
/// does and starts `RT_vid` milliseconds before that.
pub fn trim_row(row: &MergedRow, cfg: &TrimConfig, tools: &dyn MediaTools) -> TrimOutcome {
    let Some(fname) = row.vid_fname.as_deref() else {
        return TrimOutcome::NoVideoRecorded;
    };

    let input = cfg.raw_uploads().join(fname);
    if !input.exists() {
        return TrimOutcome::FileMissing;
    }

    let output = processed_name(fname);
    let out_path = cfg.processed_uploads().join(&output);
    if cfg.skip_processed && out_path.exists() {
        return TrimOutcome::AlreadyProcessed { output };
    }

    let Some(rt_vid) = row.rt_vid.filter(|v| *v > 0.0) else {
        return TrimOutcome::NoReactionTime;
    };

    let meta = match tools.probe(&input) {
        Ok(meta) => meta,
        Err(_) => return TrimOutcome::ProbeFailed,
    };

    let clip_len = rt_vid / 1000.0;
    let start = meta.duration - clip_len;
    if start < 0.0 {
        return TrimOutcome::StartBeforeZero;
    }

    match tools.cut(&input, start, meta.fps, &out_path) {
        Ok(()) => TrimOutcome::Trimmed { output },
        Err(_) => TrimOutcome::EncodeFailed,
    }
}

/// Trim every merged row, producing one outcome per row in row order
pub fn trim_all(
    rows: &[MergedRow],
    cfg: &TrimConfig,
    tools: &dyn MediaTools,
) -> Result<Vec<TrimOutcome>> {
    let processed_dir = cfg.processed_uploads();
    std::fs::create_dir_all(&processed_dir)
        .with_context(|| format!("Failed to create {}", processed_dir.display()))?;

    let mut outcomes = Vec::with_capacity(rows.len());
    for row in rows {
        if cfg.verbose {
            if let Some(fname) = &row.vid_fname {
                println!("{}", cfg.raw_uploads().join(fname).display());
            }
        }

        let outcome = trim_row(row, cfg, tools);

        if cfg.verbose {
            println!(
                "  {} - PID: {}, Trial: {}",
                describe(&outcome),
                row.pid,
                row.trial
            );
        }

        outcomes.push(outcome);
    }

    Ok(outcomes)
}

fn describe(outcome: &TrimOutcome) -> String {
    match outcome {
        TrimOutcome::Trimmed { output } => format!("Trimmed to {}", output),
        TrimOutcome::AlreadyProcessed { .. } => "Already processed, skipped".to_string(),
        TrimOutcome::NoVideoRecorded => "No video recorded".to_string(),
        TrimOutcome::FileMissing => "No video file found".to_string(),
        TrimOutcome::NoReactionTime => "No usable reaction time".to_string(),
        TrimOutcome::ProbeFailed => "Could not probe video, possibly corrupted".to_string(),
        TrimOutcome::StartBeforeZero => "Reaction-time window longer than recording".to_string(),
        TrimOutcome::EncodeFailed => "Could not run ffmpeg".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VideoMeta;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::fs;
    use std::path::{Path, PathBuf};

    struct FakeTools {
        meta: Option<VideoMeta>,
        fail_cut: bool,
        cuts: RefCell<Vec<(PathBuf, f64, f64, PathBuf)>>,
    }

    impl FakeTools {
        fn with_duration(duration: f64) -> Self {
            let frame_count = (duration * 30.0) as usize;
            Self {
                meta: Some(VideoMeta {
                    fps: frame_count as f64 / duration,
                    duration,
                    frame_count,
                    timestamps: Vec::new(),
                }),
                fail_cut: false,
                cuts: RefCell::new(Vec::new()),
            }
        }

        fn failing_probe() -> Self {
            Self {
                meta: None,
                fail_cut: false,
                cuts: RefCell::new(Vec::new()),
            }
        }
    }

    impl MediaTools for FakeTools {
        fn probe(&self, _input: &Path) -> anyhow::Result<VideoMeta> {
            self.meta.clone().ok_or_else(|| anyhow!("probe failed"))
        }

        fn cut(
            &self,
            input: &Path,
            start: f64,
            fps: f64,
            output: &Path,
        ) -> anyhow::Result<()> {
            self.cuts
                .borrow_mut()
                .push((input.to_path_buf(), start, fps, output.to_path_buf()));
            if self.fail_cut {
                anyhow::bail!("cut failed");
            }
            fs::write(output, b"clip")?;
            Ok(())
        }
    }

    fn fixture(skip_processed: bool) -> (tempfile::TempDir, TrimConfig) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrimConfig {
            data_dir: dir.path().to_path_buf(),
            task_tag: "task-wk8y".to_string(),
            output_csv: dir.path().join("merged.csv"),
            skip_processed,
            verbose: false,
        };
        fs::create_dir_all(cfg.raw_uploads()).unwrap();
        fs::create_dir_all(cfg.processed_uploads()).unwrap();
        (dir, cfg)
    }

    fn row(vid_fname: Option<&str>, rt_vid: Option<f64>) -> MergedRow {
        MergedRow {
            exp_version: None,
            pid: "p1".to_string(),
            trial: "1".to_string(),
            response: None,
            answer: None,
            correct: None,
            raw_rt: rt_vid.map(|v| v + 1600.0),
            rt: rt_vid.map(|v| v - 750.0),
            rt_vid,
            left_image: None,
            right_image: None,
            ratio: None,
            distance: None,
            vid_fname: vid_fname.map(str::to_string),
        }
    }

    #[test]
    fn test_no_filename_is_terminal() {
        let (_dir, cfg) = fixture(false);
        let tools = FakeTools::with_duration(10.0);
        let outcome = trim_row(&row(None, Some(2000.0)), &cfg, &tools);
        assert_eq!(outcome, TrimOutcome::NoVideoRecorded);
        assert_eq!(outcome.code(), "No video recorded");
        assert!(tools.cuts.borrow().is_empty());
    }

    #[test]
    fn test_missing_file_is_code_one() {
        let (_dir, cfg) = fixture(false);
        let tools = FakeTools::with_duration(10.0);
        let outcome = trim_row(&row(Some("gone.webm"), Some(2000.0)), &cfg, &tools);
        assert_eq!(outcome, TrimOutcome::FileMissing);
        assert_eq!(outcome.code(), "1");
    }

    #[test]
    fn test_successful_trim_window() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        let tools = FakeTools::with_duration(10.0);

        let outcome = trim_row(&row(Some("rec.webm"), Some(2000.0)), &cfg, &tools);
        assert_eq!(
            outcome,
            TrimOutcome::Trimmed {
                output: "rec_processed.mp4".to_string()
            }
        );
        assert_eq!(outcome.code(), "0");
        assert_eq!(outcome.output_name(), Some("rec_processed.mp4"));

        let cuts = tools.cuts.borrow();
        assert_eq!(cuts.len(), 1);
        let (input, start, fps, output) = &cuts[0];
        assert!(input.ends_with("raw_uploads/rec.webm"));
        assert!((start - 8.0).abs() < 1e-9, "start = duration - RT_vid/1000");
        assert!((fps - 30.0).abs() < 1e-9, "fps comes from the probe");
        assert!(output.ends_with("processed_uploads/rec_processed.mp4"));
    }

    #[test]
    fn test_window_longer_than_recording() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        let tools = FakeTools::with_duration(1.5);

        let outcome = trim_row(&row(Some("rec.webm"), Some(2000.0)), &cfg, &tools);
        assert_eq!(outcome, TrimOutcome::StartBeforeZero);
        assert_eq!(outcome.code(), "start time < 0");
        assert!(tools.cuts.borrow().is_empty(), "No re-encode for a bad window");
    }

    #[test]
    fn test_skip_existing_does_not_reencode() {
        let (_dir, cfg) = fixture(true);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        fs::write(cfg.processed_uploads().join("rec_processed.mp4"), b"y").unwrap();
        let tools = FakeTools::with_duration(10.0);

        let outcome = trim_row(&row(Some("rec.webm"), Some(2000.0)), &cfg, &tools);
        assert_eq!(
            outcome,
            TrimOutcome::AlreadyProcessed {
                output: "rec_processed.mp4".to_string()
            }
        );
        assert_eq!(outcome.code(), "0");
        assert!(tools.cuts.borrow().is_empty());
    }

    #[test]
    fn test_existing_output_is_overwritten_without_skip() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        fs::write(cfg.processed_uploads().join("rec_processed.mp4"), b"y").unwrap();
        let tools = FakeTools::with_duration(10.0);

        let outcome = trim_row(&row(Some("rec.webm"), Some(2000.0)), &cfg, &tools);
        assert!(outcome.is_success());
        assert_eq!(tools.cuts.borrow().len(), 1);
    }

    #[test]
    fn test_probe_failure() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        let tools = FakeTools::failing_probe();

        let outcome = trim_row(&row(Some("rec.webm"), Some(2000.0)), &cfg, &tools);
        assert_eq!(outcome, TrimOutcome::ProbeFailed);
        assert_eq!(outcome.code(), "Could not probe video");
    }

    #[test]
    fn test_missing_reaction_time() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        let tools = FakeTools::with_duration(10.0);

        assert_eq!(
            trim_row(&row(Some("rec.webm"), None), &cfg, &tools),
            TrimOutcome::NoReactionTime
        );
        assert_eq!(
            trim_row(&row(Some("rec.webm"), Some(-400.0)), &cfg, &tools),
            TrimOutcome::NoReactionTime,
            "A response before the recording started has no usable window"
        );
    }

    #[test]
    fn test_encode_failure() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        let mut tools = FakeTools::with_duration(10.0);
        tools.fail_cut = true;

        let outcome = trim_row(&row(Some("rec.webm"), Some(2000.0)), &cfg, &tools);
        assert_eq!(outcome, TrimOutcome::EncodeFailed);
        assert_eq!(outcome.code(), "could not run ffmpeg");
    }

    #[test]
    fn test_trim_all_preserves_row_order() {
        let (_dir, cfg) = fixture(false);
        fs::write(cfg.raw_uploads().join("rec.webm"), b"x").unwrap();
        let tools = FakeTools::with_duration(10.0);

        let rows = vec![
            row(None, Some(2000.0)),
            row(Some("rec.webm"), Some(2000.0)),
            row(Some("gone.webm"), Some(2000.0)),
        ];
        let outcomes = trim_all(&rows, &cfg, &tools).unwrap();
        assert_eq!(outcomes.len(), rows.len());
        assert_eq!(outcomes[0], TrimOutcome::NoVideoRecorded);
        assert!(outcomes[1].is_success());
        assert_eq!(outcomes[2], TrimOutcome::FileMissing);
    }
}
