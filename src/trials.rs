use crate::config::{TrimConfig, PROCESSED_UPLOADS_DIR, RAW_UPLOADS_DIR, SCREEN_DELAY_MS, VIDEO_DELAY_MS};
use crate::trim::TrimOutcome;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// Platform tags identifying the rows we care about
const TRIAL_SCREEN: &str = "trial";
const ZONE_KEYBOARD: &str = "response_keyboard";
const ZONE_TIMELIMIT: &str = "timelimit_screen";
const ZONE_VIDEO: &str = "video_recording";

// Uploaded recordings are local .webm files; anything with a URL in the
// response was never downloaded alongside the exports
const CONTAINER_TOKEN: &str = ".webm";
const URL_TOKEN: &str = "https";

/// One row of a raw platform export. Exports from different task versions
/// carry different column sets, so everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRow {
    #[serde(rename = "Experiment Version")]
    pub experiment_version: Option<String>,
    #[serde(rename = "Participant Public ID")]
    pub participant: Option<String>,
    #[serde(rename = "Trial Number")]
    pub trial: Option<String>,
    #[serde(rename = "Screen Name")]
    pub screen_name: Option<String>,
    #[serde(rename = "Zone Type")]
    pub zone_type: Option<String>,
    #[serde(rename = "Response")]
    pub response: Option<String>,
    #[serde(rename = "ANSWER")]
    pub answer: Option<String>,
    #[serde(rename = "Correct")]
    pub correct: Option<String>,
    #[serde(rename = "Reaction Time")]
    pub reaction_time: Option<f64>,
    #[serde(rename = "LeftImage")]
    pub left_image: Option<String>,
    #[serde(rename = "RightImage")]
    pub right_image: Option<String>,
}

/// One trial joined (where possible) with its uploaded recording
#[derive(Debug, Clone)]
pub struct MergedRow {
    pub exp_version: Option<String>,
    pub pid: String,
    pub trial: String,
    pub response: Option<String>,
    pub answer: Option<String>,
    pub correct: Option<String>,
    pub raw_rt: Option<f64>,
    /// Reaction time corrected for recording and on-screen delay
    pub rt: Option<f64>,
    /// Reaction time relative to the start of the recording
    pub rt_vid: Option<f64>,
    pub left_image: Option<String>,
    pub right_image: Option<String>,
    pub ratio: Option<f64>,
    pub distance: Option<f64>,
    pub vid_fname: Option<String>,
}

#[derive(Debug, Clone)]
struct VideoRef {
    pid: String,
    trial: String,
    fname: String,
}

/// Load the task's export files, filter and derive trial data, and left-join
/// each trial with its uploaded recording.
pub fn build_merged_table(cfg: &TrimConfig) -> Result<Vec<MergedRow>> {
    let files = collect_export_files(&cfg.data_dir, &cfg.task_tag)?;
    if files.is_empty() {
        anyhow::bail!(
            "No export files matching {:?} under {}",
            cfg.task_tag,
            cfg.data_dir.display()
        );
    }

    let rows = load_rows(&files)?;
    let trials = trial_records(&rows);
    let refs = video_refs(&rows);
    Ok(join(trials, &refs))
}

/// Collect every export file whose name contains `tag` from the session
/// folders under `data_dir`, skipping the reserved upload folders.
/// Folders and files are visited in name order so reruns are deterministic.
pub fn collect_export_files(data_dir: &Path, tag: &str) -> Result<Vec<PathBuf>> {
    let mut sessions: Vec<PathBuf> = std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read export root {}", data_dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n != RAW_UPLOADS_DIR && n != PROCESSED_UPLOADS_DIR)
        })
        .collect();
    sessions.sort();

    let mut files = Vec::new();
    for session in sessions {
        let mut matched: Vec<PathBuf> = std::fs::read_dir(&session)
            .with_context(|| format!("Failed to read session folder {}", session.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| n.contains(tag))
            })
            .collect();
        matched.sort();
        files.extend(matched);
    }

    Ok(files)
}

/// Parse and concatenate the export files
pub fn load_rows(files: &[PathBuf]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    for file in files {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(file)
            .with_context(|| format!("Failed to open export {}", file.display()))?;
        for record in reader.deserialize() {
            let row: RawRow =
                record.with_context(|| format!("Bad row in {}", file.display()))?;
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Filter to trial-screen response/timeout rows and derive the per-trial fields
fn trial_records(rows: &[RawRow]) -> Vec<MergedRow> {
    rows.iter()
        .filter(|r| r.screen_name.as_deref() == Some(TRIAL_SCREEN))
        .filter(|r| {
            matches!(
                r.zone_type.as_deref(),
                Some(ZONE_KEYBOARD) | Some(ZONE_TIMELIMIT)
            )
        })
        .filter_map(|r| {
            // Rows without a join key can never match a recording
            let pid = r.participant.clone()?;
            let trial = r.trial.clone()?;

            let left = r.left_image.as_deref().map(clean_stimulus);
            let right = r.right_image.as_deref().map(clean_stimulus);
            let (ratio, distance) = stimulus_metrics(left.as_deref(), right.as_deref());

            Some(MergedRow {
                exp_version: r.experiment_version.clone(),
                pid,
                trial,
                response: r.response.as_deref().map(clean_key_response),
                answer: r.answer.as_deref().map(clean_key_response),
                correct: r.correct.clone(),
                raw_rt: r.reaction_time,
                rt: r.reaction_time.map(|t| t - (VIDEO_DELAY_MS + SCREEN_DELAY_MS)),
                rt_vid: r.reaction_time.map(|t| t - VIDEO_DELAY_MS),
                left_image: left,
                right_image: right,
                ratio,
                distance,
                vid_fname: None,
            })
        })
        .collect()
}

/// Filter to locally uploaded recording rows
fn video_refs(rows: &[RawRow]) -> Vec<VideoRef> {
    rows.iter()
        .filter(|r| r.zone_type.as_deref() == Some(ZONE_VIDEO))
        .filter_map(|r| {
            let fname = r.response.clone()?;
            if !fname.contains(CONTAINER_TOKEN) || fname.contains(URL_TOKEN) {
                return None;
            }
            Some(VideoRef {
                pid: r.participant.clone()?,
                trial: r.trial.clone()?,
                fname,
            })
        })
        .collect()
}

/// Left join trials with recordings on (participant, trial), fanning out on
/// duplicate keys, then sort by (participant, trial).
fn join(trials: Vec<MergedRow>, refs: &[VideoRef]) -> Vec<MergedRow> {
    let mut by_key: HashMap<(&str, &str), Vec<&str>> = HashMap::new();
    for r in refs {
        by_key
            .entry((r.pid.as_str(), r.trial.as_str()))
            .or_default()
            .push(r.fname.as_str());
    }

    let mut merged = Vec::with_capacity(trials.len());
    for trial in trials {
        let fnames = by_key.get(&(trial.pid.as_str(), trial.trial.as_str()));
        match fnames {
            Some(fnames) => {
                for fname in fnames {
                    let mut row = trial.clone();
                    row.vid_fname = Some(fname.to_string());
                    merged.push(row);
                }
            }
            None => merged.push(trial),
        }
    }

    // Join keys are strings end to end, so trial "10" sorts before trial "2"
    merged.sort_by(|a, b| (&a.pid, &a.trial).cmp(&(&b.pid, &b.trial)));
    merged
}

/// Recover the bare numeric token from a stimulus filename ("0015.png" -> "15")
fn clean_stimulus(raw: &str) -> String {
    let s = raw.strip_prefix("00").unwrap_or(raw);
    s.strip_suffix(".png").unwrap_or(s).to_string()
}

/// Strip the response-key prefix from a response/answer value
fn clean_key_response(raw: &str) -> String {
    raw.strip_prefix("keyq_")
        .or_else(|| raw.strip_prefix("keyp_"))
        .unwrap_or(raw)
        .to_string()
}

/// Ratio and absolute distance of the stimulus pair. Both are None unless
/// both values parse; the ratio is additionally None for a zero pair.
fn stimulus_metrics(left: Option<&str>, right: Option<&str>) -> (Option<f64>, Option<f64>) {
    let (Some(l), Some(r)) = (
        left.and_then(|v| v.parse::<f64>().ok()),
        right.and_then(|v| v.parse::<f64>().ok()),
    ) else {
        return (None, None);
    };

    let (min, max) = if l <= r { (l, r) } else { (r, l) };
    let ratio = (max != 0.0).then(|| min / max);
    (ratio, Some((l - r).abs()))
}

/// Write the merged table with the per-row trim outcomes appended
pub fn write_output(rows: &[MergedRow], outcomes: &[TrimOutcome], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record([
        "exp_version",
        "PID",
        "trial",
        "Response",
        "ANSWER",
        "Correct",
        "raw_RT",
        "RT",
        "RT_vid",
        "LeftImage",
        "RightImage",
        "meta_ratio",
        "meta_distance",
        "vid_fname",
        "error_codes",
        "processed_fname",
    ])?;

    for (row, outcome) in rows.iter().zip(outcomes) {
        writer.write_record([
            opt_str(&row.exp_version),
            row.pid.clone(),
            row.trial.clone(),
            opt_str(&row.response),
            opt_str(&row.answer),
            opt_str(&row.correct),
            opt_num(row.raw_rt),
            opt_num(row.rt),
            opt_num(row.rt_vid),
            opt_str(&row.left_image),
            opt_str(&row.right_image),
            opt_num(row.ratio),
            opt_num(row.distance),
            opt_str(&row.vid_fname),
            outcome.code(),
            outcome.output_name().unwrap_or_default().to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
