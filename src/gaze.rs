use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// Detections for one frame. Pitch and yaw are parallel arrays in the
/// model's detection order, in degrees; boxes are pixel-space face boxes
/// (x, y, width, height) when the model reports them.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct GazeOutput {
    #[serde(default)]
    pub pitch: Vec<f32>,
    #[serde(default)]
    pub yaw: Vec<f32>,
    #[serde(default)]
    pub boxes: Vec<[f32; 4]>,
}

impl GazeOutput {
    /// Number of reported detections; the arrays can disagree, so take the max
    pub fn face_count(&self) -> usize {
        self.pitch.len().max(self.yaw.len())
    }

    /// The first detection's (pitch, yaw), if there is one
    pub fn primary(&self) -> Option<(f32, f32)> {
        match (self.pitch.first(), self.yaw.first()) {
            (Some(&pitch), Some(&yaw)) => Some((pitch, yaw)),
            _ => None,
        }
    }
}

/// Seam over the external gaze model: one decoded frame in, zero or more
/// detections out. The frame is handed over as a file path because the
/// production implementation lives in another process.
pub trait GazeEstimator {
    fn estimate(&mut self, frame: &Path) -> Result<GazeOutput>;
}

#[derive(Debug, Deserialize)]
struct WorkerReply {
    #[serde(default)]
    pitch: Vec<f32>,
    #[serde(default)]
    yaw: Vec<f32>,
    #[serde(default)]
    boxes: Vec<[f32; 4]>,
    #[serde(default)]
    error: Option<String>,
}

/// Gaze estimation backed by a long-lived worker child process.
///
/// The worker reads one JSON request per line on stdin ({"image": <path>})
/// and answers with one JSON reply per line on stdout: either the detection
/// arrays or {"error": <message>}. Spawning the worker once amortizes model
/// load across every frame of the run.
pub struct SidecarEstimator {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SidecarEstimator {
    /// Spawn `command` (program plus whitespace-separated arguments)
    pub fn spawn(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .context("Empty gaze worker command")?;

        let mut child = Command::new(program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn gaze worker {:?}", command))?;

        let stdin = child.stdin.take().context("Gaze worker has no stdin")?;
        let stdout = child.stdout.take().context("Gaze worker has no stdout")?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

impl GazeEstimator for SidecarEstimator {
    fn estimate(&mut self, frame: &Path) -> Result<GazeOutput> {
        let request = serde_json::json!({ "image": frame.to_string_lossy() });
        writeln!(self.stdin, "{}", request).context("Failed to write to gaze worker")?;
        self.stdin.flush().context("Failed to flush gaze worker stdin")?;

        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .context("Failed to read from gaze worker")?;
        if read == 0 {
            anyhow::bail!("Gaze worker closed its output");
        }

        parse_reply(&line)
    }
}

impl Drop for SidecarEstimator {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn parse_reply(line: &str) -> Result<GazeOutput> {
    let reply: WorkerReply =
        serde_json::from_str(line.trim()).context("Bad reply from gaze worker")?;

    if let Some(error) = reply.error {
        anyhow::bail!("Gaze worker error: {}", error);
    }

    Ok(GazeOutput {
        pitch: reply.pitch,
        yaw: reply.yaw,
        boxes: reply.boxes,
    })
}
