use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gazescore")]
#[command(about = "Trim trial recordings and score gaze direction frame by frame")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Join trial exports with uploaded recordings and trim each recording
    /// to its reaction-time window
    Trim {
        /// Root of the raw experiment exports
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Substring identifying the task's export files
        #[arg(long, default_value = "task-wk8y")]
        task: String,

        /// Merged trial/video/outcome table
        #[arg(short, long, default_value = "number_comparison_processed_output.csv")]
        output: PathBuf,

        /// Treat an existing processed clip as success instead of re-encoding
        #[arg(long)]
        skip_processed: bool,

        /// Suppress per-row progress lines
        #[arg(long)]
        quiet: bool,
    },

    /// Score gaze direction for every video in a directory
    Extract {
        /// Directory of videos to score
        input_dir: PathBuf,

        /// Output directory for results.csv and rendered clips
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Gaze worker command (program plus arguments)
        #[arg(long, default_value = "python3 scripts/gaze_worker.py")]
        worker: String,

        /// Encode annotated copies of the scored videos
        #[arg(long)]
        save_videos: bool,

        /// Stop after this many videos (0 = no limit)
        #[arg(long, default_value_t = 0)]
        max_videos: usize,
    },
}
