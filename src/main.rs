mod cli;
mod config;
mod extract;
mod gaze;
mod media;
mod overlay;
mod trials;
mod trim;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Trim {
            data_dir,
            task,
            output,
            skip_processed,
            quiet,
        } => {
            let cfg = config::TrimConfig {
                data_dir,
                task_tag: task,
                output_csv: output,
                skip_processed,
                verbose: !quiet,
            };

            let rows = trials::build_merged_table(&cfg)?;
            println!("Merged {} trial rows", rows.len());

            let outcomes = trim::trim_all(&rows, &cfg, &media::Ffmpeg)?;
            trials::write_output(&rows, &outcomes, &cfg.output_csv)?;

            let trimmed = outcomes.iter().filter(|o| o.is_success()).count();
            println!(
                "Done! {} of {} rows trimmed, table written to {}",
                trimmed,
                outcomes.len(),
                cfg.output_csv.display()
            );
        }
        Commands::Extract {
            input_dir,
            output_dir,
            worker,
            save_videos,
            max_videos,
        } => {
            let cfg = config::ExtractConfig {
                input_dir,
                output_dir,
                save_videos,
                max_videos,
            };

            let mut estimator = gaze::SidecarEstimator::spawn(&worker)?;
            extract::run(&cfg, &mut estimator)?;
        }
    }

    Ok(())
}
