// src/main.rs

use orcaq::job::JobState;
use orcaq::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("orcaq error: {err:?}");
            std::process::exit(1);
        }
    }
}

/// `Ok(true)` when every job ended `Done`.
async fn run_main() -> anyhow::Result<bool> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    let summary = run(args).await?;

    for job in &summary.jobs {
        let elapsed = job
            .elapsed()
            .map(|d| format!("{}s", d.num_seconds()))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<10} {:>6}  {}", job.state, elapsed, job.input_path.display());
        if job.state == JobState::Error {
            if let Some(msg) = &job.error_message {
                println!("           {}", msg.lines().next().unwrap_or(""));
            }
        }
    }

    Ok(summary.all_succeeded())
}
