use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use taxi_pipeline::{
    app::{self, Job},
    config::{Config, CONFIG_ENV},
    schedule,
};

/// NYC yellow-taxi ingestion: scrape to S3, load into Snowflake, report.
#[derive(Parser, Debug)]
#[command(name = "taxi-pipeline", version)]
struct Cli {
    /// YAML config; defaults to ./pipeline.yaml
    #[arg(long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage new trip files and the weather window in S3
    Scrape,
    /// COPY newly staged files into the warehouse
    Load,
    /// Render the dashboard for the report window
    Report,
    /// Print the monthly crontab, or install it with --install
    Crontab {
        #[arg(long)]
        install: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Scrape => app::execute(Job::Scrape, config_path).await,
        Command::Load => app::execute(Job::Load, config_path).await,
        Command::Report => app::execute(Job::Report, config_path).await,
        Command::Crontab { install } => crontab(config_path, install),
    }
}

fn crontab(config_path: Option<&std::path::Path>, install: bool) -> ExitCode {
    let result = Config::load(config_path).and_then(|cfg| {
        let content = schedule::render(&cfg.schedule)?;
        if install {
            schedule::install(&content)?;
        }
        Ok(content)
    });
    match result {
        Ok(content) => {
            print!("{}", content);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("taxi-pipeline: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
