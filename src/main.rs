use anyhow::Context;
use clap::{Parser, Subcommand};
use permit_scout::{
    input, progress_percent, report, BatchObserver, ChromeScraper, PermitResult, ScraperConfig,
    StepObserver, StepRecord, StepStatus, Target,
};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "permit-scout")]
#[command(about = "Latest delivered building permit per address, from the BDES map portal")]
#[command(version)]
struct Cli {
    /// Portal config file (built-in defaults when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long, global = true, conflicts_with = "headed")]
    headless: bool,

    /// Show the browser window (overrides config)
    #[arg(long, global = true)]
    headed: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up a single company address
    Scrape {
        company: String,
        address: String,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up every target of a CSV or JSON file
    Batch {
        /// Target list (.xlsx, .csv or .json)
        input: PathBuf,

        /// Report file (.xlsx, .csv or .json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate the config without launching a browser
    Check,
}

/// Prints batch progress to stdout.
struct ConsoleProgress;

impl BatchObserver for ConsoleProgress {
    fn on_start(&self, index: usize, total: usize, target: &Target) {
        println!(
            "[{}/{}] {:>3}% {}",
            index + 1,
            total,
            progress_percent(index, total),
            target
        );
    }

    fn on_step(&self, _index: usize, record: &StepRecord) {
        print_step(record);
    }

    fn on_result(&self, _index: usize, result: &PermitResult) {
        print_result(result);
    }
}

fn print_step(record: &StepRecord) {
    let mark = match record.status {
        StepStatus::Pending => return,
        StepStatus::Success => "✓",
        StepStatus::Error => "✗",
    };
    if record.message.is_empty() {
        println!("    {} {}", mark, record.step);
    } else {
        println!("    {} {}: {}", mark, record.step, record.message);
    }
}

fn print_result(result: &PermitResult) {
    println!("  → {}", result.status);
    if result.status != result.resolution {
        println!("    Resolution: {}", result.resolution);
    }
    if let Some(ref date) = result.latest_permit_date {
        println!("    Latest permit: {}", date);
    }
    if let Some(ref link) = result.permit_page_link {
        println!("    Page: {}", link);
    }
    if let Some(ref error) = result.error_message {
        println!("    Error: {}", error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = match cli.config {
        Some(ref path) => ScraperConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScraperConfig::default(),
    };
    if cli.headless {
        config.browser.headless = true;
    }
    if cli.headed {
        config.browser.headless = false;
    }

    match cli.command {
        Command::Check => {
            println!("Config valid");
            println!("  Portal: {}", config.portal.url);
            println!("  Headless: {}", config.browser.headless);
            println!(
                "  Viewport: {}x{}",
                config.browser.viewport.width, config.browser.viewport.height
            );
            println!("  Pacing: {}ms", config.pacing_ms);
            println!("  Parcel threshold: {}", config.parcel_threshold);
            for (name, list) in config.strategies.lists() {
                println!("  {}: {} strategies", name, list.len());
            }
            if let Some(ref on_failure) = config.on_failure {
                println!("  Failure screenshots: {}", on_failure.screenshot);
            }
            Ok(())
        }
        Command::Scrape {
            company,
            address,
            json,
        } => {
            let target = Target::new(company, address);
            let mut scraper = ChromeScraper::chrome(config);
            scraper.initialize().await.context("launching browser")?;
            println!("{}", target);
            let show: &dyn StepObserver = &|record: &StepRecord| print_step(record);
            let result = scraper.scrape_permit(&target, Some(show)).await;
            scraper.close().await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            if !result.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Batch {
            input: list,
            output,
        } => {
            let targets = input::load_targets(&list)
                .with_context(|| format!("reading targets from {}", list.display()))?;
            let mut scraper = ChromeScraper::chrome(config);
            let outcome = scraper.scrape_batch(&targets, Some(&ConsoleProgress)).await;
            scraper.close().await?;
            let results = outcome?;

            println!();
            for (status, count) in report::tally(&results) {
                if count > 0 {
                    println!("  {}: {}", status, count);
                }
            }
            if let Some(ref output) = output {
                report::export(&results, output)
                    .with_context(|| format!("writing report {}", output.display()))?;
                println!("  Report: {}", output.display());
            }
            Ok(())
        }
    }
}
