use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use url_phishing_detector::{render, telemetry, Scanner, ScoringPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about = "URL phishing risk scanner", long_about = None)]
struct Args {
    /// URL to analyze
    #[arg(required_unless_present = "print_policy")]
    url: Option<String>,

    /// Output JSON
    #[arg(short, long)]
    json: bool,

    /// Scoring policy file (TOML) layered over the built-in defaults
    #[arg(long, env = "URL_PHISHING_POLICY")]
    policy: Option<PathBuf>,

    /// Print the effective scoring policy and exit
    #[arg(long)]
    print_policy: bool,

    /// Overall scan deadline in seconds
    #[arg(long, value_name = "SECS")]
    deadline: Option<u64>,

    /// More log output on stderr
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    telemetry::init_tracing(level);

    let policy = ScoringPolicy::load(args.policy.as_deref()).context("loading scoring policy")?;

    if args.print_policy {
        print!("{}", policy.to_toml()?);
        if args.url.is_none() {
            return Ok(());
        }
    }

    let Some(url) = args.url else {
        return Ok(());
    };

    let mut scanner = Scanner::new(Arc::new(policy)).context("building scanner")?;
    if let Some(secs) = args.deadline {
        scanner = scanner.with_deadline(Duration::from_secs(secs));
    }

    let report = scanner.scan(&url);
    if args.json {
        println!("{}", render::json(&report)?);
    } else {
        print!("{}", render::text(&report));
    }
    Ok(())
}
