use clap::Parser;
use payout_cli::{init_logger, run, PayoutCliArgs, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let args = PayoutCliArgs::parse();

    init_logger(&args.log_level)?;

    let report = run(args).await?;
    println!("{report}");
    Ok(())
}
