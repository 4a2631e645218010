//! argus - abuse-detection observer for shared-account hunting.

use anyhow::Result;
use argus_core::Config;
use clap::{Parser, Subcommand};
use daemon::Daemon;

mod logging;

use logging::{init_console_logging, init_service_logging};

#[derive(Parser)]
#[command(name = "argus")]
#[command(about = "Detects accounts used from too many network locations and dispatches blocks")]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the observer service
  Run,
  /// Load and print the effective configuration, then exit
  Config,
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let _guard = match &cli.command {
    Commands::Run => init_service_logging(),
    _ => {
      init_console_logging();
      None
    }
  };

  match cli.command {
    Commands::Run => {
      let config = Config::from_env()?;
      Daemon::new(config).run().await?;
      Ok(())
    }
    Commands::Config => {
      let config = Config::from_env()?;
      println!("{config:#?}");
      Ok(())
    }
  }
}
