use clap::Parser;
use colored::Colorize;
use ftpsync::config::Config;
use ftpsync::sync::Syncer;
use ftpsync::transport::ftp::FtpTransport;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config.validate() {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
    if !config.local_dir.is_dir() {
        eprintln!(
            "{} local directory not found: {}",
            "error:".red().bold(),
            config.local_dir.display()
        );
        std::process::exit(1);
    }

    let ftp_config = match config.ftp_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            std::process::exit(1);
        }
    };

    let syncer = Syncer::new(config, FtpTransport::new(ftp_config));
    if let Err(e) = syncer.run().await {
        eprintln!("{} {e:#}", "deployment failed:".red().bold());
        std::process::exit(1);
    }
}
