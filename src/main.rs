use clap::Parser;
use colored::Colorize;
use pixel_agent::cli::{run, Args};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = run(args).await {
        eprintln!("{} {e}", "Error:".red().bold());
        std::process::exit(1);
    }
}
