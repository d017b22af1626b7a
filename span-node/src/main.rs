use clap::Parser;

use span_node::cli;

fn main() {
    let cli = cli::Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };
    rt.block_on(async {
        if let Err(e) = cli::run(cli).await {
            tracing::error!("Fatal error: {}", e);
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    });
}
