#[cfg(feature = "cli")]
#[tokio::main]
async fn main() {
    if let Err(err) = action_gen::cli::run().await {
        tracing::error!("{:#}", err);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Build with --features cli");
    std::process::exit(1);
}
