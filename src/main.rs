use tracing::error;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    if let Err(e) = polyflow::cli::run().await {
        error!(error = %e, "Fatal error");
        eprintln!("polyflow: {e}");
        std::process::exit(1);
    }
}
