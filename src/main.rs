use marchproxy::errors::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = marchproxy::cli::run_cli().await {
        tracing::error!(error = %e, "marchproxy exited with an error");
        std::process::exit(1);
    }
    Ok(())
}
