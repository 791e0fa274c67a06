#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examina_rust::run().await {
        eprintln!("examina-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
