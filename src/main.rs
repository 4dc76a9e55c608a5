#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = edugrade_rust::run().await {
        eprintln!("edugrade-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
