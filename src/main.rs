use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = mk2_bridge::app().await {
        log::error!("{:?}", e);
        std::process::exit(255);
    }

    Ok(())
}
