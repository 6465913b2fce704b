#[tokio::main]
async fn main() -> anyhow::Result<()> {
    classsight_lib::run().await
}
