#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlite_gateway_lib::run().await
}
