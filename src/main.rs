#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bolita_lib::run().await
}
