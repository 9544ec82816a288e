use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let config = rollcall_gateway::load_config()?;
    rollcall_gateway::run(config).await
}
