use hack_logs::app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let code = app::run().await?;
    std::process::exit(code);
}
