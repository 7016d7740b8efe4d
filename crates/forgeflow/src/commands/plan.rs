use forgeflow_config::Context;

/// インフラ作成の実行計画を表示する
pub async fn handle(ctx: &Context, name: Option<String>) -> anyhow::Result<()> {
    let host = crate::utils::open_host(ctx, name)?;
    let plan = host.plan().await?;
    println!("{plan}");
    Ok(())
}
