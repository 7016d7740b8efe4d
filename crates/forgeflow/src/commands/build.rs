use forgeflow_config::Context;

/// 設定済みホストのマシンイメージを作成する
pub async fn handle(
    ctx: &Context,
    name: Option<String>,
    update_application: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut host = crate::utils::open_host(ctx, name)?;
    let image = host.build(update_application, quiet).await?;
    println!("{image}");
    Ok(())
}
