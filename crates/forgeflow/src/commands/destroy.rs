use forgeflow_config::Context;

/// ホストのインフラを破棄する
///
/// `--delete` 指定時は、状態が空になったことを確認した上で設定も削除する。
pub async fn handle(
    ctx: &Context,
    name: Option<String>,
    quiet: bool,
    delete: bool,
) -> anyhow::Result<()> {
    let mut host = crate::utils::open_host(ctx, name)?;
    host.destroy(quiet, Some(delete)).await?;
    host.close().await?;
    Ok(())
}
