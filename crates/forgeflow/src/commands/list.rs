use forgeflow_config::Context;

/// 既存のホスト設定名を一覧表示する
pub fn handle(ctx: &Context) -> anyhow::Result<()> {
    for name in ctx.iter_host_names() {
        println!("{name}");
    }
    Ok(())
}
