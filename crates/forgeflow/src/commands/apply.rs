use colored::Colorize;
use forgeflow_config::Context;

/// ホストのインフラを作成する
pub async fn handle(ctx: &Context, name: Option<String>, quiet: bool) -> anyhow::Result<()> {
    let mut host = crate::utils::open_host(ctx, name)?;
    host.apply(quiet).await?;

    if !quiet {
        let key_arg = if host.ssh_private_key().await.is_ok() {
            " -i $(forge ssh-private-key)"
        } else {
            ""
        };
        println!(
            "{}",
            format!(
                "\nホストには以下のコマンドで接続できます:\n\
                 ssh -Yt{key_arg} $(forge ssh-user)@$(forge public-ip)"
            )
            .cyan()
        );
    }
    Ok(())
}
