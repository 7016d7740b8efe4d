use forgeflow_config::Context;

/// 適用済みインフラから取得できる出力値
#[derive(Debug, Clone, Copy)]
pub enum Output {
    SshPrivateKey,
    SshUser,
    PrivateIp,
    PublicIp,
}

/// Terraform出力値をひとつ表示する
pub async fn handle(ctx: &Context, name: Option<String>, output: Output) -> anyhow::Result<()> {
    let host = crate::utils::open_host(ctx, name)?;
    let value = match output {
        Output::SshPrivateKey => host.ssh_private_key().await?.display().to_string(),
        Output::SshUser => host.ssh_user().await?,
        Output::PrivateIp => host.private_ip().await?,
        Output::PublicIp => host.public_ip().await?,
    };
    println!("{value}");
    Ok(())
}
