use colored::Colorize;
use forgeflow_config::Context;
use forgeflow_provision::{ApplicationSource, Host, HostOptions};
use std::path::PathBuf;

/// 新しいホスト設定を作成する
pub async fn handle(
    ctx: &Context,
    name: Option<String>,
    application: &str,
    provider: Option<String>,
    user_config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let generated = name.is_none();
    let options = HostOptions {
        name,
        application: Some(ApplicationSource::detect(application)),
        provider,
        user_config,
        ..HostOptions::default()
    };
    let host = Host::create(ctx, options).await?;

    if generated {
        // 生成した名前はコマンド出力として返す
        println!("{}", host.name());
    } else {
        println!("{} 設定 \"{}\" を作成しました", "✓".green(), host.name());
    }
    ctx.write_latest(host.name())?;
    Ok(())
}
