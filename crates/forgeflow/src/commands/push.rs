use colored::Colorize;
use forgeflow_core::Definition;
use forgeflow_config::Context;
use std::path::Path;

/// アプリケーション定義ファイルをウェブサービスに登録する
pub async fn handle(ctx: &Context, file: &Path) -> anyhow::Result<()> {
    let definition = Definition::from_path(file)?;
    crate::utils::ws_client(ctx)?.push(&definition).await?;
    println!("{} 定義を登録しました: {}", "✓".green(), file.display());
    Ok(())
}
