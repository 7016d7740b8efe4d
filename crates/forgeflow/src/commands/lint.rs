use colored::Colorize;
use forgeflow_core::Definition;
use std::path::Path;

/// アプリケーション定義ファイルを検証する
pub fn handle(file: &Path) -> anyhow::Result<()> {
    Definition::from_path(file)?;
    println!("{} 定義は有効です: {}", "✓".green(), file.display());
    Ok(())
}
