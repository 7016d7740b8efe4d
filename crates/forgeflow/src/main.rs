mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "forge", version)]
#[command(about = "定義ファイルひとつで、FPGAアプリケーションのホストを。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 新しいホスト設定を作成
    Init {
        /// 作成する設定名。省略時はランダム名を生成し、標準出力に表示する
        #[arg(short, long)]
        name: Option<String>,
        /// アプリケーション。"product_id:version" 形式（versionを省略すると
        /// 最新版）、またはローカル定義ファイルのパス
        #[arg(short, long)]
        application: String,
        /// プロバイダ名
        #[arg(short, long)]
        provider: Option<String>,
        /// 追加のユーザー設定ディレクトリ
        #[arg(short = 'c', long)]
        user_config: Option<PathBuf>,
    },
    /// インフラ作成の実行計画を表示
    Plan {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
    },
    /// ホストのインフラを作成
    Apply {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
        /// 出力を表示しない
        #[arg(short, long)]
        quiet: bool,
    },
    /// 設定済みホストのマシンイメージを作成
    Build {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
        /// 作成したイメージを使うようにアプリケーション定義を更新する。
        /// 注意: YAMLの書式とコメントは失われる
        #[arg(short, long)]
        update_application: bool,
        /// 出力を表示しない
        #[arg(short, long)]
        quiet: bool,
    },
    /// ホストのインフラを破棄
    Destroy {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
        /// 出力を表示しない
        #[arg(short, long)]
        quiet: bool,
        /// 破棄後に設定も削除する
        #[arg(short, long)]
        delete: bool,
    },
    /// SSH秘密鍵のパスを表示
    SshPrivateKey {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
    },
    /// SSH接続に使うユーザー名を表示
    SshUser {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
    },
    /// プライベートIPアドレスを表示
    PrivateIp {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
    },
    /// パブリックIPアドレスを表示
    PublicIp {
        /// 使用する設定名（省略時は最後に使用した設定）
        #[arg(short, long)]
        name: Option<String>,
    },
    /// ホスト設定の一覧を表示
    List,
    /// アプリケーション定義ファイルを検証
    Lint {
        /// 検証するファイルのパス
        file: PathBuf,
    },
    /// アプリケーション定義ファイルをウェブサービスに登録
    Push {
        /// 登録するファイルのパス
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = forgeflow_config::Context::from_env()?.cli_mode(true);
    if ctx.is_no_color() {
        colored::control::set_override(false);
    }

    match run(cli.command, &ctx).await {
        Ok(()) => Ok(()),
        // デバッグモードではエラーをそのまま再送出する
        Err(error) if ctx.is_debug() => Err(error),
        Err(error) => {
            let text = error.to_string();
            let mut lines = text.lines();
            if let Some(first) = lines.next() {
                eprintln!("{}", first.red());
            }
            for line in lines {
                eprintln!("{line}");
            }
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, ctx: &forgeflow_config::Context) -> anyhow::Result<()> {
    match command {
        Commands::Init {
            name,
            application,
            provider,
            user_config,
        } => commands::init::handle(ctx, name, &application, provider, user_config).await,
        Commands::Plan { name } => commands::plan::handle(ctx, name).await,
        Commands::Apply { name, quiet } => commands::apply::handle(ctx, name, quiet).await,
        Commands::Build {
            name,
            update_application,
            quiet,
        } => commands::build::handle(ctx, name, update_application, quiet).await,
        Commands::Destroy {
            name,
            quiet,
            delete,
        } => commands::destroy::handle(ctx, name, quiet, delete).await,
        Commands::SshPrivateKey { name } => {
            commands::output::handle(ctx, name, commands::output::Output::SshPrivateKey).await
        }
        Commands::SshUser { name } => {
            commands::output::handle(ctx, name, commands::output::Output::SshUser).await
        }
        Commands::PrivateIp { name } => {
            commands::output::handle(ctx, name, commands::output::Output::PrivateIp).await
        }
        Commands::PublicIp { name } => {
            commands::output::handle(ctx, name, commands::output::Output::PublicIp).await
        }
        Commands::List => commands::list::handle(ctx),
        Commands::Lint { file } => commands::lint::handle(&file),
        Commands::Push { file } => commands::push::handle(ctx, &file).await,
    }
}
