use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error("キャッシュディレクトリが見つかりません")]
    CacheDirNotFound,

    #[error(
        "認証情報が見つかりません\nヒント: cred.json を \"{0}\" または実行ディレクトリに配置してください"
    )]
    CredentialsNotFound(PathBuf),

    #[error("認証情報読み込みエラー: {path}\n理由: {message}")]
    CredentialsRead { path: PathBuf, message: String },

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
