use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("定義ファイル読み込みエラー: {path}\n理由: {message}")]
    Read { path: PathBuf, message: String },

    #[error("定義ファイル書き込みエラー: {path}\n理由: {message}")]
    Write { path: PathBuf, message: String },

    #[error("無効な定義: {0}")]
    Configuration(String),

    #[error("保存先パスが指定されていません（メモリ上の定義は path を指定して保存してください）")]
    NoSavePath,
}

pub type Result<T> = std::result::Result<T, CoreError>;
