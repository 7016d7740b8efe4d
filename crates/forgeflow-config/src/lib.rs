//! ForgeFlow の実行コンテキストとユーザー設定
//!
//! 設定・キャッシュディレクトリ、環境変数スイッチ、認証情報の探索、
//! `latest` マーカーを一箇所に集約します。プロセス環境を各所で直接読む
//! 代わりに、明示的な [`Context`] をコンストラクタへ渡します。

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 実行コンテキスト
///
/// 環境変数スイッチはすべて「存在すれば有効」のブール値です:
/// - `FORGEFLOW_CLI`: CLI モード（ディスクキャッシュと色付き出力を有効化）
/// - `FORGEFLOW_DEBUG`: デバッグモード（エラーを整形せず再送出）
/// - `FORGEFLOW_NO_COLOR`: 色付き出力を抑止
#[derive(Debug, Clone)]
pub struct Context {
    config_dir: PathBuf,
    cache_dir: PathBuf,
    cli_mode: bool,
    debug: bool,
    no_color: bool,
}

impl Context {
    /// プロセス環境からコンテキストを構築する
    pub fn from_env() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join("forgeflow");
        let cache_dir = dirs::cache_dir()
            .ok_or(ConfigError::CacheDirNotFound)?
            .join("forgeflow");
        Ok(Self {
            config_dir,
            cache_dir,
            cli_mode: env_flag("FORGEFLOW_CLI"),
            debug: env_flag("FORGEFLOW_DEBUG"),
            no_color: env_flag("FORGEFLOW_NO_COLOR"),
        })
    }

    /// ディレクトリを指定してコンテキストを構築する（主にテスト用）
    pub fn with_dirs(config_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            cache_dir: cache_dir.into(),
            cli_mode: false,
            debug: false,
            no_color: true,
        }
    }

    pub fn cli_mode(mut self, enabled: bool) -> Self {
        self.cli_mode = enabled;
        self
    }

    pub fn is_cli_mode(&self) -> bool {
        self.cli_mode
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn is_no_color(&self) -> bool {
        self.no_color
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// 設定ディレクトリを作成して返す
    ///
    /// Terraform の状態ファイルや SSH 秘密鍵を置くため、他ユーザーの
    /// アクセス権は落とします。
    pub fn ensure_config_dir(&self) -> Result<&Path> {
        ensure_private_dir(&self.config_dir)?;
        Ok(&self.config_dir)
    }

    /// キャッシュディレクトリを作成して返す
    pub fn ensure_cache_dir(&self) -> Result<&Path> {
        ensure_private_dir(&self.cache_dir)?;
        Ok(&self.cache_dir)
    }

    /// ホスト設定ディレクトリの親
    pub fn hosts_dir(&self) -> PathBuf {
        self.config_dir.join("hosts")
    }

    /// ツールの既定設定アセットを置くディレクトリ
    pub fn assets_dir(&self, tool: &str) -> PathBuf {
        self.config_dir.join("assets").join(tool)
    }

    /// 既存のホスト設定名を列挙する
    pub fn iter_host_names(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.hosts_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    /// 最後に使用したホスト設定名のマーカーファイル
    pub fn latest_path(&self) -> PathBuf {
        self.hosts_dir().join("latest")
    }

    /// `latest` マーカーを読む
    ///
    /// マーカーが指す設定ディレクトリが存在しない場合は None。
    pub fn read_latest(&self) -> Option<String> {
        let name = std::fs::read_to_string(self.latest_path()).ok()?;
        let name = name.trim().to_string();
        if !name.is_empty() && self.hosts_dir().join(&name).is_dir() {
            Some(name)
        } else {
            None
        }
    }

    /// `latest` マーカーを書く
    pub fn write_latest(&self, name: &str) -> Result<()> {
        std::fs::create_dir_all(self.hosts_dir())?;
        std::fs::write(self.latest_path(), name)?;
        Ok(())
    }

    /// 認証情報ファイル `cred.json` を探す
    ///
    /// 探索順: 設定ディレクトリ → カレントディレクトリ → 追加ディレクトリ。
    pub fn find_credentials(&self, extra_dirs: &[&Path]) -> Result<PathBuf> {
        let mut candidates = vec![self.config_dir.clone()];
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd);
        }
        candidates.extend(extra_dirs.iter().map(|dir| dir.to_path_buf()));

        for dir in candidates {
            let path = dir.join("cred.json");
            if path.is_file() {
                tracing::debug!(path = %path.display(), "Found credentials");
                return Ok(path);
            }
        }
        Err(ConfigError::CredentialsNotFound(self.config_dir.clone()))
    }
}

/// ディレクトリを作成し、アクセス権を所有者のみに制限する
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

/// ホスト設定ディレクトリを作成する（700）
pub fn ensure_host_dir(dir: &Path) -> Result<()> {
    ensure_private_dir(dir)
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|value| !value.is_empty())
}

/// ウェブサービス認証情報（`cred.json`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Credentials {
    /// `cred.json` を読み込む
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|error| ConfigError::CredentialsRead {
                path: path.to_path_buf(),
                message: error.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|error| ConfigError::CredentialsRead {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn test_context() -> (tempfile::TempDir, Context) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::with_dirs(dir.path().join("config"), dir.path().join("cache"));
        (dir, ctx)
    }

    #[test]
    fn test_from_env_flags() {
        temp_env::with_vars(
            [
                ("FORGEFLOW_CLI", Some("1")),
                ("FORGEFLOW_DEBUG", None),
                ("FORGEFLOW_NO_COLOR", Some("true")),
            ],
            || {
                let ctx = Context::from_env().unwrap();
                assert!(ctx.is_cli_mode());
                assert!(!ctx.is_debug());
                assert!(ctx.is_no_color());
                assert!(ctx.config_dir().ends_with("forgeflow"));
            },
        );
    }

    #[test]
    fn test_ensure_dirs() {
        let (_guard, ctx) = test_context();
        ctx.ensure_config_dir().unwrap();
        ctx.ensure_cache_dir().unwrap();
        assert!(ctx.config_dir().is_dir());
        assert!(ctx.cache_dir().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(ctx.config_dir()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn test_latest_marker() {
        let (_guard, ctx) = test_context();
        assert!(ctx.read_latest().is_none());

        // 設定ディレクトリが存在しない名前は無効
        ctx.write_latest("ghost").unwrap();
        assert!(ctx.read_latest().is_none());

        fs::create_dir_all(ctx.hosts_dir().join("host01")).unwrap();
        ctx.write_latest("host01").unwrap();
        assert_eq!(ctx.read_latest().as_deref(), Some("host01"));
    }

    #[test]
    fn test_iter_host_names() {
        let (_guard, ctx) = test_context();
        assert!(ctx.iter_host_names().is_empty());

        fs::create_dir_all(ctx.hosts_dir().join("bravo")).unwrap();
        fs::create_dir_all(ctx.hosts_dir().join("alpha")).unwrap();
        fs::write(ctx.hosts_dir().join("latest"), "alpha").unwrap();

        // ファイルは除外し、名前順で返す
        assert_eq!(ctx.iter_host_names(), vec!["alpha", "bravo"]);
    }

    #[test]
    fn test_find_credentials() {
        let (guard, ctx) = test_context();
        assert!(ctx.find_credentials(&[]).is_err());

        let extra = guard.path().join("extra");
        fs::create_dir_all(&extra).unwrap();
        fs::write(
            extra.join("cred.json"),
            r#"{"client_id": "id", "client_secret": "secret"}"#,
        )
        .unwrap();

        let found = ctx.find_credentials(&[&extra]).unwrap();
        let credentials = Credentials::from_path(&found).unwrap();
        assert_eq!(credentials.client_id, "id");
        assert!(credentials.endpoint.is_none());
    }

    #[test]
    fn test_credentials_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cred.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Credentials::from_path(&path),
            Err(ConfigError::CredentialsRead { .. })
        ));
    }
}
