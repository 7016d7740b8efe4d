//! アプリケーション定義
//!
//! ドキュメントオーバーレイモデルをプロビジョニングスキーマに特化させた
//! 型付きファサード。ロード時に全検証とプロバイダ別ビューのキャッシュ構築を
//! 行います（fail fast）。

use crate::document::{Document, Mapping, Resolved};
use crate::error::{CoreError, Result};
use crate::schema::section_spec;
use serde_yaml::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// YAML ファイルを読み込む
pub fn yaml_read(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|error| CoreError::Read {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    serde_yaml::from_str(&content).map_err(|error| CoreError::Read {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

/// YAML ファイルを書き出す
pub fn yaml_write(value: &Value, path: &Path) -> Result<()> {
    let content = serde_yaml::to_string(value).map_err(|error| CoreError::Write {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    std::fs::write(path, content).map_err(|error| CoreError::Write {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

/// アプリケーション定義
///
/// プロバイダ別の解決済みビューは構築時にキャッシュされます。
/// `set_override` による変更はキャッシュを再構築します。
#[derive(Debug, Clone)]
pub struct Definition {
    path: Option<PathBuf>,
    document: Document,
    default_view: Resolved,
    provider_views: HashMap<String, Resolved>,
}

impl Definition {
    /// YAML ファイルから定義をロードする
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let document = Document::validate(yaml_read(path)?)?;
        tracing::debug!(
            path = %path.display(),
            providers = document.providers().len(),
            "Definition loaded"
        );
        Ok(Self::build(Some(path.to_path_buf()), document))
    }

    /// メモリ上の値から定義を構築する
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(Self::build(None, Document::validate(value)?))
    }

    fn build(path: Option<PathBuf>, document: Document) -> Self {
        let default_view = document.resolve(None);
        let provider_views = document
            .providers()
            .iter()
            .map(|name| (name.clone(), document.resolve(Some(name))))
            .collect();
        Self {
            path,
            document,
            default_view,
            provider_views,
        }
    }

    /// 定義中に現れたプロバイダ名の集合（読み取り専用）
    pub fn providers(&self) -> &BTreeSet<String> {
        self.document.providers()
    }

    /// ロード元のファイルパス
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// プロバイダの解決済みビュー
    ///
    /// 未知のプロバイダ（オーバーライドを一切持たない名前）は
    /// デフォルトビューにフォールバックします。
    pub fn resolved(&self, provider: Option<&str>) -> &Resolved {
        provider
            .and_then(|name| self.provider_views.get(name))
            .unwrap_or(&self.default_view)
    }

    /// 解決済みのキー値を返す
    ///
    /// スキーマ外のセクション・キーの組はエラー（未設定扱いではない）。
    pub fn get(&self, section: &str, key: &str, provider: Option<&str>) -> Result<Option<&Value>> {
        let spec = section_spec(section).ok_or_else(|| {
            CoreError::Configuration(format!("\"{section}\" は定義スキーマにありません"))
        })?;
        spec.key_spec(key).ok_or_else(|| {
            CoreError::Configuration(format!(
                "\"{section}\" セクションに \"{key}\" キーはありません"
            ))
        })?;
        Ok(self.resolved(provider).get(section, key))
    }

    /// 文字列値を返す
    pub fn get_str(&self, section: &str, key: &str, provider: Option<&str>) -> Result<Option<&str>> {
        Ok(self.get(section, key, provider)?.and_then(Value::as_str))
    }

    /// 整数値を返す
    pub fn get_int(&self, section: &str, key: &str, provider: Option<&str>) -> Result<Option<i64>> {
        Ok(self.get(section, key, provider)?.and_then(Value::as_i64))
    }

    /// 真偽値を返す
    pub fn get_bool(
        &self,
        section: &str,
        key: &str,
        provider: Option<&str>,
    ) -> Result<Option<bool>> {
        Ok(self.get(section, key, provider)?.and_then(Value::as_bool))
    }

    /// 文字列リスト値を返す（未設定は空リスト）
    pub fn get_str_list(
        &self,
        section: &str,
        key: &str,
        provider: Option<&str>,
    ) -> Result<Vec<String>> {
        Ok(self
            .get(section, key, provider)?
            .and_then(Value::as_sequence)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// マッピング値を返す（未設定は空マッピング）
    pub fn get_map(
        &self,
        section: &str,
        key: &str,
        provider: Option<&str>,
    ) -> Result<serde_yaml::Mapping> {
        Ok(self
            .get(section, key, provider)?
            .and_then(Value::as_mapping)
            .cloned()
            .unwrap_or_default())
    }

    /// リストセクションの解決済みエントリ列を返す
    pub fn section_list(&self, section: &str, provider: Option<&str>) -> &[Mapping] {
        self.resolved(provider).list(section)
    }

    /// セクションのキー値を書き換える
    ///
    /// 変更後に解決済みビューを再構築します。
    pub fn set_override(
        &mut self,
        section: &str,
        provider: Option<&str>,
        key: &str,
        value: Value,
    ) -> Result<()> {
        self.document.set_override(section, provider, key, value)?;
        let rebuilt = Self::build(self.path.take(), self.document.clone());
        *self = rebuilt;
        Ok(())
    }

    /// 定義をファイルに保存する
    ///
    /// ロード元ファイルの書式・コメントは保持されません（検証済みの内容を
    /// 再シリアライズします）。
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let target = path.or(self.path.as_deref()).ok_or(CoreError::NoSavePath)?;
        yaml_write(&self.document.to_value(), target)
    }

    /// 生（未解決）の定義を値として返す
    pub fn to_value(&self) -> Value {
        self.document.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition_value() -> Value {
        serde_yaml::from_str(
            r#"
application:
  product_id: my_product_id
  version: 1.0.0
package:
  - type: container_image
    name: my_image
fpga:
  image: img
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_from_value_defaults() {
        let definition = Definition::from_value(definition_value()).unwrap();

        assert_eq!(definition.get_int("fpga", "count", None).unwrap(), Some(1));
        assert_eq!(
            definition.get_str_list("fpga", "image", None).unwrap(),
            vec!["img".to_string()]
        );
        assert_eq!(
            definition.get_bool("accelize_drm", "use_service", None).unwrap(),
            Some(true)
        );
        assert!(definition.providers().is_empty());
    }

    #[test]
    fn test_get_unknown_key_is_error() {
        let definition = Definition::from_value(definition_value()).unwrap();
        assert!(definition.get("fpga", "nope", None).is_err());
        assert!(definition.get("nope", "image", None).is_err());
    }

    #[test]
    fn test_provider_fallback() {
        let value: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - name: n
    my_provider:
      name: provider_image
fpga:
  image: img
"#,
        )
        .unwrap();
        let definition = Definition::from_value(value).unwrap();

        assert_eq!(
            definition.get_str("package", "name", Some("my_provider")).unwrap(),
            Some("provider_image")
        );
        // オーバーライドのないキーはデフォルトへフォールスルー
        assert_eq!(
            definition.get_str_list("fpga", "image", Some("my_provider")).unwrap(),
            vec!["img".to_string()]
        );
        // 未知のプロバイダはデフォルトビュー
        assert_eq!(
            definition.get_str("package", "name", Some("unknown")).unwrap(),
            Some("n")
        );
    }

    #[test]
    fn test_save_requires_path() {
        let definition = Definition::from_value(definition_value()).unwrap();
        assert!(matches!(definition.save(None), Err(CoreError::NoSavePath)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.yml");
        yaml_write(&definition_value(), &path).unwrap();

        let mut definition = Definition::from_path(&path).unwrap();
        definition
            .set_override("package", Some("aws"), "name", Value::String("ami-1".into()))
            .unwrap();
        definition.save(None).unwrap();

        let reloaded = Definition::from_path(&path).unwrap();
        assert_eq!(
            reloaded.get_str("package", "name", Some("aws")).unwrap(),
            Some("ami-1")
        );
        assert_eq!(reloaded.get_str("package", "name", None).unwrap(), Some("my_image"));
    }

    #[test]
    fn test_invalid_file_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.yml");
        std::fs::write(&path, "application:\n  product_id: p\n").unwrap();
        assert!(Definition::from_path(&path).is_err());
    }

    #[test]
    fn test_firewall_rules_list() {
        let value: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - name: n
firewall_rules:
  - start_port: 1000
    end_port: 1000
  - start_port: 1001
    end_port: 1100
    direction: egress
fpga:
  image: img
"#,
        )
        .unwrap();
        let definition = Definition::from_value(value).unwrap();
        let rules = definition.section_list("firewall_rules", None);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0]["protocol"].as_str(), Some("tcp"));
        assert_eq!(rules[1]["direction"].as_str(), Some("egress"));
    }
}
