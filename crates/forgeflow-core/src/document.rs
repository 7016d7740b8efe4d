//! ドキュメントオーバーレイモデル
//!
//! スキーマ駆動の検証と、プロバイダ単位のオーバーライド解決を提供します。
//! 元データではオーバーライドはスキーマキーと同じ名前空間に同居しますが、
//! 検証後は `Node { defaults, overrides }` の明示的な2層構造に正規化され、
//! 解決（resolve）は「オーバーライドはキー単位で置換、未指定キーは
//! デフォルトにフォールスルー」という純粋関数になります。

use crate::error::{CoreError, Result};
use crate::schema::{
    DefaultValue, KeySpec, NodeKind, SCHEMA, SectionSpec, ValueKind, is_section_name,
};
use regex::Regex;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};

/// 文字列キーのマッピング
pub type Mapping = BTreeMap<String, Value>;

/// 検証済みノード
///
/// `defaults` は全スキーマキーを含む（未指定キーは null かデフォルト値）。
/// `overrides` はプロバイダ名 → 部分マッピング。
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub defaults: Mapping,
    pub overrides: BTreeMap<String, Mapping>,
}

impl Node {
    /// プロバイダ向けにフラット化したビューを返す（純粋関数）
    pub fn resolve(&self, provider: Option<&str>) -> Mapping {
        let mut resolved = self.defaults.clone();
        if let Some(name) = provider
            && let Some(over) = self.overrides.get(name)
        {
            for (key, value) in over {
                resolved.insert(key.clone(), value.clone());
            }
        }
        resolved
    }
}

/// 検証済みセクション
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    Mapping(Node),
    List(Vec<Node>),
}

impl Section {
    fn nodes(&self) -> &[Node] {
        match self {
            Section::Mapping(node) => std::slice::from_ref(node),
            Section::List(nodes) => nodes,
        }
    }
}

/// 検証済みドキュメント
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    sections: BTreeMap<String, Section>,
    providers: BTreeSet<String>,
}

/// プロバイダ解決済みのセクション
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSection {
    Mapping(Mapping),
    List(Vec<Mapping>),
}

/// プロバイダ解決済みのドキュメント（フラットビュー）
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    sections: BTreeMap<String, ResolvedSection>,
}

impl Resolved {
    /// セクション内のキー値を返す
    ///
    /// リストセクションは先頭エントリを参照します。null は None 扱い。
    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        let mapping = match self.sections.get(section)? {
            ResolvedSection::Mapping(mapping) => mapping,
            ResolvedSection::List(entries) => entries.first()?,
        };
        mapping.get(key).filter(|value| !value.is_null())
    }

    /// マッピングセクションのフラットビュー
    pub fn mapping(&self, section: &str) -> Option<&Mapping> {
        match self.sections.get(section)? {
            ResolvedSection::Mapping(mapping) => Some(mapping),
            ResolvedSection::List(_) => None,
        }
    }

    /// リストセクションのフラットビュー（マッピングセクションは空）
    pub fn list(&self, section: &str) -> &[Mapping] {
        match self.sections.get(section) {
            Some(ResolvedSection::List(entries)) => entries,
            _ => &[],
        }
    }
}

impl Document {
    /// 生の YAML 値を検証してドキュメントを構築する
    ///
    /// スキーマ違反はすべてこの時点で `CoreError::Configuration` になります
    /// （遅延検証はしない）。
    pub fn validate(root: Value) -> Result<Self> {
        let root = match root {
            Value::Mapping(mapping) => mapping,
            Value::Null => serde_yaml::Mapping::new(),
            _ => {
                return Err(CoreError::Configuration(
                    "定義のルートはマッピングである必要があります".to_string(),
                ));
            }
        };

        // 未知のトップレベルセクションを拒否
        for key in root.keys() {
            let name = key_as_str(key)?;
            if !is_section_name(name) {
                return Err(CoreError::Configuration(format!(
                    "不明なセクション \"{name}\" があります"
                )));
            }
        }

        let mut providers = BTreeSet::new();
        let mut sections = BTreeMap::new();

        for spec in SCHEMA {
            let entries = section_entries(spec, root.get(spec.name))?;

            if spec.require_entry && entries.is_empty() {
                return Err(CoreError::Configuration(format!(
                    "セクション \"{}\" には最低1つのマッピングが必要です",
                    spec.name
                )));
            }

            let mut nodes = Vec::with_capacity(entries.len());
            for entry in entries {
                nodes.push(validate_node(spec, entry, &mut providers)?);
            }

            let section = match spec.node {
                NodeKind::Mapping => {
                    // マッピングセクションは常に1ノード
                    Section::Mapping(nodes.remove(0))
                }
                NodeKind::List => Section::List(nodes),
            };
            sections.insert(spec.name.to_string(), section);
        }

        let document = Self {
            sections,
            providers,
        };
        document.check_required()?;
        Ok(document)
    }

    /// 必須キーが全プロバイダで非 null に解決できることを確認する
    ///
    /// オーバーライドを持たないノードはデフォルトビューでも確認します。
    /// オーバーライドを持つノードのデフォルトビューは、全プロバイダで必須が
    /// 満たされていれば null のままでも許容されます。
    fn check_required(&self) -> Result<()> {
        for spec in SCHEMA {
            let section = &self.sections[spec.name];
            for node in section.nodes() {
                for key in spec.keys.iter().filter(|key| key.required) {
                    for provider in &self.providers {
                        let satisfied = node
                            .overrides
                            .get(provider)
                            .and_then(|over| over.get(key.name))
                            .filter(|value| !value.is_null())
                            .or_else(|| {
                                node.defaults.get(key.name).filter(|value| !value.is_null())
                            })
                            .is_some();
                        if !satisfied {
                            return Err(CoreError::Configuration(format!(
                                "セクション \"{}\" の \"{}\" キーは \"{provider}\" プロバイダで必須です",
                                spec.name, key.name
                            )));
                        }
                    }

                    if node.overrides.is_empty()
                        && node
                            .defaults
                            .get(key.name)
                            .is_none_or(|value| value.is_null())
                    {
                        return Err(CoreError::Configuration(format!(
                            "セクション \"{}\" の \"{}\" キーは必須です",
                            spec.name, key.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// 定義中に現れたプロバイダ名の集合
    pub fn providers(&self) -> &BTreeSet<String> {
        &self.providers
    }

    /// 検証済みセクションを返す
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    /// プロバイダ向けのフラットビューを構築する（純粋関数）
    pub fn resolve(&self, provider: Option<&str>) -> Resolved {
        let sections = self
            .sections
            .iter()
            .map(|(name, section)| {
                let resolved = match section {
                    Section::Mapping(node) => ResolvedSection::Mapping(node.resolve(provider)),
                    Section::List(nodes) => ResolvedSection::List(
                        nodes.iter().map(|node| node.resolve(provider)).collect(),
                    ),
                };
                (name.clone(), resolved)
            })
            .collect();
        Resolved { sections }
    }

    /// セクションのキー値を書き換える
    ///
    /// マッピングセクション、またはリストセクションの先頭エントリが対象。
    /// `provider` 指定時はそのプロバイダのオーバーライドに書き込みます。
    /// 値はスキーマで検証されます。
    pub fn set_override(
        &mut self,
        section: &str,
        provider: Option<&str>,
        key: &str,
        value: Value,
    ) -> Result<()> {
        let spec = crate::schema::section_spec(section).ok_or_else(|| {
            CoreError::Configuration(format!("不明なセクション \"{section}\" があります"))
        })?;
        let key_spec = spec.key_spec(key).ok_or_else(|| {
            CoreError::Configuration(format!(
                "セクション \"{section}\" に不明なキー \"{key}\" があります"
            ))
        })?;
        let value = check_value(spec.name, key_spec, value)?;

        let node = match self.sections.get_mut(section) {
            Some(Section::Mapping(node)) => node,
            Some(Section::List(nodes)) => nodes.first_mut().ok_or_else(|| {
                CoreError::Configuration(format!(
                    "セクション \"{section}\" には最低1つのマッピングが必要です"
                ))
            })?,
            None => unreachable!("検証済みドキュメントは全セクションを持つ"),
        };

        match provider {
            Some(name) => {
                self.providers.insert(name.to_string());
                node.overrides
                    .entry(name.to_string())
                    .or_default()
                    .insert(key.to_string(), value);
            }
            None => {
                node.defaults.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// 元のネスト形式（プロバイダをサブマッピングとして埋め込む）に戻す
    ///
    /// null のままのキーは省略します。再検証でデフォルトが再補完されるため
    /// ラウンドトリップは保たれます。
    pub fn to_value(&self) -> Value {
        let mut root = serde_yaml::Mapping::new();
        for spec in SCHEMA {
            let section = &self.sections[spec.name];
            let value = match section {
                Section::Mapping(node) => node_to_value(node),
                Section::List(nodes) => {
                    if nodes.is_empty() {
                        continue;
                    }
                    Value::Sequence(nodes.iter().map(node_to_value).collect())
                }
            };
            if let Value::Mapping(mapping) = &value
                && mapping.is_empty()
            {
                continue;
            }
            root.insert(Value::String(spec.name.to_string()), value);
        }
        Value::Mapping(root)
    }
}

fn node_to_value(node: &Node) -> Value {
    let mut mapping = serde_yaml::Mapping::new();
    for (key, value) in &node.defaults {
        if !value.is_null() {
            mapping.insert(Value::String(key.clone()), value.clone());
        }
    }
    for (provider, over) in &node.overrides {
        let mut sub = serde_yaml::Mapping::new();
        for (key, value) in over {
            sub.insert(Value::String(key.clone()), value.clone());
        }
        mapping.insert(Value::String(provider.clone()), Value::Mapping(sub));
    }
    Value::Mapping(mapping)
}

/// セクションの生データをエントリ列に正規化する
fn section_entries(spec: &SectionSpec, raw: Option<&Value>) -> Result<Vec<Mapping>> {
    match (spec.node, raw) {
        (NodeKind::Mapping, None | Some(Value::Null)) => Ok(vec![Mapping::new()]),
        (NodeKind::Mapping, Some(Value::Mapping(mapping))) => {
            Ok(vec![to_string_map(spec.name, mapping)?])
        }
        (NodeKind::Mapping, Some(_)) => Err(CoreError::Configuration(format!(
            "セクション \"{}\" はマッピングである必要があります",
            spec.name
        ))),
        (NodeKind::List, None | Some(Value::Null)) => Ok(Vec::new()),
        (NodeKind::List, Some(Value::Sequence(entries))) => entries
            .iter()
            .map(|entry| match entry {
                Value::Mapping(mapping) => to_string_map(spec.name, mapping),
                _ => Err(CoreError::Configuration(format!(
                    "セクション \"{}\" の各エントリはマッピングである必要があります",
                    spec.name
                ))),
            })
            .collect(),
        // 裸のマッピングは1要素リストに昇格
        (NodeKind::List, Some(Value::Mapping(mapping))) => {
            Ok(vec![to_string_map(spec.name, mapping)?])
        }
        (NodeKind::List, Some(_)) => Err(CoreError::Configuration(format!(
            "セクション \"{}\" はマッピングのリストである必要があります",
            spec.name
        ))),
    }
}

/// 1ノードを検証して2層構造に正規化する
fn validate_node(
    spec: &SectionSpec,
    raw: Mapping,
    providers: &mut BTreeSet<String>,
) -> Result<Node> {
    let mut defaults = Mapping::new();
    let mut overrides: BTreeMap<String, Mapping> = BTreeMap::new();

    // スキーマキーとプロバイダオーバーライドを分離
    for (key, value) in raw {
        if spec.key_spec(&key).is_some() {
            defaults.insert(key, value);
            continue;
        }
        if is_section_name(&key) {
            return Err(CoreError::Configuration(format!(
                "セクション \"{}\" のプロバイダ名に予約名 \"{key}\" は使用できません",
                spec.name
            )));
        }
        match value {
            Value::Mapping(mapping) => {
                providers.insert(key.clone());
                overrides.insert(key, to_string_map(spec.name, &mapping)?);
            }
            // マッピング以外の未知キーはオーバーライドではなく誤記
            _ => {
                return Err(CoreError::Configuration(format!(
                    "セクション \"{}\" に不明なキー \"{key}\" があります",
                    spec.name
                )));
            }
        }
    }

    // デフォルト値の補完と値検証
    for key_spec in spec.keys {
        let value = defaults
            .remove(key_spec.name)
            .unwrap_or_else(|| default_value(key_spec));
        let value = check_value(spec.name, key_spec, value)?;
        defaults.insert(key_spec.name.to_string(), value);
    }

    // オーバーライドの検証
    for (provider, over) in &mut overrides {
        for (key, value) in over.iter_mut() {
            let key_spec = spec.key_spec(key).ok_or_else(|| {
                CoreError::Configuration(format!(
                    "セクション \"{}\" のプロバイダ \"{provider}\" に不明なキー \"{key}\" があります",
                    spec.name
                ))
            })?;
            *value = check_value(spec.name, key_spec, value.clone())?;
        }
    }

    Ok(Node {
        defaults,
        overrides,
    })
}

fn default_value(spec: &KeySpec) -> Value {
    match spec.default {
        Some(DefaultValue::Str(text)) => Value::String(text.to_string()),
        Some(DefaultValue::Int(number)) => Value::Number(number.into()),
        Some(DefaultValue::Bool(flag)) => Value::Bool(flag),
        Some(DefaultValue::EmptyMap) => Value::Mapping(serde_yaml::Mapping::new()),
        None => Value::Null,
    }
}

/// 値の型・列挙・正規表現検証
///
/// 文書化された自動変換は「裸の文字列 → 1要素リスト」のみ。
fn check_value(section: &str, spec: &KeySpec, value: Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let value = match spec.kind {
        ValueKind::StrList => match value {
            Value::Sequence(entries) => {
                if entries.iter().any(|entry| !entry.is_string()) {
                    return Err(CoreError::Configuration(format!(
                        "セクション \"{section}\" の \"{}\" キーは文字列のリストである必要があります",
                        spec.name
                    )));
                }
                Value::Sequence(entries)
            }
            Value::String(text) => Value::Sequence(vec![Value::String(text)]),
            _ => {
                return Err(CoreError::Configuration(format!(
                    "セクション \"{section}\" の \"{}\" キーは文字列のリストである必要があります",
                    spec.name
                )));
            }
        },
        ValueKind::Str if !value.is_string() => {
            return Err(type_error(section, spec.name, "文字列"));
        }
        ValueKind::Int if value.as_i64().is_none() => {
            return Err(type_error(section, spec.name, "整数"));
        }
        ValueKind::Bool if !value.is_bool() => {
            return Err(type_error(section, spec.name, "真偽値"));
        }
        ValueKind::Map if !value.is_mapping() => {
            return Err(type_error(section, spec.name, "マッピング"));
        }
        _ => value,
    };

    // 列挙チェック（デフォルト値と一致する場合は許可）
    if !spec.values.is_empty() {
        let is_default = matches!(spec.default, Some(DefaultValue::Str(default))
            if value.as_str() == Some(default));
        let is_listed = value
            .as_str()
            .is_some_and(|text| spec.values.contains(&text));
        if !is_default && !is_listed {
            return Err(CoreError::Configuration(format!(
                "セクション \"{section}\" の \"{}\" キーの値 \"{}\" は無効です（指定可能: {}）",
                spec.name,
                display_value(&value),
                spec.values.join(", ")
            )));
        }
    }

    // 正規表現チェック
    if let Some(pattern) = spec.regex
        && let Some(text) = value.as_str()
        && !text.is_empty()
    {
        let re = Regex::new(pattern).expect("スキーマ定数の正規表現");
        if !re.is_match(text) {
            return Err(CoreError::Configuration(format!(
                "セクション \"{section}\" の \"{}\" キーの値 \"{text}\" は無効です（{}）",
                spec.name,
                spec.regex_help.unwrap_or("ドキュメントを参照してください")
            )));
        }
    }

    Ok(value)
}

fn type_error(section: &str, key: &str, expected: &str) -> CoreError {
    CoreError::Configuration(format!(
        "セクション \"{section}\" の \"{key}\" キーは{expected}である必要があります"
    ))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}

fn key_as_str(key: &Value) -> Result<&str> {
    key.as_str().ok_or_else(|| {
        CoreError::Configuration("キー名は文字列である必要があります".to_string())
    })
}

fn to_string_map(section: &str, mapping: &serde_yaml::Mapping) -> Result<Mapping> {
    let mut result = Mapping::new();
    for (key, value) in mapping {
        let name = key_as_str(key).map_err(|_| {
            CoreError::Configuration(format!(
                "セクション \"{section}\" のキー名は文字列である必要があります"
            ))
        })?;
        result.insert(name.to_string(), value.clone());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Value {
        serde_yaml::from_str(
            r#"
application:
  product_id: my_product_id
  version: 1.0.0
package:
  - type: container_image
    name: my_image
fpga:
  image: image
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_minimal() {
        let document = Document::validate(minimal()).unwrap();
        let resolved = document.resolve(None);

        // デフォルト補完
        assert_eq!(
            resolved.get("application", "type").unwrap().as_str(),
            Some("container_service")
        );
        assert_eq!(resolved.get("fpga", "count").unwrap().as_i64(), Some(1));

        // 自動リスト変換
        assert_eq!(
            resolved.get("fpga", "image").unwrap(),
            &Value::Sequence(vec![Value::String("image".to_string())])
        );

        // リストセクションは先頭エントリを参照
        assert_eq!(
            resolved.get("package", "name").unwrap().as_str(),
            Some("my_image")
        );
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let document = Document::validate(minimal()).unwrap();
        assert_eq!(document.resolve(None), document.resolve(None));

        // 検証済み値を再シリアライズして再検証しても同じ結果
        let revalidated = Document::validate(document.to_value()).unwrap();
        assert_eq!(revalidated.resolve(None), document.resolve(None));
    }

    #[test]
    fn test_provider_override_resolution() {
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - type: container_image
    name: my_image
    my_provider:
      type: vm_image
      name: my_vm_image
fpga:
  my_provider:
    image: my_fpga_image
"#,
        )
        .unwrap();
        let document = Document::validate(root).unwrap();
        assert_eq!(
            document.providers().iter().collect::<Vec<_>>(),
            vec!["my_provider"]
        );

        // デフォルトビューにオーバーライドが漏れない
        let default_view = document.resolve(None);
        assert_eq!(
            default_view.get("package", "type").unwrap().as_str(),
            Some("container_image")
        );
        assert!(default_view.get("fpga", "image").is_none());

        // プロバイダビュー
        let provider_view = document.resolve(Some("my_provider"));
        assert_eq!(
            provider_view.get("package", "type").unwrap().as_str(),
            Some("vm_image")
        );
        assert_eq!(
            provider_view.get("fpga", "image").unwrap(),
            &Value::Sequence(vec![Value::String("my_fpga_image".to_string())])
        );

        // 未指定キーはデフォルトにフォールスルー
        assert_eq!(
            provider_view.get("application", "product_id").unwrap().as_str(),
            Some("p")
        );

        // 未知のプロバイダはデフォルトと同じ
        assert_eq!(document.resolve(Some("other")), default_view);
    }

    #[test]
    fn test_auto_wrap_law() {
        let bare = Document::validate(minimal()).unwrap();

        let mut listed: Value = minimal();
        listed["fpga"]["image"] = Value::Sequence(vec![Value::String("image".to_string())]);
        let listed = Document::validate(listed).unwrap();

        assert_eq!(
            bare.resolve(None).get("fpga", "image"),
            listed.resolve(None).get("fpga", "image")
        );
    }

    #[test]
    fn test_reserved_provider_name() {
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - name: my_image
fpga:
  image: image
  application:
    image: other
"#,
        )
        .unwrap();
        let error = Document::validate(root).unwrap_err();
        assert!(matches!(error, CoreError::Configuration(_)));
        assert!(error.to_string().contains("予約名"));
    }

    #[test]
    fn test_unknown_key() {
        let mut root = minimal();
        root["fpga"]["extra_key"] = Value::String("value".to_string());
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_key_in_provider() {
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - name: my_image
fpga:
  image: image
  my_provider:
    extra_key: value
"#,
        )
        .unwrap();
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_section() {
        let mut root = minimal();
        root["extra_section"] = serde_yaml::from_str("extra_key: value").unwrap();
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_regex_mismatch() {
        let mut root = minimal();
        root["application"]["version"] = Value::String("1.0.0.0.0".to_string());
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_package() {
        let mut root = minimal();
        root["package"] = Value::Sequence(vec![]);
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));

        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
fpga:
  image: image
"#,
        )
        .unwrap();
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_bare_mapping_promoted_to_list() {
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  type: container_image
  name: my_image
fpga:
  image: image
"#,
        )
        .unwrap();
        let document = Document::validate(root).unwrap();
        let resolved = document.resolve(None);
        assert_eq!(
            resolved.get("package", "type").unwrap().as_str(),
            Some("container_image")
        );
    }

    #[test]
    fn test_mapping_section_rejects_sequence() {
        let root: Value = serde_yaml::from_str(
            r#"
application:
  - product_id: p
    version: 1.0.0
package:
  - name: my_image
fpga:
  image: image
"#,
        )
        .unwrap();
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_value_types() {
        // count は整数
        let mut root = minimal();
        root["fpga"]["count"] = Value::String("1".to_string());
        assert!(Document::validate(root).is_err());

        // enum 外の値
        let mut root = minimal();
        root["firewall_rules"] = serde_yaml::from_str(
            "[{start_port: 1000, end_port: 1000, direction: no_direction}]",
        )
        .unwrap();
        assert!(Document::validate(root).is_err());

        // リスト内の型違い
        let mut root = minimal();
        root["fpga"]["image"] = serde_yaml::from_str("[image_slot0, 1]").unwrap();
        assert!(Document::validate(root).is_err());

        // トップレベルの型違い
        let mut root = minimal();
        root["fpga"]["image"] = Value::Number(1.into());
        assert!(Document::validate(root).is_err());
    }

    #[test]
    fn test_required_missing() {
        // version 欠落
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
package:
  - name: my_image
fpga:
  image: image
"#,
        )
        .unwrap();
        assert!(Document::validate(root).is_err());

        // プロバイダのみのエントリで name 欠落
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - my_provider:
      type: container_image
fpga:
  image: image
"#,
        )
        .unwrap();
        assert!(Document::validate(root).is_err());
    }

    #[test]
    fn test_required_satisfied_only_by_provider() {
        // image がプロバイダ側にのみある場合は許容される
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - name: my_image
fpga:
  my_provider:
    image: x
"#,
        )
        .unwrap();
        let document = Document::validate(root).unwrap();
        assert!(document.resolve(None).get("fpga", "image").is_none());
        assert_eq!(
            document
                .resolve(Some("my_provider"))
                .get("fpga", "image")
                .unwrap(),
            &Value::Sequence(vec![Value::String("x".to_string())])
        );
    }

    #[test]
    fn test_required_unsatisfied_for_other_provider() {
        // 別プロバイダから見ると fpga.image が null のままなら弾く
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
  other_provider:
    product_id: q
package:
  - name: my_image
fpga:
  my_provider:
    image: x
"#,
        )
        .unwrap();
        assert!(matches!(
            Document::validate(root),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_set_override() {
        let mut document = Document::validate(minimal()).unwrap();
        document
            .set_override(
                "package",
                Some("aws"),
                "name",
                Value::String("ami-123".to_string()),
            )
            .unwrap();
        document
            .set_override(
                "package",
                Some("aws"),
                "type",
                Value::String("vm_image".to_string()),
            )
            .unwrap();

        let view = document.resolve(Some("aws"));
        assert_eq!(view.get("package", "name").unwrap().as_str(), Some("ami-123"));
        assert_eq!(view.get("package", "type").unwrap().as_str(), Some("vm_image"));

        // デフォルトビューは不変
        let default_view = document.resolve(None);
        assert_eq!(
            default_view.get("package", "name").unwrap().as_str(),
            Some("my_image")
        );

        // 不正な値は拒否
        assert!(
            document
                .set_override("package", Some("aws"), "type", Value::String("bad".into()))
                .is_err()
        );
    }

    #[test]
    fn test_to_value_round_trip() {
        let root: Value = serde_yaml::from_str(
            r#"
application:
  product_id: p
  version: 1.0.0
package:
  - name: my_image
    my_provider:
      name: other_image
fpga:
  image: image
"#,
        )
        .unwrap();
        let document = Document::validate(root).unwrap();
        let reloaded = Document::validate(document.to_value()).unwrap();
        assert_eq!(reloaded, document);
    }
}
