//! アプリケーション定義スキーマ
//!
//! 定義ファイルの各セクションを静的なテーブルとして宣言します。
//! 検証ロジック（document モジュール）はこのテーブルだけを参照するため、
//! セクションの追加はここへの行追加だけで完結します。

/// セクションのノード種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 単一のマッピング
    Mapping,
    /// マッピングの繰り返し（単一マッピングは1要素リストに昇格）
    List,
}

/// キー値の型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Bool,
    Map,
    /// 文字列リスト。裸の文字列は1要素リストに自動変換される
    StrList,
}

/// キーのデフォルト値
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    Str(&'static str),
    Int(i64),
    Bool(bool),
    /// 空のマッピング
    EmptyMap,
}

/// キーの検証ルール
#[derive(Debug, Clone, Copy)]
pub struct KeySpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: ValueKind,
    pub default: Option<DefaultValue>,
    /// 空でない場合、値はこの列挙のいずれか（またはデフォルト値）に限る
    pub values: &'static [&'static str],
    pub regex: Option<&'static str>,
    pub regex_help: Option<&'static str>,
}

/// セクションの検証ルール
#[derive(Debug, Clone, Copy)]
pub struct SectionSpec {
    pub name: &'static str,
    pub node: NodeKind,
    /// true の場合、最低1エントリを要求する
    pub require_entry: bool,
    pub keys: &'static [KeySpec],
}

/// セマンティックバージョニング形式
pub const SEMVER_REGEX: &str = r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-(0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*)(\.(0|[1-9]\d*|\d*[a-zA-Z-][0-9a-zA-Z-]*))*)?(\+[0-9a-zA-Z-]+(\.[0-9a-zA-Z-]+)*)?$";

const fn key(name: &'static str) -> KeySpec {
    KeySpec {
        name,
        required: false,
        kind: ValueKind::Str,
        default: None,
        values: &[],
        regex: None,
        regex_help: None,
    }
}

/// アプリケーション定義フォーマット
pub const SCHEMA: &[SectionSpec] = &[
    SectionSpec {
        name: "application",
        node: NodeKind::Mapping,
        require_entry: false,
        keys: &[
            KeySpec {
                required: true,
                ..key("product_id")
            },
            KeySpec {
                required: true,
                regex: Some(SEMVER_REGEX),
                regex_help: Some("バージョンはセマンティックバージョニング形式で指定してください"),
                ..key("version")
            },
            KeySpec {
                required: true,
                values: &["container_service", "kubernetes_node"],
                default: Some(DefaultValue::Str("container_service")),
                ..key("type")
            },
            KeySpec {
                kind: ValueKind::Map,
                default: Some(DefaultValue::EmptyMap),
                ..key("variables")
            },
        ],
    },
    SectionSpec {
        name: "package",
        node: NodeKind::List,
        require_entry: true,
        keys: &[
            KeySpec {
                values: &["container_image", "vm_image", "kubernetes_yaml"],
                default: Some(DefaultValue::Str("container_image")),
                ..key("type")
            },
            KeySpec {
                required: true,
                ..key("name")
            },
            key("version"),
            key("repository"),
        ],
    },
    SectionSpec {
        name: "firewall_rules",
        node: NodeKind::List,
        require_entry: false,
        keys: &[
            KeySpec {
                required: true,
                kind: ValueKind::Int,
                ..key("start_port")
            },
            KeySpec {
                required: true,
                kind: ValueKind::Int,
                ..key("end_port")
            },
            KeySpec {
                values: &["tcp", "udp", "all"],
                default: Some(DefaultValue::Str("tcp")),
                ..key("protocol")
            },
            KeySpec {
                values: &["ingress", "egress"],
                default: Some(DefaultValue::Str("ingress")),
                ..key("direction")
            },
        ],
    },
    SectionSpec {
        name: "fpga",
        node: NodeKind::Mapping,
        require_entry: false,
        keys: &[
            KeySpec {
                required: true,
                kind: ValueKind::StrList,
                ..key("image")
            },
            KeySpec {
                values: &["aws_f1", "xilinx_xrt"],
                ..key("driver")
            },
            key("driver_version"),
            KeySpec {
                kind: ValueKind::Int,
                default: Some(DefaultValue::Int(1)),
                ..key("count")
            },
        ],
    },
    SectionSpec {
        name: "accelize_drm",
        node: NodeKind::Mapping,
        require_entry: false,
        keys: &[
            KeySpec {
                kind: ValueKind::Bool,
                default: Some(DefaultValue::Bool(true)),
                ..key("use_service")
            },
            KeySpec {
                kind: ValueKind::Map,
                default: Some(DefaultValue::EmptyMap),
                ..key("conf")
            },
        ],
    },
    SectionSpec {
        name: "test",
        node: NodeKind::Mapping,
        require_entry: false,
        keys: &[key("shell")],
    },
];

/// セクション名からスキーマを引く
pub fn section_spec(name: &str) -> Option<&'static SectionSpec> {
    SCHEMA.iter().find(|section| section.name == name)
}

/// 予約済みセクション名かどうか
pub fn is_section_name(name: &str) -> bool {
    section_spec(name).is_some()
}

impl SectionSpec {
    /// キー名からキースキーマを引く
    pub fn key_spec(&self, name: &str) -> Option<&'static KeySpec> {
        self.keys.iter().find(|k| k.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_lookup() {
        assert!(section_spec("application").is_some());
        assert!(section_spec("fpga").is_some());
        assert!(section_spec("unknown").is_none());
        assert!(is_section_name("package"));
        assert!(!is_section_name("my_provider"));
    }

    #[test]
    fn test_key_lookup() {
        let fpga = section_spec("fpga").unwrap();
        let image = fpga.key_spec("image").unwrap();
        assert!(image.required);
        assert_eq!(image.kind, ValueKind::StrList);

        let count = fpga.key_spec("count").unwrap();
        assert_eq!(count.default, Some(DefaultValue::Int(1)));
        assert!(fpga.key_spec("missing").is_none());
    }

    #[test]
    fn test_package_requires_entry() {
        let package = section_spec("package").unwrap();
        assert_eq!(package.node, NodeKind::List);
        assert!(package.require_entry);
        assert!(!section_spec("firewall_rules").unwrap().require_entry);
    }

    #[test]
    fn test_semver_regex() {
        let re = regex::Regex::new(SEMVER_REGEX).unwrap();
        assert!(re.is_match("1.0.0"));
        assert!(re.is_match("0.1.2-beta.1+build5"));
        assert!(!re.is_match("1.0.0.0.0"));
        assert!(!re.is_match("v1.0.0"));
    }
}
