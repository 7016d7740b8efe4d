//! ForgeFlow アプリケーション定義モデル
//!
//! FPGA アプリケーションのプロビジョニングに使う宣言的な定義ファイル
//! （`application.yml`）のスキーマ検証・プロバイダオーバーライド解決を
//! 提供します。
//!
//! # 概要
//!
//! - **schema**: 定義フォーマットの静的テーブル
//! - **document**: スキーマ駆動の検証とプロバイダ解決
//! - **definition**: 型付きファサード（ロード・取得・保存）

pub mod definition;
pub mod document;
pub mod error;
pub mod schema;

pub use definition::{Definition, yaml_read, yaml_write};
pub use document::{Document, Mapping, Node, Resolved, ResolvedSection, Section};
pub use error::{CoreError, Result};
