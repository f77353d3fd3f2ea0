//! JSON Schema + Markdown生成ツール
//!
//! src/domain/config.rsの設定構造から以下を自動生成します：
//! 1. JSON Schema (schema/config.json)
//! 2. Markdownドキュメント (CONFIGURATION.md)
//!
//! 実行方法:
//! ```
//! cargo run --bin generate_schema
//! ```

use colony_picker::domain::config::AppConfig;
use schemars::schema_for;
use serde_json::Value;
use std::fs;

fn main() {
    println!("JSON Schema + Markdown生成中...");

    // AppConfigからJSON Schemaを生成
    let schema = schema_for!(AppConfig);

    let json = serde_json::to_string_pretty(&schema).expect("Failed to serialize schema to JSON");

    fs::create_dir_all("schema").expect("Failed to create schema/ directory");
    fs::write("schema/config.json", json.clone()).expect("Failed to write schema/config.json");
    println!("  ✓ schema/config.json");

    let schema_value: Value = serde_json::from_str(&json).expect("Failed to parse generated schema");
    let markdown = generate_markdown(&schema_value);

    fs::write("CONFIGURATION.md", markdown).expect("Failed to write CONFIGURATION.md");
    println!("  ✓ CONFIGURATION.md");

    println!("✅ 生成完了: schema/config.json + CONFIGURATION.md");
}

/// JSON Schemaからマークダウンドキュメントを生成
fn generate_markdown(schema: &Value) -> String {
    let mut md = String::new();

    md.push_str("# 設定リファレンス (Configuration Reference)\n\n");
    md.push_str("`config.toml`はcolony-pickerの動作を制御する設定ファイルです。\n\n");
    md.push_str("**設定ファイルの場所**: `config.toml` (プロジェクトルート)  \n");
    md.push_str("**スキーマファイル**: `schema/config.json` (自動生成)  \n");
    md.push_str("**サンプル**: `config.toml.example`\n\n");
    md.push_str(
        "⚠️ **注意**: このドキュメントは `cargo run --bin generate_schema` で自動生成されます。\n\n",
    );

    let empty = serde_json::Map::new();
    let defs = schema
        .get("$defs")
        .and_then(|d| d.as_object())
        .unwrap_or(&empty);

    let Some(sections) = schema.get("properties").and_then(|p| p.as_object()) else {
        return md;
    };

    for (section, value) in sections {
        md.push_str(&format!("## [{}]\n\n", section));

        // "$ref": "#/$defs/CameraConfig" を解決する
        let resolved = value
            .get("$ref")
            .and_then(|r| r.as_str())
            .and_then(|r| r.strip_prefix("#/$defs/"))
            .and_then(|name| defs.get(name))
            .unwrap_or(value);

        if let Some(desc) = resolved.get("description").and_then(|d| d.as_str()) {
            md.push_str(&format!("{}\n\n", desc));
        }

        let Some(fields) = resolved.get("properties").and_then(|p| p.as_object()) else {
            continue;
        };

        md.push_str("| キー | 型 | 説明 |\n");
        md.push_str("|------|----|------|\n");

        for (key, field) in fields {
            let field_type = field
                .get("type")
                .map(type_label)
                .unwrap_or_else(|| "object".to_string());
            let description = field
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("-")
                .replace('\n', " ");

            md.push_str(&format!("| `{}` | {} | {} |\n", key, field_type, description));
        }

        md.push('\n');
    }

    md
}

/// JSON Schemaの型表現を短いラベルにする
fn type_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        // Option<T>は ["string", "null"] のような配列になる
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(" \\| "),
        _ => "-".to_string(),
    }
}
