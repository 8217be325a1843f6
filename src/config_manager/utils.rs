use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::config_manager::agent::AgentConfiguration;
use crate::error::StudioError;

/// Serialization formats offered for local export/import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Yaml,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Yaml => "application/yaml",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
        }
    }
}

/// Render a configuration for download.
pub fn export_config(config: &AgentConfiguration, format: ExportFormat) -> Result<String, StudioError> {
    let rendered = match format {
        ExportFormat::Json => serde_json::to_string_pretty(config)
            .map_err(|e| StudioError::BadRequest(format!("could not serialize configuration: {}", e)))?,
        ExportFormat::Yaml => serde_yaml::to_string(config)
            .map_err(|e| StudioError::BadRequest(format!("could not serialize configuration: {}", e)))?,
    };
    Ok(rendered)
}

/// Parse an exported configuration. JSON is tried first since YAML would
/// also accept most JSON documents but with looser number handling.
pub fn import_config(content: &str) -> Result<AgentConfiguration, StudioError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('{') {
        return serde_json::from_str(content)
            .map_err(|e| StudioError::invalid("import", format!("invalid JSON configuration: {}", e)));
    }
    serde_yaml::from_str(content)
        .map_err(|e| StudioError::invalid("import", format!("invalid YAML configuration: {}", e)))
}

fn unsafe_filename_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^\w\-]+").expect("filename pattern is valid"))
}

/// `Support Bot` -> `Support_Bot_config.json`
pub fn export_file_name(config: &AgentConfiguration, format: ExportFormat) -> String {
    let stem = unsafe_filename_chars().replace_all(config.name.trim(), "_");
    let stem = stem.trim_matches('_');
    let stem = if stem.is_empty() { "agent" } else { stem };
    format!("{}_config.{}", stem, format.extension())
}

/// Decode an uploaded text document.
///
/// Honors UTF-8 and UTF-16 byte-order marks, accepts BOM-less UTF-8, and
/// falls back to Windows-1252 for legacy files.
pub fn decode_text_document(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = encoding_rs::Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Whether an upload should be decoded as text for the knowledge base.
pub fn is_text_document(mime: &str, name: &str) -> bool {
    mime.starts_with("text/")
        || [".txt", ".md"]
            .iter()
            .any(|ext| name.to_lowercase().ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_manager::tools::{ToolDefinition, WebhookTool};

    fn populated() -> AgentConfiguration {
        let mut config = AgentConfiguration::default();
        config.name = "Support Bot".into();
        config.voice.voice_id = "v1".into();
        config.voice.stability = 0.35;
        config.tags = vec!["support".into()];
        config.tools.push(ToolDefinition::Webhook(WebhookTool {
            id: "t1".into(),
            name: "ticket".into(),
            description: "Open a ticket".into(),
            url: "https://crm.example.com/tickets".into(),
            method: Default::default(),
            headers: [("Authorization".to_string(), "Bearer x".to_string())].into(),
            expects_response: false,
        }));
        config.touch(chrono::Utc::now());
        config
    }

    #[test]
    fn json_export_round_trips() {
        let config = populated();
        let exported = export_config(&config, ExportFormat::Json).unwrap();
        assert_eq!(import_config(&exported).unwrap(), config);
    }

    #[test]
    fn yaml_export_is_importable() {
        let config = populated();
        let exported = export_config(&config, ExportFormat::Yaml).unwrap();
        let imported = import_config(&exported).unwrap();
        assert_eq!(imported.name, config.name);
        assert_eq!(imported.tools, config.tools);
    }

    #[test]
    fn partial_import_fills_defaults() {
        let imported = import_config(r#"{"name": "Minimal"}"#).unwrap();
        assert_eq!(imported.name, "Minimal");
        assert_eq!(imported.voice, AgentConfiguration::default().voice);
    }

    #[test]
    fn malformed_import_is_a_validation_error() {
        let err = import_config(r#"{"voice": {"stability": "high"}}"#).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "import");
    }

    #[test]
    fn file_names_are_sanitized() {
        let mut config = AgentConfiguration::default();
        config.name = "Support Bot / v2".into();
        assert_eq!(export_file_name(&config, ExportFormat::Json), "Support_Bot_v2_config.json");
        config.name = "???".into();
        assert_eq!(export_file_name(&config, ExportFormat::Yaml), "agent_config.yaml");
    }

    #[test]
    fn decodes_boms_and_legacy_text() {
        assert_eq!(decode_text_document(b"\xEF\xBB\xBFhello"), "hello");
        assert_eq!(decode_text_document(&[0xFF, 0xFE, b'h', 0, b'i', 0]), "hi");
        assert_eq!(decode_text_document(b"caf\xE9"), "café");
        assert_eq!(decode_text_document("naïve".as_bytes()), "naïve");
    }
}
