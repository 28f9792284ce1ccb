//! Output formatting for CLI

use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

/// Format rows based on selected format.
///
/// Text output is one `key=value` line per row.
pub fn format_rows<T: Serialize + Tabled>(rows: &[T], format: &str) -> String {
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Table => Table::new(rows).to_string(),
        OutputFormat::Text => rows
            .iter()
            .map(|row| {
                T::headers()
                    .iter()
                    .zip(row.fields())
                    .map(|(header, field)| format!("{}={}", header, field))
                    .collect::<Vec<_>>()
                    .join("  ")
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Tabled)]
    struct Row {
        attempt: usize,
        mime: String,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row {
                attempt: 1,
                mime: "hls".into(),
            },
            Row {
                attempt: 2,
                mime: "dash".into(),
            },
        ]
    }

    #[test]
    fn test_text_output() {
        assert_eq!(
            format_rows(&rows(), "text"),
            "attempt=1  mime=hls\nattempt=2  mime=dash"
        );
    }

    #[test]
    fn test_json_output() {
        let json: serde_json::Value = serde_json::from_str(&format_rows(&rows(), "JSON")).unwrap();
        assert_eq!(json[1]["mime"], "dash");
    }

    #[test]
    fn test_table_output() {
        let table = format_rows(&rows(), "table");
        assert!(table.contains("attempt"));
        assert!(table.contains("dash"));
    }
}
