//! Output formatting for CLI

use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

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

/// Format output based on selected format.
///
/// `text` renders the rows as plain lines, `table` as a bordered table.
pub fn format_output<T, R>(data: &T, rows: &[R], format: &str) -> String
where
    T: Serialize,
    R: Tabled + std::fmt::Display,
{
    match OutputFormat::from(format) {
        OutputFormat::Json => {
            serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => Table::new(rows).with(Style::rounded()).to_string(),
        OutputFormat::Text => rows
            .iter()
            .map(|row| row.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Tabled)]
    struct Row {
        name: String,
        value: u32,
    }

    impl std::fmt::Display for Row {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}={}", self.name, self.value)
        }
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "a".into(), value: 1 },
            Row { name: "b".into(), value: 2 },
        ]
    }

    #[test]
    fn test_text_output() {
        let rows = rows();
        assert_eq!(format_output(&rows, &rows, "text"), "a=1\nb=2");
    }

    #[test]
    fn test_json_output() {
        let rows = rows();
        let out = format_output(&rows, &rows, "JSON");
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[1]["value"], 2);
    }

    #[test]
    fn test_table_output() {
        let rows = rows();
        let out = format_output(&rows, &rows, "table");
        assert!(out.contains("name"));
        assert!(out.contains("value"));
    }
}
