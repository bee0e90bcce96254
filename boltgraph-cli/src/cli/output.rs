// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Result formatting for CLI output

use super::commands::OutputFormat;
use boltgraph::constraints::Constraint;
use boltgraph::{QueryResult, Value};
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};

/// Result formatter for different output formats
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn format(result: &QueryResult, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(result),
            OutputFormat::Json => Self::format_json(result),
            OutputFormat::Csv => Self::format_csv(result),
        }
    }

    /// Format results as a table using comfy-table
    fn format_table(result: &QueryResult) -> String {
        // Transaction control answers with a single status cell
        if result.columns == ["status"] && result.rows.len() == 1 {
            if let Some(message) = result.get(0, "status").and_then(Value::as_str) {
                return format!("{}\n", message.green());
            }
        }

        let mut output = String::new();
        if result.rows.is_empty() {
            output.push_str(&format!("{}\n", "No results found".yellow()));
        } else {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(
                result
                    .columns
                    .iter()
                    .map(|col| Cell::new(col).fg(Color::Green))
                    .collect::<Vec<_>>(),
            );
            for row in &result.rows {
                table.add_row(row.iter().map(Self::value_to_string).collect::<Vec<_>>());
            }
            output.push_str(&table.to_string());
            output.push('\n');
            output.push_str(&format!("{} row(s)", result.rows.len()));
        }

        let stats = result.stats.to_map();
        if !stats.is_empty() {
            let counters: Vec<String> = stats
                .iter()
                .filter(|(key, _)| !key.starts_with("contains-"))
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect();
            if !counters.is_empty() {
                output.push_str(&format!("\n{}", counters.join(", ").cyan()));
            }
        }
        output.push_str(&format!("\nExecution time: {} ms\n", result.execution_time_ms));
        output
    }

    fn format_json(result: &QueryResult) -> String {
        let rows: Vec<serde_json::Value> = result
            .rows
            .iter()
            .map(|row| {
                let object: serde_json::Map<String, serde_json::Value> = result
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(col, value)| (col.clone(), Self::value_to_json(value)))
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        let mut json = serde_json::json!({
            "columns": result.columns,
            "rows": rows,
            "type": result.query_type.as_str(),
            "execution_time_ms": result.execution_time_ms,
        });
        if let (Some(bookmark), serde_json::Value::Object(map)) = (&result.bookmark, &mut json) {
            map.insert("bookmark".to_string(), serde_json::json!(bookmark));
        }
        serde_json::to_string_pretty(&json)
            .unwrap_or_else(|_| "{\"error\": \"Could not serialize results to JSON\"}".to_string())
    }

    fn format_csv(result: &QueryResult) -> String {
        let mut output = result.columns.join(",");
        output.push('\n');
        for row in &result.rows {
            let values: Vec<String> = row.iter().map(Self::value_to_csv_string).collect();
            output.push_str(&values.join(","));
            output.push('\n');
        }
        output
    }

    pub fn format_constraints(constraints: &[Constraint]) -> String {
        if constraints.is_empty() {
            return format!("{}\n", "No constraints defined".yellow());
        }
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            ["name", "type", "label", "properties"]
                .iter()
                .map(|h| Cell::new(h).fg(Color::Green))
                .collect::<Vec<_>>(),
        );
        for constraint in constraints {
            table.add_row(vec![
                constraint.name.clone(),
                constraint.kind.to_string(),
                constraint.label.clone(),
                constraint.properties.join(", "),
            ]);
        }
        format!("{}\n", table)
    }

    fn value_to_string(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Nodes and relationships keep their identity in JSON output
    fn value_to_json(value: &Value) -> serde_json::Value {
        match value {
            Value::Node(node) => serde_json::json!({
                "type": "node",
                "id": node.id.wire_id(),
                "labels": node.labels,
                "properties": value.to_json(),
            }),
            Value::Relationship(rel) => serde_json::json!({
                "type": "relationship",
                "id": rel.id.wire_id(),
                "rel_type": rel.rel_type,
                "start": rel.start.wire_id(),
                "end": rel.end.wire_id(),
                "properties": value.to_json(),
            }),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Self::value_to_json).collect())
            }
            other => other.to_json(),
        }
    }

    fn value_to_csv_string(value: &Value) -> String {
        let s = Self::value_to_string(value);
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueryResult {
        QueryResult::new(
            vec!["name".to_string(), "age".to_string()],
            vec![
                vec![Value::from("Ann, Jr."), Value::Integer(30)],
                vec![Value::from("Bob"), Value::Null],
            ],
        )
    }

    #[test]
    fn test_csv_quotes_commas() {
        let csv = ResultFormatter::format(&sample(), OutputFormat::Csv);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "name,age");
        assert_eq!(lines[1], "\"Ann, Jr.\",30");
    }

    #[test]
    fn test_json_rows_are_objects() {
        let json: serde_json::Value =
            serde_json::from_str(&ResultFormatter::format(&sample(), OutputFormat::Json)).unwrap();
        assert_eq!(json["rows"][0]["age"], 30);
        assert!(json["rows"][1]["age"].is_null());
        assert_eq!(json["type"], "r");
    }

    #[test]
    fn test_status_rows_print_message() {
        colored::control::set_override(false);
        let output = ResultFormatter::format(&QueryResult::status("Transaction started"), OutputFormat::Table);
        assert_eq!(output.trim(), "Transaction started");
    }
}
