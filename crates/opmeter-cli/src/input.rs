//! Reading records and threshold files from disk

use anyhow::{bail, Context, Result};
use opmeter::{MetricRecord, ThresholdConfig};
use std::fs;
use std::path::Path;

/// Parse one record, a JSON array of records, or JSON lines
pub fn parse_records(text: &str) -> Result<Vec<MetricRecord>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid JSON array of records");
    }

    if let Ok(record) = serde_json::from_str::<MetricRecord>(trimmed) {
        return Ok(vec![record]);
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid record on line {}", i + 1))
        })
        .collect()
}

/// Read every record in `path`
pub fn read_records(path: &Path) -> Result<Vec<MetricRecord>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_records(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Read a file that must hold exactly one record
pub fn read_single_record(path: &Path) -> Result<MetricRecord> {
    let mut records = read_records(path)?;
    if records.len() != 1 {
        bail!(
            "{} holds {} records, expected exactly one",
            path.display(),
            records.len()
        );
    }
    Ok(records.remove(0))
}

/// Load thresholds from YAML, or JSON when the extension is `.json`
pub fn read_thresholds(path: &Path) -> Result<ThresholdConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let thresholds: ThresholdConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("Invalid thresholds in {}", path.display()))?,
        _ => serde_yaml::from_str(&text)
            .with_context(|| format!("Invalid thresholds in {}", path.display()))?,
    };

    thresholds
        .validate()
        .with_context(|| format!("Invalid thresholds in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_single_object() {
        let records = parse_records(r#"{"operation": "a", "total": 0.5}"#).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "a");
    }

    #[test]
    fn test_parse_pretty_single_object() {
        let json = "{\n  \"operation\": \"a\",\n  \"total\": 0.5\n}\n";
        let records = parse_records(json).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_parse_array() {
        let records = parse_records(
            r#"[{"operation": "a", "total": 0.5}, {"operation": "b", "total": 1.0}]"#,
        )
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].operation, "b");
    }

    #[test]
    fn test_parse_json_lines() {
        let text = "{\"operation\": \"a\", \"total\": 0.1}\n\n{\"operation\": \"a\", \"total\": 0.2}\n";
        let records = parse_records(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].total, 0.2);
    }

    #[test]
    fn test_parse_reports_bad_line() {
        let text = "{\"operation\": \"a\", \"total\": 0.1}\nnot json\n";
        let err = parse_records(text).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_records("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_single_record_required() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("two.json");
        fs::write(&path, r#"[{"operation": "a", "total": 1}, {"operation": "b", "total": 2}]"#)
            .unwrap();
        let err = read_single_record(&path).unwrap_err();
        assert!(err.to_string().contains("expected exactly one"));

        assert!(read_single_record(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_read_thresholds_yaml_and_json() {
        let dir = TempDir::new().unwrap();

        let yaml = dir.path().join("thresholds.yaml");
        fs::write(&yaml, "slow_operation_secs: 2.0\nhigh_row_count: 500\n").unwrap();
        let t = read_thresholds(&yaml).unwrap();
        assert_eq!(t.slow_operation_secs, 2.0);
        assert_eq!(t.slow_phase_secs, 0.5);
        assert_eq!(t.high_row_count, Some(500));

        let json = dir.path().join("thresholds.json");
        fs::write(&json, r#"{"slow_phase_secs": 0.25}"#).unwrap();
        assert_eq!(read_thresholds(&json).unwrap().slow_phase_secs, 0.25);

        let bad = dir.path().join("bad.yaml");
        fs::write(&bad, "high_memory_fraction: 1.5\n").unwrap();
        assert!(read_thresholds(&bad).is_err());
    }
}
