use crate::error::{Result, ResultExt};
use crate::types::ProcessingReport;
use polars::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

/// Writes processed datasets and reports into an output directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    output_name: Option<String>,
}

impl Default for ReportWriter {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./outputs"),
            output_name: None,
        }
    }
}

impl ReportWriter {
    /// Create a writer. `output_name` overrides the file stem of the dataset.
    pub fn new(output_dir: PathBuf, output_name: Option<String>) -> Self {
        Self {
            output_dir,
            output_name,
        }
    }

    pub fn output_dir(&self) -> &PathBuf {
        &self.output_dir
    }

    /// Write `frame` as CSV. The file is `<output_name>.csv`, or
    /// `<stem>_processed.csv` when no name was given.
    pub fn write_dataset(&self, frame: &mut DataFrame, stem: &str) -> Result<PathBuf> {
        let file_name = self
            .output_name
            .clone()
            .unwrap_or_else(|| format!("{}_processed", stem));

        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_dir.join(format!("{}.csv", file_name));
        let mut file = File::create(&output_path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b',')
            .with_quote_char(b'"')
            .finish(frame)
            .context(format!("writing {}", output_path.display()))?;

        info!("Dataset saved: {}", output_path.display());
        Ok(output_path)
    }

    /// Write the report as pretty JSON to `<stem>_report.json`.
    pub fn write_report(&self, report: &ProcessingReport, stem: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;

        let report_path = self.output_dir.join(format!("{}_report.json", stem));
        let mut file = File::create(&report_path)?;
        file.write_all(serde_json::to_string_pretty(report)?.as_bytes())?;

        info!("Report saved: {}", report_path.display());
        Ok(report_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("hybrid-processing-{}-{}", name, std::process::id()))
    }

    #[test]
    fn test_write_dataset_uses_stem() {
        let dir = scratch_dir("dataset");
        let writer = ReportWriter::new(dir.clone(), None);
        let mut df = df!["a" => [1, 2], "b" => ["x", "y"]].unwrap();

        let path = writer.write_dataset(&mut df, "sales").unwrap();

        assert_eq!(path, dir.join("sales_processed.csv"));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("a,b"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_dataset_uses_output_name() {
        let dir = scratch_dir("named");
        let writer = ReportWriter::new(dir.clone(), Some("clean".to_string()));
        let mut df = df!["a" => [1.5]].unwrap();

        let path = writer.write_dataset(&mut df, "ignored").unwrap();

        assert_eq!(path, dir.join("clean.csv"));
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_write_report() {
        let dir = scratch_dir("report");
        let writer = ReportWriter::new(dir.clone(), None);
        let mut report = ProcessingReport::new((3, 2));
        report.finalize((2, 2), 5);

        let path = writer.write_report(&report, "sales").unwrap();

        assert_eq!(path, dir.join("sales_report.json"));
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["rows_after"], 2);
        fs::remove_dir_all(dir).unwrap();
    }
}
