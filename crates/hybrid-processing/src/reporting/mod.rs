//! Output of processed datasets and run reports.
//!
//! # Example
//!
//! ```rust,ignore
//! use hybrid_processing::reporting::ReportWriter;
//! use std::path::PathBuf;
//!
//! let writer = ReportWriter::new(PathBuf::from("output"), None);
//! let mut frame = output.dataset.into_frame();
//! writer.write_dataset(&mut frame, "sales")?;
//! writer.write_report(&output.report, "sales")?;
//! ```

mod writer;

pub use writer::ReportWriter;
