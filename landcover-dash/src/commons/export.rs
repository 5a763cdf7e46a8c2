use anyhow::Result;

use crate::geometric::stats_store::GroupResult;

/// Destination for a region's group result (a table file, a remote store, ...)
pub trait ExportSink {
    fn export(&mut self, groups: &GroupResult, label: &str) -> Result<()>;
}

#[cfg(feature = "csv")]
pub use self::csv_sink::CsvExportSink;

#[cfg(feature = "csv")]
mod csv_sink {
    use anyhow::{Context, Result};
    use serde::Serialize;
    use std::fs::create_dir_all;
    use std::path::{Path, PathBuf};

    use super::ExportSink;
    use crate::commons::basic_functions::{m2_to_km2, percent_of, round_to};
    use crate::geometric::land_cover::{ClassCode, ClassTable};
    use crate::geometric::stats_store::GroupResult;

    #[derive(Debug, Serialize)]
    struct CsvRow<'a> {
        class: ClassCode,
        name: &'a str,
        sum: f64,
        area_km2: f64,
        percent: f64,
    }

    /// Writes `<dir>/<label>.csv` with one row per class
    #[derive(Debug, Clone)]
    pub struct CsvExportSink {
        output_path: PathBuf,
        classes: ClassTable,
        written: Vec<PathBuf>,
    }

    impl CsvExportSink {
        pub fn new(output_path: impl Into<PathBuf>, classes: ClassTable) -> Self {
            CsvExportSink {
                output_path: output_path.into(),
                classes,
                written: Vec::new(),
            }
        }

        /// Files written so far
        pub fn written(&self) -> &[PathBuf] {
            &self.written
        }

        pub fn get_output_path(&self) -> &Path {
            &self.output_path
        }
    }

    impl ExportSink for CsvExportSink {
        fn export(&mut self, groups: &GroupResult, label: &str) -> Result<()> {
            create_dir_all(&self.output_path).context(format!(
                "Failed to create output directory: {:?}",
                self.output_path
            ))?;
            let path = self.output_path.join(format!("{}.csv", label));

            let total: f64 = groups.iter().map(|g| g.raw_sum).sum();
            let mut writer = csv::Writer::from_path(&path)
                .context(format!("Failed to create CSV file: {:?}", path))?;

            for group in groups.iter() {
                let name = self
                    .classes
                    .get(group.code)
                    .map(|info| info.name.as_str())
                    .unwrap_or("");
                writer
                    .serialize(CsvRow {
                        class: group.code,
                        name,
                        sum: group.raw_sum,
                        area_km2: round_to(m2_to_km2(group.raw_sum), 2),
                        percent: round_to(percent_of(group.raw_sum, total), 2),
                    })
                    .context("Failed to write CSV row")?;
            }
            writer.flush().context("Failed to flush CSV file")?;

            tracing::info!(path = ?path, rows = groups.len(), "statistics exported");
            self.written.push(path);
            Ok(())
        }
    }

}
