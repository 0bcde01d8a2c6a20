use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use mockdata_generate::{GenerationReport, Table, write_table_csv};

use super::{RegistryError, RegistryResult};

/// What a run wrote, logged at the end of each command.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub finished_at: String,
    pub table_path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    pub bytes_written: u64,
    pub report_path: Option<PathBuf>,
}

/// Write the generated table and, when requested, its report.
pub fn write_outputs(
    run_id: &str,
    table_path: &Path,
    table: &Table,
    report: Option<(&Path, &GenerationReport)>,
) -> RegistryResult<RunSummary> {
    ensure_parent(table_path)?;
    let bytes_written = write_table_csv(table_path, table)
        .map_err(|err| RegistryError::Csv(format!("{}: {err}", table_path.display())))?;

    let report_path = match report {
        Some((path, report)) => {
            write_json(path, report)?;
            Some(path.to_path_buf())
        }
        None => None,
    };

    Ok(RunSummary {
        run_id: run_id.to_string(),
        finished_at: Utc::now().to_rfc3339(),
        table_path: table_path.to_path_buf(),
        rows: table.n_rows(),
        columns: table.columns().len(),
        bytes_written,
        report_path,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    ensure_parent(path)?;
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

fn ensure_parent(path: &Path) -> RegistryResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent)?;
    }
    Ok(())
}
