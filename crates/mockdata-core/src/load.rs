use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::info;

use crate::error::Result;
use crate::metadata::{DetailRecord, Metadata, VariableRecord};

/// Read the variables table from a CSV file.
pub fn load_variables(path: &Path) -> Result<Vec<VariableRecord>> {
    let rows = read_rows(File::open(path)?)?;
    info!(path = %path.display(), rows = rows.len(), "loaded variables");
    Ok(rows)
}

/// Read the variable-details table from a CSV file.
pub fn load_variable_details(path: &Path) -> Result<Vec<DetailRecord>> {
    let rows = read_rows(File::open(path)?)?;
    info!(path = %path.display(), rows = rows.len(), "loaded variable details");
    Ok(rows)
}

/// Load and validate both tables.
pub fn load_metadata(variables: &Path, details: &Path) -> Result<Metadata> {
    Metadata::new(load_variables(variables)?, load_variable_details(details)?)
}

/// Deserialize CSV rows by header name. Unknown columns are ignored.
pub fn read_rows<R: Read, T: DeserializeOwned>(reader: R) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_rows_with_blank_and_na_cells() {
        let csv = "variable,variableType,databaseStart,prop_NA,extra\n\
                   HWTGHTM,Continuous,\"cchs2001_p, cchs2003_p\",NA,x\n\
                   SMK_005,Categorical,cchs2001_p,,y\n";
        let rows: Vec<VariableRecord> = read_rows(csv.as_bytes()).expect("rows");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].prop_na, None);
        assert_eq!(rows[1].variable_type.as_deref(), Some("Categorical"));
        assert_eq!(rows[1].prop_na, None);
    }

    #[test]
    fn reads_detail_proportions() {
        let csv = "variable,recStart,recEnd,catLabel,proportion\n\
                   SMK_005,1,1,Daily,0.25\n\
                   SMK_005,else,NA::b,Missing,\n";
        let rows: Vec<DetailRecord> = read_rows(csv.as_bytes()).expect("rows");
        assert_eq!(rows[0].proportion, Some(0.25));
        assert_eq!(rows[1].rec_start.as_deref(), Some("else"));
        assert_eq!(rows[1].proportion, None);
    }
}
