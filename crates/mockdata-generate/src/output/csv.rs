use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::generators::Table;

/// Write a table as CSV to `path`. Returns the number of bytes written.
pub fn write_table_csv(path: &Path, table: &Table) -> Result<u64, csv::Error> {
    let writer = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    write_csv(writer, table)
}

/// Write a table as CSV with columns in table order.
///
/// Missing values are empty cells and dates are ISO-8601.
pub fn write_csv<W: Write>(writer: W, table: &Table) -> Result<u64, csv::Error> {
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    let columns = table.columns();
    let header: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
    writer.write_record(&header)?;

    for row in 0..table.n_rows() {
        let record: Vec<String> = columns
            .iter()
            .map(|column| {
                column
                    .values
                    .get(row)
                    .map(|value| value.to_csv())
                    .unwrap_or_default()
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
