//! NDJSON (newline-delimited JSON) stream sink.
//!
//! ```ignore
//! let mut sink = JsonStreamSink::stdout();
//! sink.write_rows(&rows)?;
//! let n = sink.finish()?;
//! ```

use super::ResourceRow;
use std::io::{self, BufWriter, Write};

/// Buffered NDJSON writer; each row goes straight to the writer via
/// `serde_json::to_writer`.
pub struct JsonStreamSink<W: Write> {
    writer: BufWriter<W>,
    rows_written: usize,
}

impl JsonStreamSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonStreamSink<W> {
    /// Wraps any writer (file, `Vec<u8>`, ...).
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(64 * 1024, writer),
            rows_written: 0,
        }
    }

    pub fn write_row(&mut self, row: &ResourceRow) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row).map_err(io::Error::other)?;
        self.writer.write_all(b"\n")?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_rows(&mut self, rows: &[ResourceRow]) -> io::Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Flush and return how many rows were written.
    pub fn finish(mut self) -> io::Result<usize> {
        self.writer.flush()?;
        Ok(self.rows_written)
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> ResourceRow {
        ResourceRow {
            environment: "dev".into(),
            stack: "RiseScout-dev-Data".into(),
            logical_id: id.into(),
            resource_type: "AWS::DynamoDB::Table".into(),
            creation_index: 0,
            depends_on: vec![],
            imports: vec!["RiseScout-dev-Network/Vpc".into()],
            removal_policy: Some("DESTROY".into()),
        }
    }

    #[test]
    fn one_json_object_per_line() {
        let mut buf = Vec::new();
        let mut sink = JsonStreamSink::new(&mut buf);
        sink.write_rows(&[row("A"), row("B")]).unwrap();
        assert_eq!(sink.rows_written(), 2);
        assert_eq!(sink.finish().unwrap(), 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["logical_id"], "B");
        assert_eq!(parsed["removal_policy"], "DESTROY");
    }
}
