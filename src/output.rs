use anyhow::anyhow;
use csv::WriterBuilder;
use formatx::formatx;
use serde::Serialize;
use std::fmt::Debug;
use std::fs::File;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

pub const DETAILS_KEY: &str = "details";
pub const SUMMARY_KEY: &str = "summary";
pub const FAILURES_KEY: &str = "failures";

pub trait Output: Debug {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write>;
    /// Whether this output can be considered a no-op and therefore that any code that only writes
    /// to the output can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Writes each location to its own file in a directory. The file template has one `{}`
/// placeholder, which is replaced by the location key.
#[derive(Debug)]
pub struct FileOutput {
    directory_path: PathBuf,
    file_template: String,
}

impl FileOutput {
    pub fn new(directory_path: PathBuf, file_template: String) -> Self {
        Self {
            directory_path,
            file_template,
        }
    }
}

impl Output for FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        let file_name = formatx!(&self.file_template, location_key)
            .map_err(|e| anyhow!("Bad output file template '{}': {e}", self.file_template))?;
        Ok(BufWriter::new(File::create(
            self.directory_path.join(file_name),
        )?))
    }
}

impl Output for &FileOutput {
    fn writer_for_location_key(&self, location_key: &str) -> anyhow::Result<impl Write> {
        <FileOutput as Output>::writer_for_location_key(self, location_key)
    }
}

/// An output that goes to nowhere/ a "sink"/ /dev/null.
#[derive(Debug, Default)]
pub struct SinkOutput;

impl Output for SinkOutput {
    fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
        Ok(io::sink())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Write rows as CSV with a header taken from the row type's field names.
pub fn write_csv_rows<T: Serialize>(
    output: &impl Output,
    location_key: &str,
    rows: &[T],
) -> anyhow::Result<()> {
    if output.is_noop() {
        return Ok(());
    }

    let mut writer =
        WriterBuilder::new().from_writer(output.writer_for_location_key(location_key)?);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Collects everything written, regardless of location key.
    #[derive(Debug, Default)]
    struct MemoryOutput {
        written: Rc<RefCell<Vec<u8>>>,
    }

    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Output for MemoryOutput {
        fn writer_for_location_key(&self, _location_key: &str) -> anyhow::Result<impl Write> {
            Ok(SharedBuffer(self.written.clone()))
        }
    }

    #[derive(Serialize)]
    struct Row {
        district: &'static str,
        delivered_energy_gj: f64,
    }

    #[rstest]
    fn should_write_rows_with_header() {
        let output = MemoryOutput::default();
        write_csv_rows(
            &output,
            DETAILS_KEY,
            &[
                Row {
                    district: "Lagunes",
                    delivered_energy_gj: 400000.,
                },
                Row {
                    district: "Savanes",
                    delivered_energy_gj: 1.5,
                },
            ],
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(output.written.borrow().clone()).unwrap(),
            "district,delivered_energy_gj\nLagunes,400000.0\nSavanes,1.5\n"
        );
    }

    #[rstest]
    fn should_skip_writing_to_sink() {
        let rows = [Row {
            district: "Lagunes",
            delivered_energy_gj: 1.,
        }];
        assert!(write_csv_rows(&SinkOutput, SUMMARY_KEY, &rows).is_ok());
    }
}
