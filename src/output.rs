//! Output record layout and sinks

use std::io::Write;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    /// Declared width; informational only, values are never truncated.
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSchema {
    pub fields: Vec<FieldSpec>,
}

impl RecordSchema {
    /// The node's only layout: one `FilePath` string column.
    pub fn file_path() -> Self {
        Self {
            fields: vec![FieldSpec {
                name: "FilePath".to_string(),
                field_type: FieldType::String,
                size: 100,
            }],
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub values: Vec<String>,
}

impl Record {
    pub fn single(value: impl Into<String>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output has not been initialized with a record layout")]
    NotInitialized,

    #[error("Output is already closed")]
    Closed,

    #[error("Record has {actual} values but the layout has {expected} fields")]
    FieldCount { expected: usize, actual: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Downstream consumer of the node's records
pub trait RecordSink {
    /// Publish the record layout. Called before any record is pushed.
    fn init(&mut self, schema: &RecordSchema) -> Result<(), OutputError>;

    fn push(&mut self, record: &Record) -> Result<(), OutputError>;

    /// Flush and close. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), OutputError>;

    fn is_closed(&self) -> bool;
}

impl<T: RecordSink + ?Sized> RecordSink for Box<T> {
    fn init(&mut self, schema: &RecordSchema) -> Result<(), OutputError> {
        (**self).init(schema)
    }

    fn push(&mut self, record: &Record) -> Result<(), OutputError> {
        (**self).push(record)
    }

    fn close(&mut self) -> Result<(), OutputError> {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

fn check_width(schema: &Option<RecordSchema>, record: &Record) -> Result<(), OutputError> {
    let schema = schema.as_ref().ok_or(OutputError::NotInitialized)?;
    if schema.fields.len() != record.values.len() {
        return Err(OutputError::FieldCount {
            expected: schema.fields.len(),
            actual: record.values.len(),
        });
    }
    Ok(())
}

/// Writes a header row and one CSV row per record.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    schema: Option<RecordSchema>,
    closed: bool,
}

impl<W: Write> CsvSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(inner),
            schema: None,
            closed: false,
        }
    }

    /// Recover the underlying writer, flushing anything buffered.
    pub fn into_inner(self) -> Result<W, OutputError> {
        self.writer
            .into_inner()
            .map_err(|e| OutputError::Io(e.into_error()))
    }
}

impl<W: Write> RecordSink for CsvSink<W> {
    fn init(&mut self, schema: &RecordSchema) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        if self.schema.is_none() {
            self.writer.write_record(schema.field_names())?;
            self.schema = Some(schema.clone());
        }
        Ok(())
    }

    fn push(&mut self, record: &Record) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        check_width(&self.schema, record)?;
        self.writer.write_record(&record.values)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        if !self.closed {
            self.writer.flush()?;
            self.closed = true;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Keeps records in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub schema: Option<RecordSchema>,
    pub records: Vec<Record>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values of the first column, in push order
    pub fn first_column(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter_map(|r| r.values.first().map(String::as_str))
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn init(&mut self, schema: &RecordSchema) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn push(&mut self, record: &Record) -> Result<(), OutputError> {
        if self.closed {
            return Err(OutputError::Closed);
        }
        check_width(&self.schema, record)?;
        self.records.push(record.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_path_schema() {
        let schema = RecordSchema::file_path();
        assert_eq!(schema.field_names(), vec!["FilePath"]);
        assert_eq!(schema.fields[0].field_type, FieldType::String);
        assert_eq!(schema.fields[0].size, 100);
    }

    #[test]
    fn test_csv_sink_writes_header_and_rows() {
        let mut sink = CsvSink::new(Vec::new());
        sink.init(&RecordSchema::file_path()).unwrap();
        sink.push(&Record::single("/tmp/out/a.csv")).unwrap();
        sink.push(&Record::single("/tmp/out/with, comma.csv")).unwrap();
        sink.close().unwrap();

        let written = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(
            written,
            "FilePath\n/tmp/out/a.csv\n\"/tmp/out/with, comma.csv\"\n"
        );
    }

    #[test]
    fn test_push_requires_init() {
        let mut sink = MemorySink::new();
        assert!(matches!(
            sink.push(&Record::single("x")),
            Err(OutputError::NotInitialized)
        ));
    }

    #[test]
    fn test_push_checks_width() {
        let mut sink = MemorySink::new();
        sink.init(&RecordSchema::file_path()).unwrap();
        let wide = Record {
            values: vec!["a".into(), "b".into()],
        };
        assert!(matches!(
            sink.push(&wide),
            Err(OutputError::FieldCount { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_closed_sink_rejects_records() {
        let mut sink = MemorySink::new();
        sink.init(&RecordSchema::file_path()).unwrap();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(sink.push(&Record::single("x")), Err(OutputError::Closed)));
    }
}
