//! Rendering of list results to the console or to `files.csv`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{ApiClient, ClientError, ListStream, StreamStep};
use crate::models::file::FileInfo;
use crate::models::query::ListFileMetadataRequest;
use crate::query;

pub const HEADERS: [&str; 7] = [
    "File ID",
    "File Name",
    "Size",
    "Created At",
    "Compression",
    "Compression Type",
    "Metadata",
];

pub const FILE_NAME: &str = "files.csv";

/// One list invocation as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct ListConfig {
    pub filters: Vec<String>,
    pub sorts: Vec<String>,
    /// Write `files.csv` here instead of printing to stdout.
    pub output_dir: Option<PathBuf>,
}

impl ListConfig {
    pub fn request(&self) -> Result<ListFileMetadataRequest, ClientError> {
        Ok(ListFileMetadataRequest {
            filter_by: query::parse_filters(&self.filters)?,
            sort_by: query::parse_sorts(&self.sorts)?,
        })
    }
}

pub fn format_row(info: &FileInfo) -> Result<Vec<String>, ClientError> {
    let created_at = chrono::DateTime::from_timestamp(info.created_at, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| info.created_at.to_string());
    let metadata = serde_json::to_string(&info.metadata).map_err(ClientError::Decode)?;

    Ok(vec![
        info.file_id.id.clone(),
        info.file_id.name.clone(),
        info.size.to_string(),
        created_at,
        info.compression.to_string(),
        info.compression_type.clone(),
        metadata,
    ])
}

/// Escapes a value for CSV output.
pub fn escape_csv(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub trait RowWriter {
    fn write_row(&mut self, values: &[String]) -> Result<(), ClientError>;
}

/// Tab separated lines, header first.
pub struct TableWriter<W: Write> {
    out: W,
}

impl<W: Write> TableWriter<W> {
    pub fn new(mut out: W) -> Result<Self, ClientError> {
        writeln!(out, "{}", HEADERS.join("\t"))?;
        Ok(Self { out })
    }

    pub fn into_inner(mut self) -> Result<W, ClientError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> RowWriter for TableWriter<W> {
    fn write_row(&mut self, values: &[String]) -> Result<(), ClientError> {
        writeln!(self.out, "{}", values.join("\t"))?;
        Ok(())
    }
}

/// `files.csv` that only survives if [`CsvFile::finish`] is reached.
pub struct CsvFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl CsvFile {
    pub fn create(dir: &Path) -> Result<Self, ClientError> {
        let path = dir.join(FILE_NAME);
        let writer = BufWriter::new(File::create(&path)?);
        let mut file = Self {
            path,
            writer: Some(writer),
        };
        let header: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        file.write_row(&header)?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and keep the file. On a failed flush the guard still owns the
    /// writer, so the file is removed on drop.
    pub fn finish(mut self) -> Result<PathBuf, ClientError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        self.writer = None;
        Ok(std::mem::take(&mut self.path))
    }
}

impl RowWriter for CsvFile {
    fn write_row(&mut self, values: &[String]) -> Result<(), ClientError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ClientError::Io(std::io::Error::other("csv file already closed")))?;
        let escaped: Vec<String> = values.iter().map(|v| escape_csv(v)).collect();
        writeln!(writer, "{}", escaped.join(","))?;
        Ok(())
    }
}

impl Drop for CsvFile {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove partial output");
            } else {
                tracing::debug!(path = %self.path.display(), "Removed partial output");
            }
        }
    }
}

/// Pull every record from `stream` into `writer`. Returns the row count.
pub async fn render<R: RowWriter>(stream: &mut ListStream, writer: &mut R) -> Result<u64, ClientError> {
    let mut rows = 0u64;
    loop {
        match stream.next().await {
            StreamStep::Record(info) => {
                writer.write_row(&format_row(&info)?)?;
                rows += 1;
            }
            StreamStep::Done => return Ok(rows),
            StreamStep::Failure(e) => return Err(e),
        }
    }
}

/// Run a list invocation end to end.
///
/// Expressions are parsed before anything is sent. With an output directory
/// the rows land in `files.csv`, which is removed again if the stream fails.
pub async fn run_list(client: &ApiClient, config: &ListConfig) -> Result<u64, ClientError> {
    let request = config.request()?;
    let mut stream = client.list_file_metadata(&request).await?;

    match &config.output_dir {
        Some(dir) => {
            let mut csv = CsvFile::create(dir)?;
            let rows = render(&mut stream, &mut csv).await?;
            let path = csv.finish()?;
            tracing::info!(path = %path.display(), rows, "List written");
            Ok(rows)
        }
        None => {
            let mut table = TableWriter::new(std::io::stdout())?;
            let rows = render(&mut stream, &mut table).await?;
            table.into_inner()?;
            Ok(rows)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::file::FileId;
    use std::collections::BTreeMap;

    fn info() -> FileInfo {
        FileInfo {
            file_id: FileId {
                id: "123hft".into(),
                name: "dummy, v2".into(),
            },
            size: 10,
            compression: true,
            compression_type: "gzip".into(),
            created_at: 1618272000,
            deleted_at: None,
            metadata: BTreeMap::from([("type".to_string(), "report".to_string())]),
        }
    }

    #[test]
    fn test_escape_csv() {
        assert_eq!(escape_csv("hello"), "hello");
        assert_eq!(escape_csv("hello,world"), "\"hello,world\"");
        assert_eq!(escape_csv("hello\"world"), "\"hello\"\"world\"");
    }

    #[test]
    fn test_format_row() {
        let row = format_row(&info()).unwrap();
        assert_eq!(row[0], "123hft");
        assert_eq!(row[2], "10");
        assert_eq!(row[3], "2021-04-13T00:00:00+00:00");
        assert_eq!(row[4], "true");
        assert_eq!(row[6], r#"{"type":"report"}"#);
    }

    #[test]
    fn test_table_writer_is_tab_separated() {
        let mut table = TableWriter::new(Vec::new()).unwrap();
        table.write_row(&format_row(&info()).unwrap()).unwrap();
        let text = String::from_utf8(table.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADERS.join("\t"));
        assert!(lines[1].starts_with("123hft\tdummy, v2\t10\t"));
    }

    #[test]
    fn test_csv_file_kept_only_after_finish() {
        let dir = tempfile::tempdir().unwrap();

        let mut csv = CsvFile::create(dir.path()).unwrap();
        csv.write_row(&format_row(&info()).unwrap()).unwrap();
        let path = csv.path().to_path_buf();
        drop(csv);
        assert!(!path.exists());

        let mut csv = CsvFile::create(dir.path()).unwrap();
        csv.write_row(&format_row(&info()).unwrap()).unwrap();
        let path = csv.finish().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("File ID,File Name,Size,Created At,"));
        assert!(text.contains("123hft,\"dummy, v2\",10,"));
        assert!(text.contains(r#""{""type"":""report""}""#));
    }

    #[test]
    fn test_bad_expression_fails_before_request() {
        let config = ListConfig {
            filters: vec!["provided_name EQUAL".into()],
            ..Default::default()
        };
        assert!(matches!(config.request(), Err(ClientError::Query(_))));
    }
}
