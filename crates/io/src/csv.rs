// Delimited ledger import

use std::io::ErrorKind;
use std::path::Path;

use sisxml_recon::error::ReconError;
use sisxml_recon::model::Table;
use sisxml_recon::source::TextDecoder;

/// Read a delimited file into a [`Table`].
///
/// `skip_lines` physical lines are discarded before the header line. Rows may
/// be ragged; blank lines are ignored.
pub fn read_table(
    path: &Path,
    delimiter: u8,
    skip_lines: usize,
    decoder: &dyn TextDecoder,
) -> Result<Table, ReconError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ReconError::MissingSource(path.to_path_buf()),
        _ => ReconError::io(path, e),
    })?;
    let content = decoder.decode(&bytes);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let table = parse_table(&name, skip_to_line(&content, skip_lines), delimiter)?;
    log::info!(
        "{}: {} column(s), {} row(s)",
        path.display(),
        table.headers.len(),
        table.rows.len()
    );
    Ok(table)
}

fn skip_to_line(content: &str, skip_lines: usize) -> &str {
    let mut rest = content;
    for _ in 0..skip_lines {
        match rest.find('\n') {
            Some(idx) => rest = &rest[idx + 1..],
            None => return "",
        }
    }
    rest
}

fn parse_table(name: &str, content: &str, delimiter: u8) -> Result<Table, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let headers: Vec<String> = match records.next() {
        Some(record) => record
            .map_err(|e| csv_error(name, e))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for result in records {
        let record = result.map_err(|e| csv_error(name, e))?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(Table {
        name: name.to_string(),
        headers,
        rows,
    })
}

fn csv_error(name: &str, err: csv::Error) -> ReconError {
    let line = err
        .position()
        .map(|p| format!(" at line {}", p.line()))
        .unwrap_or_default();
    ReconError::io(
        name,
        std::io::Error::new(ErrorKind::InvalidData, format!("CSV error{line}: {err}")),
    )
}
