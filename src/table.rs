use std::fs;
use std::io;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::batch::{LookupRequest, QueryBuilder, ResultMerger};
use crate::errors::{AppError, AppResult};
use crate::outcome::Outcome;

pub const OUTPUT_COLUMNS: [&str; 3] = ["latitude", "longitude", "place_id"];

#[derive(Debug, Clone)]
pub struct CsvColumns {
    pub name: String,
    pub address: String,
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            name: "show_name".into(),
            address: "address".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableRow {
    pub fields: StringRecord,
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone)]
pub struct CsvLayout {
    name_index: Option<usize>,
    address_index: Option<usize>,
}

impl CsvLayout {
    fn from_headers(headers: &StringRecord, columns: &CsvColumns) -> AppResult<Self> {
        let position = |wanted: &str| headers.iter().position(|h| h.trim() == wanted);
        let layout = Self {
            name_index: position(&columns.name),
            address_index: position(&columns.address),
        };
        if layout.name_index.is_none() && layout.address_index.is_none() {
            return Err(AppError::Config(format!(
                "input has neither a {:?} nor an {:?} column",
                columns.name, columns.address
            )));
        }
        Ok(layout)
    }

    fn field<'r>(&self, row: &'r TableRow, index: Option<usize>) -> &'r str {
        index
            .and_then(|i| row.fields.get(i))
            .map(str::trim)
            .unwrap_or_default()
    }
}

impl QueryBuilder<TableRow> for CsvLayout {
    fn lookup_request(&self, record: &TableRow) -> LookupRequest {
        let name = self.field(record, self.name_index);
        let address = self.field(record, self.address_index);

        let mut candidates = Vec::new();
        if !name.is_empty() {
            if !address.is_empty() {
                candidates.push(format!("{name} {address}"));
            }
            candidates.push(name.to_string());
        }

        LookupRequest {
            candidates,
            address: Some(address.to_string()).filter(|a| !a.is_empty()),
        }
    }
}

impl ResultMerger<TableRow> for CsvLayout {
    fn merge(&self, record: &mut TableRow, outcome: &Outcome) {
        record.outcome = Some(outcome.clone());
    }
}

pub struct CsvTable {
    pub headers: StringRecord,
    pub layout: CsvLayout,
    pub rows: Vec<TableRow>,
}

impl CsvTable {
    pub fn read_path(path: &Path, columns: &CsvColumns) -> AppResult<Self> {
        let file = fs::File::open(path).map_err(|err| {
            AppError::Config(format!("missing input file {}: {err}", path.display()))
        })?;
        Self::from_reader(file, columns)
    }

    pub fn from_reader<R: io::Read>(reader: R, columns: &CsvColumns) -> AppResult<Self> {
        let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers = reader.headers()?.clone();
        let layout = CsvLayout::from_headers(&headers, columns)?;
        let rows = reader
            .records()
            .map(|record| {
                record.map(|fields| TableRow {
                    fields,
                    outcome: None,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            headers,
            layout,
            rows,
        })
    }

    pub fn write_path(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        self.write_to(file)
    }

    pub fn write_to<W: io::Write>(&self, writer: W) -> AppResult<()> {
        let mut writer = WriterBuilder::new().flexible(true).from_writer(writer);

        let mut headers = self.headers.clone();
        for column in OUTPUT_COLUMNS {
            headers.push_field(column);
        }
        writer.write_record(&headers)?;

        for row in &self.rows {
            let mut fields = row.fields.clone();
            // Pad short rows so the output columns line up with the header.
            while fields.len() < self.headers.len() {
                fields.push_field("");
            }
            let place = row.outcome.as_ref().and_then(Outcome::place);
            let lat = place.map(|p| p.lat.to_string()).unwrap_or_default();
            let lng = place.map(|p| p.lng.to_string()).unwrap_or_default();
            let place_id = place.and_then(|p| p.place_id.clone()).unwrap_or_default();
            fields.push_field(&lat);
            fields.push_field(&lng);
            fields.push_field(&place_id);
            writer.write_record(&fields)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
