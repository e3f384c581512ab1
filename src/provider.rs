//! Labeled connection sources.
//!
//! A [`FeatureProvider`] hands out connection records restricted to the
//! fields a cascade needs. The id filter follows three rules:
//! - `None` returns every record, in storage order
//! - `Some(&[])` returns no records
//! - `Some(ids)` returns exactly those records, in the order given; an id
//!   listed more than once is returned once, at its first position

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::info;

use crate::Error;

const ID_COLUMN: &str = "id";

/// One labeled connection: attribute name to numeric value.
///
/// Holds classifier inputs and ground-truth label attributes alike; a label
/// attribute valued 1 means that label applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    pub id: i64,
    pub values: HashMap<String, f64>,
}

impl Connection {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            values: HashMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// A source of labeled connection records.
pub trait FeatureProvider {
    /// Fetch records projected onto `fields`.
    ///
    /// Every requested field must exist in the source, otherwise the call
    /// fails with a configuration error.
    fn fetch(&self, fields: &[String], ids: Option<&[i64]>) -> Result<Vec<Connection>, Error>;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryProvider {
    records: Vec<Connection>,
}

impl MemoryProvider {
    pub fn new(records: Vec<Connection>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FeatureProvider for MemoryProvider {
    fn fetch(&self, fields: &[String], ids: Option<&[i64]>) -> Result<Vec<Connection>, Error> {
        select(&self.records, fields, ids)
    }
}

/// Records loaded from a headered CSV file with an `id` column.
///
/// Every other column is parsed as a number.
#[derive(Debug, Clone)]
pub struct CsvProvider {
    columns: Vec<String>,
    records: Vec<Connection>,
}

impl CsvProvider {
    /// Load all records from `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let provider = Self::from_reader(BufReader::new(file))?;
        info!(
            "Loaded {} connections ({} columns) from {}",
            provider.records.len(),
            provider.columns.len(),
            path.display()
        );
        Ok(provider)
    }

    /// Load all records from any line-oriented reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut lines = reader.lines();

        let header_line = match lines.next() {
            Some(line) => line?,
            None => return Err(Error::Config("connection file has no header row".to_string())),
        };
        let columns: Vec<String> = header_line
            .split(',')
            .map(|name| name.trim().to_string())
            .collect();
        let id_idx = columns
            .iter()
            .position(|c| c == ID_COLUMN)
            .ok_or_else(|| Error::Config(format!("connection file has no '{}' column", ID_COLUMN)))?;

        let mut records = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line?;
            let line_no = i + 2;
            if line.trim().is_empty() {
                continue;
            }
            records.push(parse_row(&line, line_no, &columns, id_idx)?);
        }

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FeatureProvider for CsvProvider {
    fn fetch(&self, fields: &[String], ids: Option<&[i64]>) -> Result<Vec<Connection>, Error> {
        if let Some(missing) = fields.iter().find(|f| !self.columns.contains(f)) {
            return Err(Error::Config(format!(
                "connection source has no column '{}'",
                missing
            )));
        }
        select(&self.records, fields, ids)
    }
}

fn parse_row(line: &str, line_no: usize, columns: &[String], id_idx: usize) -> Result<Connection, Error> {
    let data_error = |reason: String| Error::DataFormat {
        line: line_no,
        record: line.to_string(),
        reason,
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != columns.len() {
        return Err(data_error(format!(
            "expected {} columns, found {}",
            columns.len(),
            fields.len()
        )));
    }

    let id: i64 = fields[id_idx]
        .parse()
        .map_err(|_| data_error(format!("id {:?} is not an integer", fields[id_idx])))?;

    let mut conn = Connection::new(id);
    for (idx, (name, raw)) in columns.iter().zip(&fields).enumerate() {
        if idx == id_idx {
            continue;
        }
        let value: f64 = raw
            .parse()
            .map_err(|_| data_error(format!("column '{}' value {:?} is not a number", name, raw)))?;
        conn.values.insert(name.clone(), value);
    }
    Ok(conn)
}

/// Parse a connection id list, separated by commas and/or whitespace.
///
/// Blank entries are skipped, so trailing separators and blank lines are fine.
pub fn parse_id_list(text: &str) -> Result<Vec<i64>, Error> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid connection id {:?}", s)))
        })
        .collect()
}

fn project(conn: &Connection, fields: &[String]) -> Result<Connection, Error> {
    let mut projected = Connection::new(conn.id);
    for field in fields {
        let value = conn.get(field).ok_or_else(|| {
            Error::Config(format!("connection {} has no field '{}'", conn.id, field))
        })?;
        projected.values.insert(field.clone(), value);
    }
    Ok(projected)
}

fn select(records: &[Connection], fields: &[String], ids: Option<&[i64]>) -> Result<Vec<Connection>, Error> {
    match ids {
        None => records.iter().map(|c| project(c, fields)).collect(),
        Some(ids) => {
            let by_id: HashMap<i64, &Connection> = records.iter().map(|c| (c.id, c)).collect();
            let mut seen = HashSet::with_capacity(ids.len());
            ids.iter()
                .filter(|id| seen.insert(**id))
                .map(|id| {
                    let conn = by_id.get(id).ok_or(Error::UnknownConnection(*id))?;
                    project(conn, fields)
                })
                .collect()
        }
    }
}
