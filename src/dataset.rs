use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::insight_core::category::Category;
use crate::utils::LearnError;

/// A single cell of a row
///
/// Floats and categories take part in distance computation. Text is opaque:
/// it is skipped by distances, left untouched by centroid arithmetic and used
/// for class labels.
#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Float(f64),
    Category(Category),
    Text(String),
}

impl Feature {
    /// Classify and convert a raw CSV cell
    ///
    /// `[..]` is read as a one-hot category, anything that parses as f64 as
    /// a float, everything else as text.
    pub fn parse(raw: &str) -> Result<Self, LearnError> {
        let cell = raw.trim();
        if cell.len() > 2 && cell.starts_with('[') && cell.ends_with(']') {
            return Category::from_bits(cell).map(Feature::Category);
        }
        if let Ok(value) = cell.parse::<f64>() {
            return Ok(Feature::Float(value));
        }
        Ok(Feature::Text(cell.to_string()))
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            Feature::Float(_) => FeatureKind::Float,
            Feature::Category(_) => FeatureKind::Category,
            Feature::Text(_) => FeatureKind::Text,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Feature::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_category(&self) -> Option<&Category> {
        match self {
            Feature::Category(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Feature::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Class name carried by this value: text, or a vocabulary category's token
    pub fn label(&self) -> Option<&str> {
        match self {
            Feature::Text(s) => Some(s),
            Feature::Category(c) => c.label(),
            Feature::Float(_) => None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Float(v) => write!(f, "{}", v),
            Feature::Category(c) => write!(f, "{}", c),
            Feature::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Serialize for Feature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Feature::Float(v) => serializer.serialize_f64(*v),
            Feature::Category(c) => serializer.collect_str(c),
            Feature::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<f64> for Feature {
    fn from(v: f64) -> Self {
        Feature::Float(v)
    }
}

impl From<Category> for Feature {
    fn from(c: Category) -> Self {
        Feature::Category(c)
    }
}

impl From<&str> for Feature {
    fn from(s: &str) -> Self {
        Feature::Text(s.to_string())
    }
}

impl From<String> for Feature {
    fn from(s: String) -> Self {
        Feature::Text(s)
    }
}

/// Kind tag of a [`Feature`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Float,
    Category,
    Text,
}

impl FromStr for FeatureKind {
    type Err = LearnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float" => Ok(Self::Float),
            "category" => Ok(Self::Category),
            "text" => Ok(Self::Text),
            other => Err(LearnError::UnknownFeatureKind(format!(
                "'{}' (expected float, category or text)",
                other
            ))),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Float => "float",
            FeatureKind::Category => "category",
            FeatureKind::Text => "text",
        };
        write!(f, "{}", name)
    }
}

/// An ordered sequence of features; fixed width within a table
pub type Row = Vec<Feature>;

/// Row-oriented tabular data source
///
/// The algorithms only read through `row`; `set_row` exists for
/// preprocessing steps such as scaling and nominal encoding. In-memory tables
/// lend their rows, other sources may hand out owned ones.
pub trait Table {
    /// Number of rows
    fn len(&self) -> usize;

    /// Number of columns
    fn width(&self) -> usize;

    /// Row at `index`, `DataAccessError` when out of range
    fn row(&self, index: usize) -> Result<Cow<'_, [Feature]>, LearnError>;

    /// Replace the row at `index`
    fn set_row(&mut self, index: usize, row: Row) -> Result<(), LearnError>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Table kept entirely in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    rows: Vec<Row>,
}

impl MemoryTable {
    /// Create a new empty table
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    /// Build a table, checking every row has the same width
    pub fn from_rows(rows: Vec<Row>) -> Result<Self, LearnError> {
        let mut table = Self::new();
        for row in rows {
            table.push(row)?;
        }
        Ok(table)
    }

    /// Append a row
    pub fn push(&mut self, row: Row) -> Result<(), LearnError> {
        if let Some(first) = self.rows.first() {
            if first.len() != row.len() {
                return Err(LearnError::ShapeMismatch(format!(
                    "row {} has {} columns, table has {}",
                    self.rows.len(),
                    row.len(),
                    first.len()
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Kinds of the first row's columns
    pub fn column_kinds(&self) -> Vec<FeatureKind> {
        self.rows
            .first()
            .map(|row| row.iter().map(Feature::kind).collect())
            .unwrap_or_default()
    }

    /// Load a table from CSV text
    pub fn from_csv(csv_data: &str, has_headers: bool) -> Result<Self, LearnError> {
        read_csv(csv_data.as_bytes(), has_headers)
    }
}

impl Table for MemoryTable {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    fn row(&self, index: usize) -> Result<Cow<'_, [Feature]>, LearnError> {
        self.rows
            .get(index)
            .map(|row| Cow::Borrowed(row.as_slice()))
            .ok_or_else(|| no_such_row(index, self.rows.len()))
    }

    fn set_row(&mut self, index: usize, row: Row) -> Result<(), LearnError> {
        let width = self.width();
        let len = self.rows.len();
        let slot = self.rows.get_mut(index).ok_or_else(|| no_such_row(index, len))?;
        if row.len() != width {
            return Err(LearnError::ShapeMismatch(format!(
                "replacement row has {} columns, table has {}",
                row.len(),
                width
            )));
        }
        *slot = row;
        Ok(())
    }
}

fn no_such_row(index: usize, len: usize) -> LearnError {
    LearnError::DataAccessError(format!("no such row {} (table has {} rows)", index, len))
}

/// Check that every row of `table` has exactly the `expected` column kinds
///
/// # Returns
/// * `Ok(())` when every cell matches
/// * `Err(LearnError::ShapeMismatch)` when the widths differ
/// * `Err(LearnError::TypeMismatch)` for the first cell of another kind
pub fn check_column_kinds<T: Table>(table: &T, expected: &[FeatureKind]) -> Result<(), LearnError> {
    if !table.is_empty() && table.width() != expected.len() {
        return Err(LearnError::ShapeMismatch(format!(
            "{} column kinds given for {} columns",
            expected.len(),
            table.width()
        )));
    }
    for i in 0..table.len() {
        let row = table.row(i)?;
        for (j, (feature, kind)) in row.iter().zip(expected).enumerate() {
            if feature.kind() != *kind {
                return Err(LearnError::TypeMismatch(format!(
                    "row {} column {} is {}, expected {}",
                    i,
                    j,
                    feature.kind(),
                    kind
                )));
            }
        }
    }
    Ok(())
}

/// Table handing out owned rows, failing on one row index
#[cfg(test)]
pub(crate) struct FailingTable {
    pub rows: Vec<Row>,
    pub broken: usize,
}

#[cfg(test)]
impl Table for FailingTable {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn width(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    fn row(&self, index: usize) -> Result<Cow<'_, [Feature]>, LearnError> {
        if index == self.broken {
            return Err(LearnError::DataAccessError(format!("row {} unreadable", index)));
        }
        self.rows
            .get(index)
            .map(|row| Cow::Owned(row.clone()))
            .ok_or_else(|| no_such_row(index, self.rows.len()))
    }

    fn set_row(&mut self, index: usize, row: Row) -> Result<(), LearnError> {
        let len = self.rows.len();
        let slot = self.rows.get_mut(index).ok_or_else(|| no_such_row(index, len))?;
        *slot = row;
        Ok(())
    }
}

/// Read CSV records into a [`MemoryTable`], classifying every cell
///
/// # Arguments
/// * `reader` - CSV source
/// * `has_headers` - Skip the first record when true
///
/// # Returns
/// * `Ok(MemoryTable)` with one row per record
/// * `Err(LearnError)` on malformed CSV, ragged records or bad category cells
pub fn read_csv<R: Read>(reader: R, has_headers: bool) -> Result<MemoryTable, LearnError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut table = MemoryTable::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = record
            .iter()
            .map(Feature::parse)
            .collect::<Result<Row, LearnError>>()
            .map_err(|e| match e {
                LearnError::InvalidEncoding(msg) => {
                    LearnError::InvalidEncoding(format!("record {}: {}", i, msg))
                }
                other => other,
            })?;
        table.push(row)?;
    }

    tracing::debug!(rows = table.len(), columns = table.width(), "loaded csv");
    Ok(table)
}

/// Read a CSV file from disk
pub fn read_csv_file<P: AsRef<Path>>(
    path: P,
    has_headers: bool,
) -> Result<MemoryTable, LearnError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        LearnError::CsvError(format!("cannot open '{}': {}", path.display(), e))
    })?;
    read_csv(file, has_headers)
}
