// Result marshaling
// SQLite storage classes -> JSON-safe scalars

use crate::models::{ResultRow, Scalar};
use base64::{engine::general_purpose, Engine as _};
use rusqlite::types::ValueRef;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How BLOB cells are rendered.
///
/// `Text` reinterprets the bytes as UTF-8 with replacement characters, which is lossy for
/// binary payloads. `Base64` keeps the bytes recoverable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobEncoding {
    #[default]
    Text,
    Base64,
}

/// Column hint taken from the declared type in the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Plain,
}

impl ColumnKind {
    pub fn from_decl_type(decl_type: Option<&str>) -> Self {
        match decl_type.map(|d| d.trim().to_ascii_uppercase()) {
            Some(d) if d == "BOOLEAN" || d == "BOOL" => ColumnKind::Boolean,
            _ => ColumnKind::Plain,
        }
    }
}

/// Column layout of one statement, computed once before stepping rows.
///
/// A name repeated in the select list occupies a single slot (first position); the later
/// column's value wins.
#[derive(Debug, Clone)]
pub struct RowLayout {
    columns: Arc<[String]>,
    slots: Vec<usize>,
    kinds: Vec<ColumnKind>,
}

impl RowLayout {
    pub fn new<I>(columns: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut slots = Vec::new();
        let mut kinds = Vec::new();

        for (name, decl_type) in columns {
            let slot = match names.iter().position(|n| *n == name) {
                Some(existing) => existing,
                None => {
                    names.push(name);
                    names.len() - 1
                }
            };
            slots.push(slot);
            kinds.push(ColumnKind::from_decl_type(decl_type.as_deref()));
        }

        Self {
            columns: names.into(),
            slots,
            kinds,
        }
    }

    pub fn columns(&self) -> Arc<[String]> {
        self.columns.clone()
    }

    /// Number of columns the statement returns, duplicates included
    pub fn statement_width(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResultMarshaler {
    blob_encoding: BlobEncoding,
}

impl ResultMarshaler {
    pub fn new(blob_encoding: BlobEncoding) -> Self {
        Self { blob_encoding }
    }

    pub fn blob_encoding(&self) -> BlobEncoding {
        self.blob_encoding
    }

    pub fn to_scalar(&self, value: ValueRef<'_>, kind: ColumnKind) -> Scalar {
        match value {
            ValueRef::Null => Scalar::Null,
            ValueRef::Integer(v) => match kind {
                ColumnKind::Boolean => Scalar::Boolean(v > 0),
                ColumnKind::Plain => Scalar::Integer(v),
            },
            ValueRef::Real(v) => Scalar::Float(v),
            ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => self.blob_to_scalar(bytes),
        }
    }

    fn blob_to_scalar(&self, bytes: &[u8]) -> Scalar {
        match self.blob_encoding {
            BlobEncoding::Text => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
            BlobEncoding::Base64 => Scalar::Text(general_purpose::STANDARD.encode(bytes)),
        }
    }

    pub fn marshal_row(&self, layout: &RowLayout, row: &Row<'_>) -> rusqlite::Result<ResultRow> {
        let mut values = vec![Scalar::Null; layout.columns.len()];
        for (idx, (&slot, &kind)) in layout.slots.iter().zip(layout.kinds.iter()).enumerate() {
            values[slot] = self.to_scalar(row.get_ref(idx)?, kind);
        }
        Ok(ResultRow::new(layout.columns(), values))
    }
}
