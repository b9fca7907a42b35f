use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use serde::{ser::SerializeMap, Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// One column value in transit, both as a bound parameter and as a result cell.
///
/// Serialized untagged, so a row renders as plain JSON scalars. Variant order matters for
/// decoding: a number that fits `i64` becomes `Integer`, any other number `Float`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl ToSql for Scalar {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Scalar::Null => ToSqlOutput::Owned(Value::Null),
            Scalar::Boolean(v) => ToSqlOutput::Owned(Value::Integer(i64::from(*v))),
            Scalar::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Scalar::Float(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Scalar::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// Body of `POST /query`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    /// Positional parameters; absent and `null` both mean none
    #[serde(default, deserialize_with = "deserialize_params")]
    pub params: Vec<Scalar>,
}

fn deserialize_params<'de, D>(deserializer: D) -> Result<Vec<Scalar>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Scalar>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One result row. Column names are shared with every other row of the same set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Arc<[String]>,
    values: Vec<Scalar>,
}

impl ResultRow {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<Scalar>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for ResultRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Rows produced by one statement execution. Serializes as a JSON array, `[]` when empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    columns: Arc<[String]>,
    rows: Vec<ResultRow>,
}

impl ResultSet {
    pub(crate) fn new(columns: Arc<[String]>, rows: Vec<ResultRow>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl Serialize for ResultSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(self.rows.iter())
    }
}
