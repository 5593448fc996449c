use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Serialize, Serializer};
use std::fmt;

/// Recognized dataset columns. Anything else a source sends is dropped at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    Timestamp,
    EntityName,
    Category,
    Amount,
    Quantity,
    CustomerId,
    DaysUntilExpiry,
}

impl Field {
    pub const COUNT: usize = 8;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Id,
        Field::Timestamp,
        Field::EntityName,
        Field::Category,
        Field::Amount,
        Field::Quantity,
        Field::CustomerId,
        Field::DaysUntilExpiry,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Timestamp => "timestamp",
            Field::EntityName => "entity_name",
            Field::Category => "category",
            Field::Amount => "amount",
            Field::Quantity => "quantity",
            Field::CustomerId => "customer_id",
            Field::DaysUntilExpiry => "days_until_expiry",
        }
    }

    /// Columns whose raw text is parsed into numbers or timestamps. Identifiers and names are
    /// kept verbatim so `007` and `7` stay distinct.
    pub fn is_typed(self) -> bool {
        matches!(
            self,
            Field::Timestamp | Field::Amount | Field::Quantity | Field::DaysUntilExpiry
        )
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Maps a source header to a field. Also accepts the headers used by the sales spreadsheet.
    pub fn from_header(header: &str) -> Option<Self> {
        let lower = header.trim().to_ascii_lowercase();
        let field = match lower.as_str() {
            "id" => Field::Id,
            "timestamp" | "venta_timestamp" => Field::Timestamp,
            "entity_name" | "nombre" => Field::EntityName,
            "category" | "categoria" => Field::Category,
            "amount" | "venta_total" => Field::Amount,
            "quantity" | "cantidad" => Field::Quantity,
            "customer_id" | "cliente_id" => Field::CustomerId,
            "days_until_expiry" | "diasparacaducar" => Field::DaysUntilExpiry,
            _ => return None,
        };
        Some(field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column-presence set, computed once when a dataset is ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Columns(u8);

impl Columns {
    pub fn empty() -> Self {
        Columns(0)
    }

    pub fn all() -> Self {
        Field::ALL.into_iter().collect()
    }

    pub fn with(mut self, field: Field) -> Self {
        self.insert(field);
        self
    }

    pub fn insert(&mut self, field: Field) {
        self.0 |= 1 << field.index();
    }

    pub fn contains(self, field: Field) -> bool {
        self.0 & (1 << field.index()) != 0
    }

    pub fn contains_any(self, fields: &[Field]) -> bool {
        fields.iter().any(|f| self.contains(*f))
    }

    pub fn missing(self, fields: &[Field]) -> Vec<Field> {
        fields.iter().copied().filter(|f| !self.contains(*f)).collect()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Present fields in canonical order.
    pub fn iter(self) -> impl Iterator<Item = Field> {
        Field::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(Field::as_str).collect()
    }
}

impl FromIterator<Field> for Columns {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut out = Columns::empty();
        for field in iter {
            out.insert(field);
        }
        out
    }
}

impl Serialize for Columns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.names())
    }
}

/// A raw cell as delivered by a data source, before any business coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    #[default]
    Null,
    Text(String),
    Number(f64),
    DateTime(NaiveDateTime),
}

const TIMESTAMP_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%d/%m/%Y"];

pub(crate) const DISPLAY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl Cell {
    /// Text cell; blank text is treated as missing.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.trim().is_empty() {
            Cell::Null
        } else {
            Cell::Text(s)
        }
    }

    /// Numeric cell; non-finite values are treated as missing.
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            Cell::Number(n)
        } else {
            Cell::Null
        }
    }

    /// Untyped text (e.g. a CSV field): numbers and timestamps are recognized, the rest stays text.
    pub fn infer(raw: &str) -> Self {
        let t = raw.trim();
        if t.is_empty() {
            return Cell::Null;
        }
        if let Ok(n) = t.parse::<f64>() {
            return Cell::number(n);
        }
        if let Some(ts) = parse_timestamp(t) {
            return Cell::DateTime(ts);
        }
        Cell::Text(t.to_string())
    }

    pub fn from_json(v: &serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Text(b.to_string()),
            Value::Number(n) => n.as_f64().map(Cell::number).unwrap_or(Cell::Null),
            Value::String(s) => Cell::text(s.as_str()),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Cell::Number(_))
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, Cell::DateTime(_))
    }

    /// Lenient numeric coercion; anything unparseable is `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) if n.is_finite() => Some(*n),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Whole numbers only; fractional values do not coerce.
    pub fn as_integer(&self) -> Option<i64> {
        self.as_number()
            .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
            .map(|n| n as i64)
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(ts) => Some(*ts),
            Cell::Text(s) => parse_timestamp(s),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(n) => Some(format_number(*n)),
            Cell::DateTime(ts) => Some(ts.format(DISPLAY_TIMESTAMP_FORMAT).to_string()),
        }
    }
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Integral values print without a fractional part ("42" rather than "42.0").
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
