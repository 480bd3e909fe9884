//! Vehicle record schema and merge key

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Placeholder for optional fields that could not be determined
pub const UNKNOWN: &str = "?";

/// Output schema, in column order. Every record carries every column.
pub const COLUMNS: [&str; 31] = [
    columns::YEAR,
    columns::MAKE,
    columns::MODEL,
    columns::VARIANT,
    "Body Type",
    "No. of Seats",
    "Build Date",
    "Compliance Date",
    columns::VIN,
    "Registration No",
    "Registration State",
    columns::REGISTRATION_EXPIRY,
    "No. of Plates",
    "No. of Cylinders",
    "Engine Capacity",
    "Fuel Type",
    "Transmission",
    "Indicated Odometer Reading",
    "Odometer Measurement",
    "Exterior Colour",
    "Interior Colour",
    "Key",
    "Spare Key",
    "Owners Manual",
    "Service History",
    "Engine Turns Over",
    columns::LOCATION,
    columns::DATE,
    columns::BIDS,
    columns::PRICE,
    columns::URL,
];

/// Column names the pipeline reads or writes directly
pub mod columns {
    pub const YEAR: &str = "year";
    pub const MAKE: &str = "make";
    pub const MODEL: &str = "model";
    pub const VARIANT: &str = "variant";
    pub const VIN: &str = "VIN";
    pub const REGISTRATION_EXPIRY: &str = "Registration Expiry Date";
    pub const LOCATION: &str = "Location";
    pub const DATE: &str = "date";
    pub const BIDS: &str = "bids";
    pub const PRICE: &str = "price";
    pub const URL: &str = "url";
}

/// One cell of a vehicle record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Number(f64),
    /// Field is known to have no value (empty cell, JSON `null`)
    Null,
    /// Field could not be determined from the page (`"?"`)
    Unknown,
}

impl FieldValue {
    /// Text cell; `"?"` is unknown and empty text is null, matching how a
    /// delimited cell reads back
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        match value.as_str() {
            UNKNOWN => Self::Unknown,
            "" => Self::Null,
            _ => Self::Text(value),
        }
    }

    /// Text rendering used for merge keys: null is empty, unknown is `"?"`
    pub fn key_text(&self) -> String {
        match self {
            Self::Text(value) => value.clone(),
            Self::Integer(value) => value.to_string(),
            Self::Number(value) => format_number(*value),
            Self::Null => String::new(),
            Self::Unknown => UNKNOWN.to_string(),
        }
    }

    /// Cell rendering for the delimited form
    pub fn to_csv_cell(&self) -> String {
        self.key_text()
    }

    /// Type a delimited cell back according to its column
    pub fn from_csv_cell(column: &str, raw: &str) -> Self {
        match raw {
            "" => return Self::Null,
            UNKNOWN => return Self::Unknown,
            _ => {}
        }

        match column {
            columns::YEAR | columns::BIDS => raw
                .parse::<i64>()
                .map(Self::Integer)
                .or_else(|_| raw.parse::<f64>().map(|v| Self::Integer(v as i64)))
                .unwrap_or_else(|_| Self::Text(raw.to_string())),
            columns::PRICE => raw
                .parse::<f64>()
                .map(Self::Number)
                .unwrap_or_else(|_| Self::Text(raw.to_string())),
            _ => Self::Text(raw.to_string()),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(value) => serializer.serialize_str(value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Number(value) => serializer.serialize_f64(*value),
            Self::Null => serializer.serialize_none(),
            Self::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

/// Deduplication key of a record: (VIN, close date)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeKey {
    pub vin: String,
    pub date: String,
}

impl MergeKey {
    pub fn new(vin: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            vin: vin.into(),
            date: date.into(),
        }
    }
}

/// A vehicle projected onto [`COLUMNS`].
///
/// Values are stored positionally, so a record cannot be missing a column or
/// carry one outside the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    values: Vec<FieldValue>,
}

impl Default for VehicleRecord {
    fn default() -> Self {
        Self {
            values: vec![FieldValue::Unknown; COLUMNS.len()],
        }
    }
}

impl VehicleRecord {
    /// Project arbitrary named fields onto the schema.
    ///
    /// Names outside the schema are dropped, absent ones stay unknown and a
    /// later duplicate name wins.
    pub fn from_fields<K, I>(fields: I) -> Self
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, FieldValue)>,
    {
        let mut record = Self::default();
        for (name, value) in fields {
            record.set(name.as_ref(), value);
        }
        record
    }

    /// Builder-style assignment used before a record enters a dataset
    #[must_use]
    pub fn with_field(mut self, column: &str, value: FieldValue) -> Self {
        self.set(column, value);
        self
    }

    fn set(&mut self, column: &str, value: FieldValue) -> bool {
        match COLUMNS.iter().position(|c| *c == column) {
            Some(index) => {
                self.values[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|index| &self.values[index])
    }

    /// Columns paired with their values, in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        COLUMNS.iter().copied().zip(self.values.iter())
    }

    pub fn merge_key(&self) -> MergeKey {
        let text = |column| {
            self.get(column)
                .map(FieldValue::key_text)
                .unwrap_or_default()
        };
        MergeKey::new(text(columns::VIN), text(columns::DATE))
    }
}

impl Serialize for VehicleRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(COLUMNS.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn projection_fills_every_column() {
        let record = VehicleRecord::from_fields([
            ("make", FieldValue::text("Toyota")),
            ("Not In Schema", FieldValue::text("dropped")),
        ]);

        assert_eq!(record.iter().count(), COLUMNS.len());
        assert_eq!(record.get("make"), Some(&FieldValue::text("Toyota")));
        assert_eq!(record.get("Fuel Type"), Some(&FieldValue::Unknown));
        assert_eq!(record.get("Not In Schema"), None);
    }

    #[test]
    fn text_constructor_maps_sentinels() {
        assert_eq!(FieldValue::text("?"), FieldValue::Unknown);
        assert_eq!(FieldValue::text("Petrol"), FieldValue::Text("Petrol".into()));
        assert_eq!(FieldValue::text(""), FieldValue::Null);
    }

    #[test]
    fn merge_key_renders_null_as_empty_and_unknown_as_sentinel() {
        let record = VehicleRecord::from_fields([
            (columns::VIN, FieldValue::Unknown),
            (columns::DATE, FieldValue::Null),
        ]);

        assert_eq!(record.merge_key(), MergeKey::new("?", ""));
    }

    #[rstest]
    #[case("year", "2019", FieldValue::Integer(2019))]
    #[case("year", "2019.0", FieldValue::Integer(2019))]
    #[case("bids", "", FieldValue::Null)]
    #[case("price", "12345.0", FieldValue::Number(12345.0))]
    #[case("VIN", "?", FieldValue::Unknown)]
    #[case("VIN", "JTNB", FieldValue::Text("JTNB".into()))]
    fn csv_cells_are_typed_by_column(
        #[case] column: &str,
        #[case] raw: &str,
        #[case] expected: FieldValue,
    ) {
        assert_eq!(FieldValue::from_csv_cell(column, raw), expected);
    }

    #[test]
    fn whole_prices_keep_a_decimal_in_csv() {
        assert_eq!(FieldValue::Number(12345.0).to_csv_cell(), "12345.0");
        assert_eq!(FieldValue::Number(99.5).to_csv_cell(), "99.5");
    }

    #[test]
    fn json_keeps_schema_order_and_types() {
        let record = VehicleRecord::from_fields([
            (columns::YEAR, FieldValue::Integer(2019)),
            (columns::BIDS, FieldValue::Null),
            (columns::PRICE, FieldValue::Number(12345.0)),
        ]);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.starts_with(r#"{"year":2019,"make":"?""#));
        assert!(json.contains(r#""bids":null,"price":12345.0"#));
    }
}
