//! Sensor records and the run label attached to them.
//!
//! The sensor emits one reading per line as `timestamp,x,y,z`. Values are kept
//! as opaque strings; the storage layer is responsible for any coercion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of comma-separated fields in a valid line.
pub const FIELD_COUNT: usize = 4;

/// Label used when the operator does not name the current job.
pub const DEFAULT_RUN_LABEL: &str = "N/A";

/// A parsed, four-field sensor reading prior to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Device timestamp, as sent.
    pub timestamp: String,
    /// X-axis reading.
    pub x: String,
    /// Y-axis reading.
    pub y: String,
    /// Z-axis reading.
    pub z: String,
}

/// Parse one framed line into a [`Record`].
///
/// Returns `None` unless the line splits into exactly four comma-separated
/// fields. Fields are mapped positionally (`timestamp, x, y, z`) without
/// trimming or numeric validation.
pub fn parse(line: &str) -> Option<Record> {
    let mut fields = line.split(',');
    let timestamp = fields.next()?;
    let x = fields.next()?;
    let y = fields.next()?;
    let z = fields.next()?;
    if fields.next().is_some() {
        return None;
    }

    Some(Record {
        timestamp: timestamp.to_string(),
        x: x.to_string(),
        y: y.to_string(),
        z: z.to_string(),
    })
}

/// Free-text identifier attached to every row persisted during one run.
///
/// Cloning is cheap: persistence tasks each carry their own handle to the
/// same immutable string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunLabel(Arc<str>);

impl RunLabel {
    /// Create a label from any string-like value.
    pub fn new(label: impl Into<Arc<str>>) -> Self {
        Self(label.into())
    }

    /// Borrow the label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunLabel {
    fn default() -> Self {
        Self::new(DEFAULT_RUN_LABEL)
    }
}

impl From<String> for RunLabel {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for RunLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for RunLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The row shape written to the `readings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredReading {
    pub x: String,
    pub y: String,
    pub z: String,
    pub time: String,
    /// Stored in the `print` column.
    pub print_label: String,
}

impl StoredReading {
    /// Build the row for `record` tagged with `label`.
    pub fn new(record: &Record, label: &RunLabel) -> Self {
        Self {
            x: record.x.clone(),
            y: record.y.clone(),
            z: record.z.clone(),
            time: record.timestamp.clone(),
            print_label: label.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_fields_positionally() {
        let record = parse("12:00:01,1.5,2.5,3.5").unwrap();
        assert_eq!(record.timestamp, "12:00:01");
        assert_eq!(record.x, "1.5");
        assert_eq!(record.y, "2.5");
        assert_eq!(record.z, "3.5");
    }

    #[test]
    fn rejects_wrong_field_counts() {
        for line in [
            "",
            "1",
            "bad,data",
            "1,2,3",
            "1,2,3,4,5",
            "1,2,3,4,5,6,7",
            ",1,2,3,4",
            "1,2,3,4,",
        ] {
            assert_eq!(parse(line), None, "line {:?} should be rejected", line);
        }
    }

    #[test]
    fn empty_fields_still_count() {
        let record = parse(",,,").unwrap();
        assert_eq!(record.timestamp, "");
        assert_eq!(record.z, "");
    }

    #[test]
    fn passes_values_through_untouched() {
        let record = parse(" 100 ,abc,-0.0e3,\u{fffd}z").unwrap();
        assert_eq!(record.timestamp, " 100 ");
        assert_eq!(record.x, "abc");
        assert_eq!(record.y, "-0.0e3");
        assert_eq!(record.z, "\u{fffd}z");
    }

    #[test]
    fn run_label_defaults_to_not_applicable() {
        assert_eq!(RunLabel::default().as_str(), "N/A");
        assert_eq!(RunLabel::from("partA").to_string(), "partA");
    }

    #[test]
    fn stored_reading_carries_label_and_time() {
        let record = parse("12:00:01,1.5,2.5,3.5").unwrap();
        let row = StoredReading::new(&record, &RunLabel::from("partA"));
        assert_eq!(
            row,
            StoredReading {
                x: "1.5".into(),
                y: "2.5".into(),
                z: "3.5".into(),
                time: "12:00:01".into(),
                print_label: "partA".into(),
            }
        );
    }
}
