//! Default-value injection.

use crate::convert::RecordStage;
use crate::error::Result;
use crate::value::Record;

/// Fill absent or empty fields of `record` from `defaults`.
///
/// Fields that already hold a non-empty value are left untouched. Applying the
/// same defaults twice gives the same record as applying them once.
pub fn merge_defaults(record: &mut Record, defaults: &Record) {
    for (field, default) in defaults {
        let fill = record.get(field).is_none_or(|current| current.is_empty());
        if fill {
            record.insert(field.as_str(), default.clone());
        }
    }
}

/// Pipeline stage merging a fixed set of default values into every record
#[derive(Debug, Clone, Default)]
pub struct DefaultValues {
    defaults: Record,
}

impl DefaultValues {
    #[must_use]
    pub const fn new(defaults: Record) -> Self {
        Self { defaults }
    }

    #[must_use]
    pub const fn defaults(&self) -> &Record {
        &self.defaults
    }
}

impl RecordStage for DefaultValues {
    fn name(&self) -> &str {
        "defaults"
    }

    fn apply(&self, mut record: Record) -> Result<Record> {
        merge_defaults(&mut record, &self.defaults);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_fills_absent_and_empty() {
        let defaults = Record::new().with("status", "pending").with("country", "DK");
        let mut record = Record::new()
            .with("email", "a@x.com")
            .with("status", "")
            .with("country", "SE");

        merge_defaults(&mut record, &defaults);

        assert_eq!(record.get("status"), Some(&Value::from("pending")));
        assert_eq!(record.get("country"), Some(&Value::from("SE")));
        assert_eq!(record.keys().collect::<Vec<_>>(), ["email", "status", "country"]);
    }

    #[test]
    fn test_zero_and_false_are_kept() {
        let defaults = Record::new().with("count", 5_i64).with("active", true);
        let mut record = Record::new().with("count", 0_i64).with("active", false);
        merge_defaults(&mut record, &defaults);
        assert_eq!(record.get("count"), Some(&Value::Int(0)));
        assert_eq!(record.get("active"), Some(&Value::Bool(false)));
    }
}
