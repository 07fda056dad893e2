//! Lookup-with-default table

use std::collections::HashMap;

/// Immutable disease name → advisory text mapping with a fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryTable {
    default: String,
    entries: HashMap<String, String>,
}

impl AdvisoryTable {
    pub fn new<I, K, V>(default: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            default: default.into(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Advisory for `disease`, or the table default. Never fails.
    pub fn lookup(&self, disease: &str) -> &str {
        self.entries
            .get(disease)
            .map(String::as_str)
            .unwrap_or(&self.default)
    }

    pub fn default_advice(&self) -> &str {
        &self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AdvisoryTable {
        AdvisoryTable::new("Consult local expert", [
            ("Late_blight", "Use Mancozeb spray every 7 days"),
            ("Early_blight", "Apply Chlorothalonil fungicide"),
        ])
    }

    #[test]
    fn test_known_keys_return_configured_value() {
        let t = table();
        assert_eq!(t.lookup("Late_blight"), "Use Mancozeb spray every 7 days");
        assert_eq!(t.lookup("Early_blight"), "Apply Chlorothalonil fungicide");
    }

    #[test]
    fn test_unknown_keys_return_default() {
        let t = table();
        for disease in ["Healthy", "Prediction failed", "", "late_blight", "Late_blight "] {
            assert_eq!(t.lookup(disease), "Consult local expert");
        }
    }

    #[test]
    fn test_empty_table() {
        let t = AdvisoryTable::new("fallback", Vec::<(String, String)>::new());
        assert_eq!(t.lookup("anything"), "fallback");
        assert_eq!(t.lookup(""), "fallback");
    }
}
