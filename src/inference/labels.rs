//! Class label table
//!
//! Labels normally come from the `names` entry of the model's metadata. A
//! label file, when configured, takes precedence.
//!
//! Accepted formats:
//! - plain text, one label per line (blank lines ignored)
//! - JSON array `["Apple___Apple_scab", ...]`
//! - JSON object `{"0": "Apple___Apple_scab", ...}`
//! - ultralytics `names` mapping `{0: 'Apple___Apple_scab', 1: ...}`

use std::collections::BTreeMap;
use std::path::Path;

use super::InferenceError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn from_file(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| InferenceError::Labels(format!("{}: {}", path.display(), e)))?;
        let table = Self::parse(&raw)?;

        tracing::info!("Loaded {} class labels from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn parse(raw: &str) -> Result<Self, InferenceError> {
        let trimmed = raw.trim();

        let table = if trimmed.starts_with('[') {
            let labels: Vec<String> = serde_json::from_str(trimmed)
                .map_err(|e| InferenceError::Labels(e.to_string()))?;
            Self::new(labels)
        } else if trimmed.starts_with('{') {
            let indexed = match serde_json::from_str::<BTreeMap<String, String>>(trimmed) {
                Ok(map) => map
                    .into_iter()
                    .map(|(k, v)| {
                        k.trim()
                            .parse::<usize>()
                            .map(|i| (i, v))
                            .map_err(|_| InferenceError::Labels(format!("bad class index '{}'", k)))
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()?,
                Err(_) => parse_names_mapping(trimmed)?,
            };
            Self::from_indexed(indexed)?
        } else {
            Self::new(
                trimmed
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(String::from)
                    .collect(),
            )
        };

        if table.is_empty() {
            return Err(InferenceError::Labels("no labels found".to_string()));
        }
        Ok(table)
    }

    /// Indices must cover 0..n without gaps
    fn from_indexed(indexed: BTreeMap<usize, String>) -> Result<Self, InferenceError> {
        let mut labels = Vec::with_capacity(indexed.len());
        for (expected, (index, label)) in indexed.into_iter().enumerate() {
            if index != expected {
                return Err(InferenceError::Labels(format!("missing label for class {}", expected)));
            }
            labels.push(label);
        }
        Ok(Self::new(labels))
    }

    pub fn get(&self, class_index: usize) -> Option<&str> {
        self.labels.get(class_index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Label file override first, then the names embedded in the model
pub fn select_labels(
    override_table: Option<LabelTable>,
    embedded_names: Option<&str>,
) -> Result<LabelTable, InferenceError> {
    if let Some(table) = override_table {
        return Ok(table);
    }

    match embedded_names {
        Some(raw) => {
            let table = LabelTable::parse(raw)?;
            tracing::info!("Using {} class labels from model metadata", table.len());
            Ok(table)
        }
        None => Err(InferenceError::Labels(
            "model has no 'names' metadata; set LABELS_PATH".to_string(),
        )),
    }
}

/// Parse `{0: 'a', 1: "b"}` as written by ultralytics model exports
fn parse_names_mapping(raw: &str) -> Result<BTreeMap<usize, String>, InferenceError> {
    let bad = |msg: &str| InferenceError::Labels(format!("names mapping: {}", msg));

    let body = raw
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| bad("expected braces"))?;

    let mut chars = body.chars().peekable();
    let mut out = BTreeMap::new();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut digits = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
            digits.push(c);
        }
        let index: usize = digits.parse().map_err(|_| bad("expected class index"))?;

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some(':') {
            return Err(bad("expected ':'"));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let quote = match chars.next() {
            Some(q @ ('\'' | '"')) => q,
            _ => return Err(bad("expected quoted label")),
        };

        let mut label = String::new();
        loop {
            match chars.next() {
                Some('\\') => match chars.next() {
                    Some(c) => label.push(c),
                    None => return Err(bad("dangling escape")),
                },
                Some(c) if c == quote => break,
                Some(c) => label.push(c),
                None => return Err(bad("unterminated label")),
            }
        }

        if out.insert(index, label).is_some() {
            return Err(bad(&format!("duplicate class {}", index)));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines() {
        let t = LabelTable::parse("Apple___Apple_scab\n\n  Tomato___Late_blight \nHealthy\n").unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(1), Some("Tomato___Late_blight"));
        assert_eq!(t.get(3), None);
    }

    #[test]
    fn test_json_forms() {
        let t = LabelTable::parse(r#"["a___b", "c"]"#).unwrap();
        assert_eq!(t.get(0), Some("a___b"));

        let t = LabelTable::parse(r#"{"1": "c", "0": "a___b"}"#).unwrap();
        assert_eq!(t.get(0), Some("a___b"));
        assert_eq!(t.get(1), Some("c"));
    }

    #[test]
    fn test_ultralytics_names() {
        let raw = "{0: 'Apple___Apple_scab', 1: 'Pepper,_bell___Bacterial_spot', 2: \"Grape___Esca_(Black_Measles)\"}";
        let t = LabelTable::parse(raw).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(1), Some("Pepper,_bell___Bacterial_spot"));
        assert_eq!(t.get(2), Some("Grape___Esca_(Black_Measles)"));
    }

    #[test]
    fn test_gaps_and_garbage_rejected() {
        assert!(LabelTable::parse(r#"{"0": "a", "2": "c"}"#).is_err());
        assert!(LabelTable::parse("{0: 'a', 0: 'b'}").is_err());
        assert!(LabelTable::parse("{0: 'unterminated}").is_err());
        assert!(LabelTable::parse("   \n ").is_err());
    }

    #[test]
    fn test_select_prefers_override() {
        let file = LabelTable::new(vec!["Tomato___Leaf_Mold".to_string()]);
        let table = select_labels(Some(file.clone()), Some("{0: 'Apple___Apple_scab'}")).unwrap();
        assert_eq!(table, file);
    }

    #[test]
    fn test_select_falls_back_to_model_names() {
        let table = select_labels(None, Some("{0: 'Apple___Apple_scab', 1: 'Tomato___Late_blight'}")).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some("Tomato___Late_blight"));

        assert!(matches!(select_labels(None, None), Err(InferenceError::Labels(_))));
        assert!(matches!(select_labels(None, Some("{}")), Err(InferenceError::Labels(_))));
    }
}
