//! Helpers over the loosely typed configuration tree.

use serde::{Deserialize, Deserializer};
use serde_yml::{Mapping, Value};

/// A single string or a list of strings.
pub fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

/// A sequence as is, anything else as a one element list.
pub fn to_list(value: Value) -> Vec<Value> {
    match value {
        Value::Sequence(values) => values,
        other => vec![other],
    }
}

/// Lower-cased and trimmed key, `None` for non string keys.
pub fn normalize_key(key: &Value) -> Option<String> {
    key.as_str().map(|key| key.trim().to_lowercase())
}

/// Same mapping with normalized keys.
pub fn normalize_keys(mapping: Mapping) -> Mapping {
    mapping
        .into_iter()
        .map(|(key, value)| match normalize_key(&key) {
            Some(key) => (Value::String(key), value),
            None => (key, value),
        })
        .collect()
}

/// Removes and returns the entries of `keys` found in `mapping`, keeping
/// the order of the remaining entries.
pub fn extract_keys(mapping: &mut Mapping, keys: &[&str]) -> Mapping {
    let (extracted, kept): (Mapping, Mapping) = std::mem::take(mapping)
        .into_iter()
        .partition(|(key, _)| key.as_str().is_some_and(|key| keys.contains(&key)));
    *mapping = kept;
    extracted
}

pub fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

/// Compact one line rendering used in error messages.
pub fn repr(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yml::from_str(text).unwrap()
    }

    #[test]
    fn test_one_or_many() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "one_or_many")]
            to: Vec<String>,
        }

        let one: Holder = serde_yml::from_str("to: a@b.c").unwrap();
        assert_eq!(one.to, vec!["a@b.c"]);
        let many: Holder = serde_yml::from_str("to: [a@b.c, d@e.f]").unwrap();
        assert_eq!(many.to, vec!["a@b.c", "d@e.f"]);
        assert!(serde_yml::from_str::<Holder>("to: {x: 1}").is_err());
    }

    #[test]
    fn test_to_list() {
        assert_eq!(to_list(yaml("[1, 2]")).len(), 2);
        assert_eq!(to_list(yaml("a")), vec![yaml("a")]);
    }

    #[test]
    fn test_normalize_and_extract_keys() {
        let mut mapping = normalize_keys(yaml("{ ' SSH_User ': bob, Files: /var/www }").as_mapping().unwrap().clone());
        assert_eq!(mapping.get("ssh_user"), Some(&yaml("bob")));

        let extracted = extract_keys(&mut mapping, &["files", "databases"]);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted.get("files"), Some(&yaml("/var/www")));
        assert!(!mapping.contains_key("files"));
    }

    #[test]
    fn test_repr() {
        assert_eq!(repr(&yaml("{a: [1, x]}")), r#"{"a":[1,"x"]}"#);
        assert!(is_scalar(&yaml("12")));
        assert!(!is_scalar(&yaml("[12]")));
    }
}
