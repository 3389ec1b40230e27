use serde_yml::Value;

/// Recursively merges `new` into `src`.
///
/// Null yields the other side, mappings union their keys, sequences
/// concatenate (or append a non sequence). A mapping merged with a sequence
/// gives the sequence followed by the mapping. Any other combination
/// becomes the pair `[src, new]`.
pub fn deep_merge(src: Value, new: Value) -> Value {
    match (src, new) {
        (src, Value::Null) => src,
        (Value::Null, new) => new,
        (Value::Sequence(mut src), Value::Sequence(new)) => {
            src.extend(new);
            Value::Sequence(src)
        }
        (Value::Sequence(mut src), new) => {
            src.push(new);
            Value::Sequence(src)
        }
        (Value::Mapping(src), Value::Sequence(mut new)) => {
            new.push(Value::Mapping(src));
            Value::Sequence(new)
        }
        (Value::Mapping(mut src), Value::Mapping(new)) => {
            for (key, value) in new {
                match src.get_mut(&key) {
                    Some(previous) => {
                        let taken = std::mem::replace(previous, Value::Null);
                        *previous = deep_merge(taken, value);
                    }
                    None => {
                        src.insert(key, value);
                    }
                }
            }
            Value::Mapping(src)
        }
        (src, new) => Value::Sequence(vec![src, new]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yml::from_str(text).unwrap()
    }

    #[test]
    fn test_mappings_union_recursively() {
        assert_eq!(
            deep_merge(yaml("{a: {x: 1}}"), yaml("{a: {y: 2}}")),
            yaml("{a: {x: 1, y: 2}}")
        );
    }

    #[test]
    fn test_sequences_concatenate() {
        assert_eq!(deep_merge(yaml("[1, 2]"), yaml("[3]")), yaml("[1, 2, 3]"));
        assert_eq!(deep_merge(yaml("[1, 2]"), yaml("3")), yaml("[1, 2, 3]"));
    }

    #[test]
    fn test_null_yields_other_side() {
        assert_eq!(deep_merge(Value::Null, yaml("{a: 1}")), yaml("{a: 1}"));
        assert_eq!(deep_merge(yaml("[1]"), Value::Null), yaml("[1]"));
    }

    #[test]
    fn test_mismatched_values_become_a_pair() {
        assert_eq!(deep_merge(yaml("a"), yaml("b")), yaml("[a, b]"));
        assert_eq!(deep_merge(yaml("{a: 1}"), yaml("b")), yaml("[{a: 1}, b]"));
        assert_eq!(deep_merge(yaml("{a: 1}"), yaml("[b]")), yaml("[b, {a: 1}]"));
        assert_eq!(deep_merge(yaml("{a: x}"), yaml("{a: y}")), yaml("{a: [x, y]}"));
    }

    #[test]
    fn test_key_order_is_kept() {
        let merged = deep_merge(yaml("{b: 1, a: 2}"), yaml("{c: 3, b: 4}"));
        let keys: Vec<_> = merged
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }
}
