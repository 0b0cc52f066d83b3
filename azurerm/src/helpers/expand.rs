//! Conversions shared by expand and flatten functions

use std::collections::HashMap;

/// `{"X-Key": "a,b"}` in config becomes `{"X-Key": ["a", "b"]}` on the wire
pub fn comma_separated_map(input: &HashMap<String, String>) -> HashMap<String, Vec<String>> {
    input
        .iter()
        .map(|(k, v)| (k.clone(), v.split(',').map(str::to_string).collect()))
        .collect()
}

pub fn join_comma_separated_map(input: Option<&HashMap<String, Vec<String>>>) -> HashMap<String, String> {
    input
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.join(","))).collect())
        .unwrap_or_default()
}

/// `None` for an empty list so the field is left out of the request
pub fn optional_list<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Case-insensitive ID comparison, since ARM does not preserve casing
pub fn ids_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_maps_split_and_join() {
        let config = HashMap::from([("x-header".to_string(), "a,b".to_string())]);
        let wire = comma_separated_map(&config);
        assert_eq!(wire["x-header"], vec!["a", "b"]);
        assert_eq!(join_comma_separated_map(Some(&wire)), config);
        assert!(join_comma_separated_map(None).is_empty());
    }

    #[test]
    fn empty_lists_are_omitted() {
        assert_eq!(optional_list::<String>(vec![]), None);
        assert_eq!(optional_list(vec![1]), Some(vec![1]));
    }
}
