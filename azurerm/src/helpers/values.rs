//! Reading configuration objects and building state objects
//!
//! Config values arrive as [`Dynamic`] maps. Null and unknown attributes read
//! as absent, which is what expand functions want: an absent optional field
//! is left out of the request.

use std::collections::HashMap;
use tfplug::validator::is_integer;
use tfplug::Dynamic;

/// Flattened attributes of one object, ready to become state
pub type Attributes = HashMap<String, Dynamic>;

pub fn string(obj: &Dynamic, name: &str) -> Option<String> {
    obj.attr(name).and_then(Dynamic::as_str).map(str::to_string)
}

/// Like [`string`] but treats `""` as absent
pub fn non_empty_string(obj: &Dynamic, name: &str) -> Option<String> {
    string(obj, name).filter(|s| !s.is_empty())
}

pub fn bool(obj: &Dynamic, name: &str) -> Option<bool> {
    obj.attr(name).and_then(Dynamic::as_bool)
}

/// Whole-number attribute; fractions read as absent, since
/// [`IntegerValidator`](tfplug::validator::IntegerValidator) rejects them before any request is built
pub fn int(obj: &Dynamic, name: &str) -> Option<i64> {
    obj.attr(name)
        .and_then(Dynamic::as_number)
        .filter(|n| is_integer(*n))
        .map(|n| n as i64)
}

pub fn list<'a>(obj: &'a Dynamic, name: &str) -> &'a [Dynamic] {
    obj.attr(name)
        .and_then(Dynamic::as_list)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Known string elements of a list or set attribute
pub fn string_list(obj: &Dynamic, name: &str) -> Vec<String> {
    list(obj, name)
        .iter()
        .filter_map(Dynamic::as_str)
        .map(str::to_string)
        .collect()
}

/// Known string values of a map attribute
pub fn string_map(obj: &Dynamic, name: &str) -> HashMap<String, String> {
    obj.attr(name)
        .and_then(Dynamic::as_map)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// First element of a `max_items = 1` list block
pub fn single_block<'a>(obj: &'a Dynamic, name: &str) -> Option<&'a Dynamic> {
    list(obj, name).first().filter(|b| b.as_map().is_some())
}

pub fn strings_to_dynamic<I, S>(values: I) -> Dynamic
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Dynamic::List(values.into_iter().map(|s| Dynamic::String(s.into())).collect())
}

pub fn string_map_to_dynamic(values: &HashMap<String, String>) -> Dynamic {
    Dynamic::Map(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Dynamic::String(v.clone())))
            .collect(),
    )
}

/// Flattened form of an optional nested block: one element or none
pub fn block_list(block: Option<Attributes>) -> Dynamic {
    Dynamic::List(block.map(Dynamic::Map).into_iter().collect())
}

pub fn opt_string(value: Option<&String>) -> Dynamic {
    Dynamic::String(value.cloned().unwrap_or_default())
}

pub fn opt_bool(value: Option<bool>) -> Dynamic {
    Dynamic::Bool(value.unwrap_or(false))
}

pub fn opt_int(value: Option<i64>) -> Dynamic {
    Dynamic::Number(value.unwrap_or(0) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(pairs: Vec<(&str, Dynamic)>) -> Dynamic {
        Dynamic::Map(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn null_and_unknown_read_as_absent() {
        let obj = object(vec![
            ("a", Dynamic::Null),
            ("b", Dynamic::Unknown),
            ("c", Dynamic::String(String::new())),
        ]);
        assert_eq!(string(&obj, "a"), None);
        assert_eq!(string(&obj, "b"), None);
        assert_eq!(string(&obj, "c").as_deref(), Some(""));
        assert_eq!(non_empty_string(&obj, "c"), None);
        assert_eq!(string(&obj, "missing"), None);
    }

    #[test]
    fn collections_skip_unknown_elements() {
        let obj = object(vec![
            (
                "list",
                Dynamic::List(vec!["x".into(), Dynamic::Unknown, "y".into()]),
            ),
            (
                "map",
                Dynamic::Map(HashMap::from([
                    ("k".to_string(), "v".into()),
                    ("u".to_string(), Dynamic::Unknown),
                ])),
            ),
        ]);
        assert_eq!(string_list(&obj, "list"), vec!["x", "y"]);
        assert_eq!(string_map(&obj, "map"), HashMap::from([("k".into(), "v".into())]));
    }

    #[test]
    fn fractional_numbers_are_not_integers() {
        let obj = object(vec![
            ("whole", Dynamic::Number(400.0)),
            ("fraction", Dynamic::Number(400.5)),
            ("huge", Dynamic::Number(1e300)),
        ]);
        assert_eq!(int(&obj, "whole"), Some(400));
        assert_eq!(int(&obj, "fraction"), None);
        assert_eq!(int(&obj, "huge"), None);
    }

    #[test]
    fn zero_values_for_absent_pointers() {
        assert_eq!(opt_string(None), Dynamic::String(String::new()));
        assert_eq!(opt_bool(None), Dynamic::Bool(false));
        assert_eq!(opt_int(None), Dynamic::Number(0.0));
        assert_eq!(block_list(None), Dynamic::List(vec![]));
    }
}
