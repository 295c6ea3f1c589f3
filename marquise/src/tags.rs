//! Tag sets and their wire serialization.
//!
//! A [`TagSet`] is the string key/value metadata attached to an observation.
//! Before a send, it's serialized into [`TagArrays`]: two parallel arrays of
//! NUL-terminated strings, each followed by a null terminator slot, plus the
//! pair count. An empty tag set serializes to absent arrays with a count of 0,
//! never to empty-but-present arrays.

use std::collections::{BTreeMap, HashMap};
use std::ffi::{c_char, CStr, CString};
use std::fmt;
use std::hash::BuildHasher;
use std::ptr;

use crate::error::{MarquiseError, Result};

/// String key/value metadata attached to an observation.
///
/// Names and values are coerced to strings on insertion. Inserting a name
/// that is already present replaces its value and keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    entries: Vec<(String, String)>,
}

impl TagSet {
    /// Create an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag, consuming and returning the set.
    pub fn with_tag(mut self, name: impl fmt::Display, value: impl fmt::Display) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a tag, returning the previous value for `name` if there was one.
    pub fn insert(&mut self, name: impl fmt::Display, value: impl fmt::Display) -> Option<String> {
        let name = name.to_string();
        let value = value.to_string();

        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Serialize into the parallel name/value arrays the backend expects.
    ///
    /// # Errors
    ///
    /// Returns [`MarquiseError::InvalidCall`] if a name or value contains an
    /// interior NUL byte, which the terminated arrays cannot represent.
    pub fn to_arrays(&self) -> Result<TagArrays> {
        if self.entries.is_empty() {
            return Ok(TagArrays::empty());
        }

        let mut names = Vec::with_capacity(self.entries.len());
        let mut values = Vec::with_capacity(self.entries.len());

        for (name, value) in &self.entries {
            names.push(to_c_string("name", name)?);
            values.push(to_c_string("value", value)?);
        }

        Ok(TagArrays {
            names: Some(TagList::new(names)),
            values: Some(TagList::new(values)),
        })
    }
}

fn to_c_string(part: &str, s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| MarquiseError::InvalidCall {
        message: format!("Invalid call to Marquise::report (tag {part} {s:?} contains a NUL byte)"),
    })
}

impl<K: fmt::Display, V: fmt::Display> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for (name, value) in iter {
            tags.insert(name, value);
        }
        tags
    }
}

impl<K: fmt::Display, V: fmt::Display, S: BuildHasher> From<HashMap<K, V, S>> for TagSet {
    fn from(map: HashMap<K, V, S>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: fmt::Display, V: fmt::Display> From<BTreeMap<K, V>> for TagSet {
    fn from(map: BTreeMap<K, V>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: fmt::Display, V: fmt::Display, const N: usize> From<[(K, V); N]> for TagSet {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// A null-terminated array of C strings.
///
/// Holds `len()` strings followed by one null pointer slot, so the pointer
/// array has `slots() == len() + 1` entries.
pub struct TagList {
    strings: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl TagList {
    fn new(strings: Vec<CString>) -> Self {
        // CString contents live on the heap, so these pointers stay valid
        // when `strings` is moved into the struct.
        let mut ptrs: Vec<*const c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(ptr::null());
        Self { strings, ptrs }
    }

    /// Number of strings, not counting the terminator.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Number of pointer slots, including the terminator.
    pub fn slots(&self) -> usize {
        self.ptrs.len()
    }

    /// The string at slot `index`, or `None` for the terminator or past the end.
    pub fn get(&self, index: usize) -> Option<&CStr> {
        self.strings.get(index).map(CString::as_c_str)
    }

    /// True if the final slot is the null terminator.
    pub fn is_terminated(&self) -> bool {
        self.ptrs.last().map_or(false, |p| p.is_null())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CStr> {
        self.strings.iter().map(CString::as_c_str)
    }

    /// Lossy UTF-8 copies of every string, in slot order.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect()
    }

    /// Pointer to the first slot of the terminated pointer array.
    ///
    /// Valid for as long as `self` is alive.
    pub fn as_ptr(&self) -> *const *const c_char {
        self.ptrs.as_ptr()
    }
}

impl fmt::Debug for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.strings.iter()).finish()
    }
}

/// Serialized form of a [`TagSet`]: parallel name and value arrays.
#[derive(Debug)]
pub struct TagArrays {
    names: Option<TagList>,
    values: Option<TagList>,
}

impl TagArrays {
    /// Absent arrays with a count of 0.
    pub fn empty() -> Self {
        Self {
            names: None,
            values: None,
        }
    }

    /// Number of name/value pairs.
    pub fn len(&self) -> usize {
        self.names.as_ref().map_or(0, TagList::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Option<&TagList> {
        self.names.as_ref()
    }

    pub fn values(&self) -> Option<&TagList> {
        self.values.as_ref()
    }

    /// Raw name array, or null when there are no tags.
    pub fn names_ptr(&self) -> *const *const c_char {
        self.names.as_ref().map_or(ptr::null(), TagList::as_ptr)
    }

    /// Raw value array, or null when there are no tags.
    pub fn values_ptr(&self) -> *const *const c_char {
        self.values.as_ref().map_or(ptr::null(), TagList::as_ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tags_serialize_to_absent_arrays() {
        let arrays = TagSet::new().to_arrays().unwrap();
        assert!(arrays.names().is_none());
        assert!(arrays.values().is_none());
        assert!(arrays.names_ptr().is_null());
        assert!(arrays.values_ptr().is_null());
        assert_eq!(arrays.len(), 0);
    }

    #[test]
    fn test_tags_serialize_to_parallel_terminated_arrays() {
        let tags = TagSet::new().with_tag("foo", "bar").with_tag("answer", 42);
        let arrays = tags.to_arrays().unwrap();

        assert_eq!(arrays.len(), 2);

        let names = arrays.names().unwrap();
        let values = arrays.values().unwrap();
        assert_eq!(names.slots(), 3);
        assert_eq!(values.slots(), 3);
        assert!(names.is_terminated());
        assert!(values.is_terminated());
        assert_eq!(names.to_strings(), ["foo", "answer"]);
        assert_eq!(values.to_strings(), ["bar", "42"]);
        assert!(names.get(2).is_none());
    }

    #[test]
    fn test_raw_pointer_arrays_end_in_null() {
        let tags = TagSet::new().with_tag("foo", "bar");
        let arrays = tags.to_arrays().unwrap();

        let ptr = arrays.names_ptr();
        assert!(!ptr.is_null());
        // SAFETY: the array has two slots and `arrays` outlives both reads.
        unsafe {
            let first = CStr::from_ptr(*ptr);
            assert_eq!(first.to_str().unwrap(), "foo");
            assert!((*ptr.add(1)).is_null());
        }
    }

    #[test]
    fn test_insert_replaces_existing_value_in_place() {
        let mut tags = TagSet::new().with_tag("a", 1).with_tag("b", 2);
        assert_eq!(tags.insert("a", 3), Some("1".to_string()));

        let pairs: Vec<_> = tags.iter().collect();
        assert_eq!(pairs, [("a", "3"), ("b", "2")]);
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let tags = TagSet::new().with_tag("bad\0name", "x");
        let err = tags.to_arrays().unwrap_err();
        assert!(matches!(err, MarquiseError::InvalidCall { .. }));
    }

    #[test]
    fn test_from_maps_and_arrays() {
        let mut map = HashMap::new();
        map.insert("host", "db1");
        let tags = TagSet::from(map);
        assert_eq!(tags.get("host"), Some("db1"));

        let tags = TagSet::from([("foo", "bar"), ("answer", "42")]);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("answer"), Some("42"));

        let tags: TagSet = BTreeMap::from([("z", 1), ("a", 2)]).into();
        let names: Vec<_> = tags.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "z"]);
    }
}
