//! Per-object attribute store
//!
//! Components and relations carry an [`AttribStore`]: a string-keyed map of
//! heterogeneous values. Readers know out of band which shape belongs to a
//! key; the typed getters return `None` when the stored shape differs.
//! Values the core has no variant for go into [`AttribValue::Opaque`], which
//! carries its own (optional) XML handler.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::xml::XmlElement;

/// Extension value stored behind [`AttribValue::Opaque`].
pub trait OpaqueAttrib: fmt::Debug {
    fn as_any(&self) -> &dyn Any;

    /// Build the `<Attribute name="key">` element for this value.
    ///
    /// Returning `None` leaves the value to the caller-supplied writers; if
    /// none of them handles it, the value is not exported.
    fn to_xml(&self, _key: &str) -> Option<XmlElement> {
        None
    }
}

/// A single attribute value.
#[derive(Debug)]
pub enum AttribValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    /// A scalar with its unit, e.g. a clock rate.
    Quantity { value: f64, unit: String },
    /// `(timestamp, value)` samples, e.g. a frequency history.
    TimeSeries(Vec<(i64, f64)>),
    Opaque(Box<dyn OpaqueAttrib>),
}

impl AttribValue {
    pub fn opaque<T: OpaqueAttrib + 'static>(value: T) -> Self {
        AttribValue::Opaque(Box::new(value))
    }

    /// Short tag used in log output.
    pub fn kind_str(&self) -> &'static str {
        match self {
            AttribValue::Int(_) => "int",
            AttribValue::UInt(_) => "uint",
            AttribValue::Float(_) => "float",
            AttribValue::Text(_) => "text",
            AttribValue::Quantity { .. } => "quantity",
            AttribValue::TimeSeries(_) => "time-series",
            AttribValue::Opaque(_) => "opaque",
        }
    }
}

// Opaque values never compare equal: the store cannot see inside them.
impl PartialEq for AttribValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AttribValue::Int(a), AttribValue::Int(b)) => a == b,
            (AttribValue::UInt(a), AttribValue::UInt(b)) => a == b,
            (AttribValue::Float(a), AttribValue::Float(b)) => a == b,
            (AttribValue::Text(a), AttribValue::Text(b)) => a == b,
            (
                AttribValue::Quantity { value: a, unit: ua },
                AttribValue::Quantity { value: b, unit: ub },
            ) => a == b && ua == ub,
            (AttribValue::TimeSeries(a), AttribValue::TimeSeries(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for AttribValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttribValue::Int(v) => write!(f, "{}", v),
            AttribValue::UInt(v) => write!(f, "{}", v),
            AttribValue::Float(v) => write!(f, "{}", v),
            AttribValue::Text(v) => write!(f, "{}", v),
            AttribValue::Quantity { value, unit } => write!(f, "{} {}", value, unit),
            AttribValue::TimeSeries(samples) => write!(f, "[{} samples]", samples.len()),
            AttribValue::Opaque(v) => write!(f, "{:?}", v),
        }
    }
}

impl From<i64> for AttribValue {
    fn from(v: i64) -> Self {
        AttribValue::Int(v)
    }
}

impl From<i32> for AttribValue {
    fn from(v: i32) -> Self {
        AttribValue::Int(i64::from(v))
    }
}

impl From<u64> for AttribValue {
    fn from(v: u64) -> Self {
        AttribValue::UInt(v)
    }
}

impl From<f64> for AttribValue {
    fn from(v: f64) -> Self {
        AttribValue::Float(v)
    }
}

impl From<f32> for AttribValue {
    fn from(v: f32) -> Self {
        AttribValue::Float(f64::from(v))
    }
}

impl From<String> for AttribValue {
    fn from(v: String) -> Self {
        AttribValue::Text(v)
    }
}

impl From<&str> for AttribValue {
    fn from(v: &str) -> Self {
        AttribValue::Text(v.to_string())
    }
}

/// String-keyed attribute map owned by a component or relation.
#[derive(Debug, Default)]
pub struct AttribStore {
    values: BTreeMap<String, AttribValue>,
}

impl AttribStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the previous value for the key.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttribValue>,
    ) -> Option<AttribValue> {
        self.values.insert(key.into(), value.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&AttribValue> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut AttribValue> {
        self.values.get_mut(key)
    }

    /// Remove a value, dropping it.
    pub fn remove(&mut self, key: &str) -> Option<AttribValue> {
        self.values.remove(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            AttribValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.values.get(key)? {
            AttribValue::UInt(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            AttribValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            AttribValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn get_time_series(&self, key: &str) -> Option<&[(i64, f64)]> {
        match self.values.get(key)? {
            AttribValue::TimeSeries(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    /// Downcast an opaque value to its concrete type.
    pub fn get_opaque<T: 'static>(&self, key: &str) -> Option<&T> {
        match self.values.get(key)? {
            AttribValue::Opaque(v) => v.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttribValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct CoreInfo {
        temperature: f64,
    }

    impl OpaqueAttrib for CoreInfo {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_insert_overwrite_and_remove() {
        let mut store = AttribStore::new();
        assert!(store.insert("CATcos", 3u64).is_none());
        let old = store.insert("CATcos", 5u64);
        assert_eq!(old, Some(AttribValue::UInt(3)));
        assert_eq!(store.get_u64("CATcos"), Some(5));
        assert!(store.contains("CATcos"));

        assert_eq!(store.remove("CATcos"), Some(AttribValue::UInt(5)));
        assert!(!store.contains("CATcos"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_typed_reads_reject_other_shapes() {
        let mut store = AttribStore::new();
        store.insert("mig_uuid", "MIG-1234");
        store.insert("Clock_Frequency", 1.5e9);

        assert_eq!(store.get_str("mig_uuid"), Some("MIG-1234"));
        assert_eq!(store.get_u64("mig_uuid"), None);
        assert_eq!(store.get_f64("Clock_Frequency"), Some(1.5e9));
        assert_eq!(store.get_i64("Clock_Frequency"), None);
        assert_eq!(store.get_f64("missing"), None);
    }

    #[test]
    fn test_opaque_downcast() {
        let mut store = AttribStore::new();
        store.insert("my_core_info", AttribValue::opaque(CoreInfo { temperature: 38.2 }));

        let info = store.get_opaque::<CoreInfo>("my_core_info").unwrap();
        assert!((info.temperature - 38.2).abs() < f64::EPSILON);
        assert!(store.get_opaque::<String>("my_core_info").is_none());
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut store = AttribStore::new();
        store.insert("b", 1i64);
        store.insert("a", 2i64);
        store.insert("c", 3i64);
        let keys: Vec<_> = store.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
