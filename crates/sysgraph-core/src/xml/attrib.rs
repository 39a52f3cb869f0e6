//! Attribute export and import dispatch
//!
//! Each attribute goes through four handlers in order: the caller's scalar
//! hook, the built-in scalar table, the caller's structured hook and the
//! built-in structured table. The first handler that accepts the value wins;
//! values nobody accepts are dropped.

use tracing::debug;

use crate::attrib::{AttribStore, AttribValue};
use crate::xml::element::XmlElement;

pub const ATTRIBUTE_ELEMENT: &str = "Attribute";

/// Caller hook turning a value into the text of `<Attribute value="..">`.
pub type AttribStringifier<'a> = &'a dyn Fn(&str, &AttribValue) -> Option<String>;
/// Caller hook building a complete `<Attribute name="key">` element.
pub type AttribComplexWriter<'a> = &'a dyn Fn(&str, &AttribValue) -> Option<XmlElement>;
/// Caller hook reading the text of `<Attribute value="..">` for a key.
pub type AttribReader<'a> = &'a dyn Fn(&str, &str) -> Option<AttribValue>;
/// Caller hook reading a whole `<Attribute>` element.
pub type AttribComplexReader<'a> = &'a dyn Fn(&XmlElement) -> Option<AttribValue>;

/// Export-side extension hooks. Unset hooks are skipped.
#[derive(Default, Clone, Copy)]
pub struct ExportHooks<'a> {
    pub stringifier: Option<AttribStringifier<'a>>,
    pub complex_writer: Option<AttribComplexWriter<'a>>,
}

/// Import-side extension hooks. Unset hooks are skipped.
#[derive(Default, Clone, Copy)]
pub struct ImportHooks<'a> {
    pub reader: Option<AttribReader<'a>>,
    pub complex_reader: Option<AttribComplexReader<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarShape {
    UInt,
    Int,
    Float,
    Text,
}

fn builtin_scalar_shape(key: &str) -> Option<ScalarShape> {
    match key {
        "CATcos" | "CATL3mask" => Some(ScalarShape::UInt),
        "mig_size"
        | "Number_of_streaming_multiprocessors"
        | "Number_of_cores_in_GPU"
        | "Number_of_cores_per_SM"
        | "Bus_Width_bit" => Some(ScalarShape::Int),
        "Clock_Frequency" | "latency" | "latency_min" | "latency_max" => Some(ScalarShape::Float),
        "CUDA_compute_capability" | "mig_uuid" => Some(ScalarShape::Text),
        _ => None,
    }
}

fn builtin_scalar_to_string(key: &str, value: &AttribValue) -> Option<String> {
    let shape = builtin_scalar_shape(key)?;
    match (shape, value) {
        (ScalarShape::UInt, AttribValue::UInt(v)) => Some(v.to_string()),
        (ScalarShape::UInt, AttribValue::Int(v)) if *v >= 0 => Some(v.to_string()),
        (ScalarShape::Int, AttribValue::Int(v)) => Some(v.to_string()),
        (ScalarShape::Int, AttribValue::UInt(v)) => Some(v.to_string()),
        (ScalarShape::Float, AttribValue::Float(v)) => Some(v.to_string()),
        (ScalarShape::Float, AttribValue::Int(v)) => Some(v.to_string()),
        (ScalarShape::Text, AttribValue::Text(v)) => Some(v.clone()),
        _ => None,
    }
}

fn builtin_scalar_from_str(key: &str, text: &str) -> Option<AttribValue> {
    let text = text.trim();
    match builtin_scalar_shape(key)? {
        ScalarShape::UInt => text.parse().ok().map(AttribValue::UInt),
        ScalarShape::Int => text.parse().ok().map(AttribValue::Int),
        ScalarShape::Float => text.parse().ok().map(AttribValue::Float),
        ScalarShape::Text => Some(AttribValue::Text(text.to_string())),
    }
}

fn builtin_complex_to_xml(key: &str, value: &AttribValue) -> Option<XmlElement> {
    let mut element = XmlElement::new(ATTRIBUTE_ELEMENT).with_attr("name", key);
    match (key, value) {
        ("freq_history", AttribValue::TimeSeries(samples)) => {
            for (timestamp, frequency) in samples {
                element.children.push(
                    XmlElement::new(key)
                        .with_attr("timestamp", timestamp)
                        .with_attr("frequency", frequency)
                        .with_attr("unit", "MHz"),
                );
            }
            Some(element)
        }
        ("GPU_Clock_Rate", AttribValue::Quantity { value, unit }) => {
            element.children.push(
                XmlElement::new(key)
                    .with_attr("frequency", value)
                    .with_attr("unit", unit),
            );
            Some(element)
        }
        (_, AttribValue::Opaque(opaque)) => opaque.to_xml(key),
        _ => None,
    }
}

fn builtin_complex_from_xml(element: &XmlElement) -> Option<AttribValue> {
    match element.attr("name")? {
        "freq_history" => {
            let samples = element
                .children_named("freq_history")
                .filter_map(|sample| {
                    let timestamp = sample.attr("timestamp")?.trim().parse().ok()?;
                    let frequency = sample.attr("frequency")?.trim().parse().ok()?;
                    Some((timestamp, frequency))
                })
                .collect();
            Some(AttribValue::TimeSeries(samples))
        }
        "GPU_Clock_Rate" => {
            let rate = element.child("GPU_Clock_Rate")?;
            Some(AttribValue::Quantity {
                value: rate.attr("frequency")?.trim().parse().ok()?,
                unit: rate.attr("unit").unwrap_or_default().to_string(),
            })
        }
        _ => None,
    }
}

/// Build `<Attribute>` elements for every exportable entry of `store`.
pub fn export_attributes(store: &AttribStore, hooks: &ExportHooks<'_>) -> Vec<XmlElement> {
    let mut out = Vec::new();
    for (key, value) in store.iter() {
        let text = hooks
            .stringifier
            .and_then(|f| f(key, value))
            .or_else(|| builtin_scalar_to_string(key, value));
        if let Some(text) = text {
            out.push(
                XmlElement::new(ATTRIBUTE_ELEMENT)
                    .with_attr("name", key)
                    .with_attr("value", text),
            );
            continue;
        }

        let element = hooks
            .complex_writer
            .and_then(|f| f(key, value))
            .or_else(|| builtin_complex_to_xml(key, value));
        match element {
            Some(element) => out.push(element),
            None => debug!(key, kind = value.kind_str(), "Attribute not exported: no handler"),
        }
    }
    out
}

/// Read one `<Attribute>` element into `store`. Returns false when no
/// handler accepted it.
pub fn import_attribute(element: &XmlElement, store: &mut AttribStore, hooks: &ImportHooks<'_>) -> bool {
    let Some(key) = element.attr("name") else {
        debug!("Attribute element without a name");
        return false;
    };

    let scalar = element.attr("value").and_then(|text| {
        hooks
            .reader
            .and_then(|f| f(key, text))
            .or_else(|| builtin_scalar_from_str(key, text))
    });
    let value = scalar.or_else(|| {
        hooks
            .complex_reader
            .and_then(|f| f(element))
            .or_else(|| builtin_complex_from_xml(element))
    });

    match value {
        Some(value) => {
            store.insert(key, value);
            true
        }
        None => {
            debug!(key, "Attribute not imported: no handler");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attrib::OpaqueAttrib;
    use std::any::Any;

    #[derive(Debug)]
    struct PowerCap(u32);

    impl OpaqueAttrib for PowerCap {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn to_xml(&self, key: &str) -> Option<XmlElement> {
            Some(
                XmlElement::new(ATTRIBUTE_ELEMENT)
                    .with_attr("name", key)
                    .with_child(XmlElement::new("cap").with_attr("watts", self.0)),
            )
        }
    }

    fn round_trip(store: &AttribStore, export: &ExportHooks<'_>, import: &ImportHooks<'_>) -> AttribStore {
        let mut back = AttribStore::new();
        for element in export_attributes(store, export) {
            import_attribute(&element, &mut back, import);
        }
        back
    }

    #[test]
    fn test_builtin_scalars_round_trip() {
        let mut store = AttribStore::new();
        store.insert("CATL3mask", 0xffu64);
        store.insert("mig_size", 4096i64);
        store.insert("Bus_Width_bit", 384i64);
        store.insert("Clock_Frequency", 1410.5);
        store.insert("CUDA_compute_capability", "8.0");

        let back = round_trip(&store, &ExportHooks::default(), &ImportHooks::default());
        assert_eq!(back.get_u64("CATL3mask"), Some(255));
        assert_eq!(back.get_i64("mig_size"), Some(4096));
        assert_eq!(back.get_i64("Bus_Width_bit"), Some(384));
        assert_eq!(back.get_f64("Clock_Frequency"), Some(1410.5));
        assert_eq!(back.get_str("CUDA_compute_capability"), Some("8.0"));
    }

    #[test]
    fn test_builtin_structured_round_trip() {
        let mut store = AttribStore::new();
        store.insert("freq_history", AttribValue::TimeSeries(vec![(100, 2400.0), (200, 3100.5)]));
        store.insert(
            "GPU_Clock_Rate",
            AttribValue::Quantity {
                value: 1.41,
                unit: "GHz".to_string(),
            },
        );

        let elements = export_attributes(&store, &ExportHooks::default());
        let history = elements
            .iter()
            .find(|e| e.attr("name") == Some("freq_history"))
            .unwrap();
        assert_eq!(history.children.len(), 2);
        assert_eq!(history.children[0].attr("unit"), Some("MHz"));

        let back = round_trip(&store, &ExportHooks::default(), &ImportHooks::default());
        assert_eq!(back.get_time_series("freq_history"), Some(&[(100, 2400.0), (200, 3100.5)][..]));
        assert_eq!(back.get("GPU_Clock_Rate"), store.get("GPU_Clock_Rate"));
    }

    #[test]
    fn test_unknown_keys_are_dropped_without_hooks() {
        let mut store = AttribStore::new();
        store.insert("vendor_specific", 7i64);
        store.insert("CATcos", "not-a-number");
        assert!(export_attributes(&store, &ExportHooks::default()).is_empty());
    }

    #[test]
    fn test_caller_hooks_take_precedence() {
        let mut store = AttribStore::new();
        store.insert("CATcos", 2u64);
        store.insert("temperature", 41.5);

        let stringify = |key: &str, value: &AttribValue| match (key, value) {
            ("temperature", AttribValue::Float(v)) => Some(format!("{v}C")),
            ("CATcos", AttribValue::UInt(v)) => Some(format!("cos-{v}")),
            _ => None,
        };
        let read = |key: &str, text: &str| match key {
            "temperature" => text.trim_end_matches('C').parse().ok().map(AttribValue::Float),
            _ => None,
        };
        let export = ExportHooks {
            stringifier: Some(&stringify),
            ..Default::default()
        };
        let import = ImportHooks {
            reader: Some(&read),
            ..Default::default()
        };

        let elements = export_attributes(&store, &export);
        let cos = elements.iter().find(|e| e.attr("name") == Some("CATcos")).unwrap();
        assert_eq!(cos.attr("value"), Some("cos-2"));

        let back = round_trip(&store, &export, &import);
        assert_eq!(back.get_f64("temperature"), Some(41.5));
        // The built-in parser rejects the caller's custom spelling.
        assert!(!back.contains("CATcos"));
    }

    #[test]
    fn test_opaque_values_use_their_handler() {
        let mut store = AttribStore::new();
        store.insert("power_cap", AttribValue::opaque(PowerCap(250)));

        let read_cap = |e: &XmlElement| {
            let watts = e.child("cap")?.attr("watts")?.parse::<i64>().ok()?;
            Some(AttribValue::Int(watts))
        };
        let import = ImportHooks {
            complex_reader: Some(&read_cap),
            ..Default::default()
        };
        let back = round_trip(&store, &ExportHooks::default(), &import);
        assert_eq!(back.get_i64("power_cap"), Some(250));

        let dropped = round_trip(&store, &ExportHooks::default(), &ImportHooks::default());
        assert!(dropped.is_empty());
    }
}
