//! Variant resolution from the host's product form
//!
//! The native variant event carries the variant descriptor, the product id
//! and a rendered fragment containing the price container. The bridge
//! rebuilds all three from live host state:
//!
//! - ids come from the form's hidden fields
//! - the descriptor comes from the embedded snapshot next to the form, or
//!   a minimal fallback when it is missing or malformed
//! - the fragment wraps the widget's raw price markup in a container whose
//!   id the price consumer looks up (`{prefix}{section}`)

use serde_json::{Value, json};

use crate::Error;
use crate::config::FormConfig;
use crate::discovery::matches_signature;
use crate::traits::{DomSensor, NodeId, find_descendant};

/// Live state read from a product form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState {
    /// The form element
    pub form: NodeId,
    /// Value of the variant id field
    pub variant_id: Option<String>,
    /// Value of the product id field
    pub product_id: Option<String>,
    /// Raw text of the embedded variant snapshot
    pub snapshot: Option<String>,
}

/// Where a variant descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSource {
    /// Parsed embedded snapshot
    Snapshot,
    /// No snapshot next to the form
    FallbackMissing,
    /// Snapshot present but unusable
    FallbackMalformed,
}

/// Nearest product form around `host`
///
/// Walks up from `host` (inclusive) and returns the first ancestor that is,
/// or contains, an element matching the form signature.
pub fn locate_form(sensor: &dyn DomSensor, host: NodeId, config: &FormConfig) -> Option<NodeId> {
    let mut current = Some(host);
    while let Some(node) = current {
        if matches_signature(sensor, node, &config.signature) {
            return Some(node);
        }
        if let Some(form) =
            find_descendant(sensor, node, |n| matches_signature(sensor, n, &config.signature))
        {
            return Some(form);
        }
        current = sensor.parent(node);
    }
    None
}

/// Read ids and the snapshot for `form`
pub fn read_form(sensor: &dyn DomSensor, form: NodeId, config: &FormConfig) -> FormState {
    let field = |name: &str| {
        find_descendant(sensor, form, |n| {
            sensor.attribute(n, "name").as_deref() == Some(name)
        })
        .and_then(|n| sensor.attribute(n, "value"))
        .filter(|value| !value.is_empty())
    };

    let scope = sensor.parent(form).unwrap_or(form);
    let snapshot = find_descendant(sensor, scope, |n| {
        sensor.attribute(n, &config.snapshot_attribute).is_some()
    })
    .map(|n| sensor.text_content(n));

    FormState {
        form,
        variant_id: field(&config.variant_field),
        product_id: field(&config.product_field),
        snapshot,
    }
}

/// Section id of the nearest section around `host`
pub fn section_id(sensor: &dyn DomSensor, host: NodeId, config: &FormConfig) -> Option<String> {
    let mut current = Some(host);
    while let Some(node) = current {
        if let Some(id) = sensor.attribute(node, &config.section_attribute) {
            return Some(id);
        }
        current = sensor.parent(node);
    }
    None
}

/// JSON form of a variant id: numeric when it parses as one
pub fn id_value(variant_id: Option<&str>) -> Value {
    match variant_id {
        Some(id) => id
            .parse::<u64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::from(id)),
        None => Value::Null,
    }
}

/// Descriptor used when no usable snapshot exists
pub fn fallback_descriptor(variant_id: Option<&str>) -> Value {
    json!({
        "id": id_value(variant_id),
        "available": true,
        "inventory_management": false,
    })
}

/// Parse an embedded snapshot
///
/// # Errors
///
/// [`Error::MalformedSnapshot`] when the text is not a JSON object
pub fn parse_snapshot(raw: &str) -> Result<Value, Error> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(other) => Err(Error::malformed_snapshot(format!(
            "expected an object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(Error::malformed_snapshot(e.to_string())),
    }
}

/// Build the variant descriptor from form state
///
/// A parsed snapshot keeps all its fields, but its `id` is replaced by the
/// live form id when the two disagree.
///
/// # Returns
///
/// The descriptor, where it came from, and the parse error for a malformed
/// snapshot
pub fn resolve_descriptor(state: &FormState) -> (Value, DescriptorSource, Option<Error>) {
    let variant_id = state.variant_id.as_deref();
    let Some(raw) = state.snapshot.as_deref() else {
        return (
            fallback_descriptor(variant_id),
            DescriptorSource::FallbackMissing,
            None,
        );
    };

    match parse_snapshot(raw) {
        Ok(mut snapshot) => {
            if let Some(live) = variant_id {
                let agrees = match snapshot.get("id") {
                    Some(Value::String(s)) => s == live,
                    Some(Value::Number(n)) => n.to_string() == live,
                    _ => false,
                };
                if !agrees {
                    snapshot["id"] = id_value(Some(live));
                }
            }
            (snapshot, DescriptorSource::Snapshot, None)
        }
        Err(e) => (
            fallback_descriptor(variant_id),
            DescriptorSource::FallbackMalformed,
            Some(e),
        ),
    }
}

/// Wrap raw price markup in the container the price consumer expects
pub fn price_fragment(config: &FormConfig, section: Option<&str>, markup: &str) -> String {
    match section {
        Some(section) => format!(
            r#"<div id="{}{}" class="price-container">{}</div>"#,
            config.price_container_prefix,
            section.replace('"', "&quot;"),
            markup
        ),
        None => format!(r#"<div class="price-container">{markup}</div>"#),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
