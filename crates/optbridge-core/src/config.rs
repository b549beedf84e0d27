//! Configuration types for the purchase-option bridge
//!
//! This module defines all configuration structures used throughout the crate.
//! Every field has a default so that an empty JSON object is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Widget discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Marker vocabulary used by the widget
    #[serde(default)]
    pub markers: MarkerVocabulary,

    /// State extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Product form lookup settings
    #[serde(default)]
    pub form: FormConfig,

    /// Engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl BridgeConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.discovery.validate()?;
        self.markers.validate()?;

        if self.extraction.max_ancestor_depth == 0 {
            return Err(crate::Error::config("max_ancestor_depth must be > 0"));
        }

        self.form.validate()?;

        if self.engine.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be > 0"));
        }

        Ok(())
    }
}

/// Discovery engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Maximum number of discovery attempts per session
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts while the widget host exists but has no boundary yet
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Candidate signatures for the widget host element
    #[serde(default = "default_signatures")]
    pub signatures: Vec<ElementSignature>,

    /// What a reconnect does after a session exhausted its budget
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl DiscoveryConfig {
    /// Validate the discovery configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("discovery max_attempts must be > 0"));
        }
        if self.signatures.is_empty() {
            return Err(crate::Error::config("at least one widget signature is required"));
        }
        for signature in &self.signatures {
            signature.validate()?;
        }
        Ok(())
    }

    /// Retry interval as a `Duration`
    pub fn retry_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
            signatures: default_signatures(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Policy applied when a host reconnects after its discovery budget ran out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Start a fresh session with a fresh attempt counter
    #[default]
    Restart,
    /// Keep the host permanently failed; reconnects are ignored
    RemainFailed,
}

/// Tag and/or attribute signature matching an element
///
/// A signature with both fields set requires both to match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementSignature {
    /// Lowercase tag name
    #[serde(default)]
    pub tag: Option<String>,

    /// Attribute that must be present
    #[serde(default)]
    pub attribute: Option<String>,
}

impl ElementSignature {
    /// Signature matching a tag name
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            attribute: None,
        }
    }

    /// Signature matching an attribute
    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self {
            tag: None,
            attribute: Some(attribute.into()),
        }
    }

    /// Require an attribute in addition to the tag
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.tag.as_deref().is_none_or(str::is_empty)
            && self.attribute.as_deref().is_none_or(str::is_empty)
        {
            return Err(crate::Error::config(
                "element signature needs a tag or an attribute",
            ));
        }
        Ok(())
    }
}

/// Marker attribute and token vocabulary used by the widget
///
/// The widget tags semantic regions with space-separated tokens in a single
/// attribute, e.g. `part="option selected"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerVocabulary {
    /// Attribute carrying the marker tokens
    #[serde(default = "default_marker_attribute")]
    pub attribute: String,

    /// Token on the currently selected option
    #[serde(default = "default_selected_token")]
    pub selected: String,

    /// Token on one-time purchase regions
    #[serde(default = "default_one_time_token")]
    pub one_time: String,

    /// Token on subscription regions
    #[serde(default = "default_subscription_token")]
    pub subscription: String,

    /// Token on the single (one-time) price node
    #[serde(default = "default_price_token")]
    pub price: String,

    /// Token on the discounted subscription price node
    #[serde(default = "default_discounted_price_token")]
    pub discounted_price: String,

    /// Token on the undiscounted subscription price node
    #[serde(default = "default_unit_price_token")]
    pub unit_price: String,

    /// Token on the subscription-capable option set
    #[serde(default = "default_option_set_token")]
    pub subscription_options: String,
}

impl MarkerVocabulary {
    /// All tokens that mark a node as price-bearing
    pub fn price_tokens(&self) -> [&str; 3] {
        [&self.price, &self.discounted_price, &self.unit_price]
    }

    fn validate(&self) -> Result<(), crate::Error> {
        let fields = [
            ("attribute", &self.attribute),
            ("selected", &self.selected),
            ("one_time", &self.one_time),
            ("subscription", &self.subscription),
            ("price", &self.price),
            ("discounted_price", &self.discounted_price),
            ("unit_price", &self.unit_price),
            ("subscription_options", &self.subscription_options),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(crate::Error::config(format!("marker {name} cannot be empty")));
            }
            if name != "attribute" && value.contains(char::is_whitespace) {
                return Err(crate::Error::config(format!(
                    "marker {name} must be a single token, got {value:?}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for MarkerVocabulary {
    fn default() -> Self {
        Self {
            attribute: default_marker_attribute(),
            selected: default_selected_token(),
            one_time: default_one_time_token(),
            subscription: default_subscription_token(),
            price: default_price_token(),
            discounted_price: default_discounted_price_token(),
            unit_price: default_unit_price_token(),
            subscription_options: default_option_set_token(),
        }
    }
}

/// State extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// How many ancestors (the selected node included) are checked for a plan token
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: default_max_ancestor_depth(),
        }
    }
}

/// Product form configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    /// Signature of the product form element
    #[serde(default = "default_form_signature")]
    pub signature: ElementSignature,

    /// `name` of the field carrying the live variant id
    #[serde(default = "default_variant_field")]
    pub variant_field: String,

    /// `name` of the field carrying the product id
    #[serde(default = "default_product_field")]
    pub product_field: String,

    /// Attribute marking the embedded variant snapshot
    #[serde(default = "default_snapshot_attribute")]
    pub snapshot_attribute: String,

    /// Attribute carrying the section id on the section element
    #[serde(default = "default_section_attribute")]
    pub section_attribute: String,

    /// Prefix of the price container id expected by the price consumer
    #[serde(default = "default_price_container_prefix")]
    pub price_container_prefix: String,
}

impl FormConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        self.signature.validate()?;
        if self.variant_field.is_empty() {
            return Err(crate::Error::config("form variant_field cannot be empty"));
        }
        if self.product_field.is_empty() {
            return Err(crate::Error::config("form product_field cannot be empty"));
        }
        Ok(())
    }
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            signature: default_form_signature(),
            variant_field: default_variant_field(),
            product_field: default_product_field(),
            snapshot_attribute: default_snapshot_attribute(),
            section_attribute: default_section_attribute(),
            price_container_prefix: default_price_container_prefix(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the monitoring event channel
    ///
    /// When full, new monitoring events are dropped (with a warning log).
    /// Domain events are never dropped; they go through the dispatcher.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_interval_ms() -> u64 {
    500
}

fn default_signatures() -> Vec<ElementSignature> {
    vec![
        ElementSignature::tag("subscription-widget"),
        ElementSignature::tag("purchase-options"),
        ElementSignature::attribute("data-purchase-options"),
    ]
}

fn default_marker_attribute() -> String {
    "part".to_string()
}

fn default_selected_token() -> String {
    "selected".to_string()
}

fn default_one_time_token() -> String {
    "one-time".to_string()
}

fn default_subscription_token() -> String {
    "subscription".to_string()
}

fn default_price_token() -> String {
    "price".to_string()
}

fn default_discounted_price_token() -> String {
    "discounted-price".to_string()
}

fn default_unit_price_token() -> String {
    "unit-price".to_string()
}

fn default_option_set_token() -> String {
    "subscription-options".to_string()
}

fn default_max_ancestor_depth() -> usize {
    8
}

fn default_form_signature() -> ElementSignature {
    ElementSignature::tag("form").with_attribute("data-product-form")
}

fn default_variant_field() -> String {
    "id".to_string()
}

fn default_product_field() -> String {
    "product-id".to_string()
}

fn default_snapshot_attribute() -> String {
    "data-selected-variant".to_string()
}

fn default_section_attribute() -> String {
    "data-section".to_string()
}

fn default_price_container_prefix() -> String {
    "price-".to_string()
}

fn default_event_channel_capacity() -> usize {
    256
}
