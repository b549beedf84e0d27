//! Event synthesis
//!
//! Compares each fresh [`Extraction`] with the last state that was
//! dispatched and builds the envelopes to send:
//!
//! | Compared to last state        | Envelopes                          |
//! |-------------------------------|------------------------------------|
//! | nothing dispatched yet        | SelectionChanged, VariantUpdated   |
//! | other selected node           | SelectionChanged, VariantUpdated   |
//! | same node, price/discount new | VariantUpdated                     |
//! | equal                         | none                               |
//!
//! Envelopes are returned in dispatch order; the caller sends them one by
//! one.

pub mod variant;

use tracing::{debug, warn};

use crate::Error;
use crate::config::FormConfig;
use crate::events::{
    ChangeType, DispatchEnvelope, DomainEvent, EVENT_SOURCE, SelectionChanged, VariantData,
    VariantUpdated,
};
use crate::extract::{Extraction, SelectionState};
use crate::traits::{DomSensor, NodeId};

pub use variant::{DescriptorSource, FormState};

/// What a fresh state means relative to the last dispatched one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Selected node changed (or first dispatch)
    Selection,
    /// Same node, new price or discount
    PriceOnly,
    /// Nothing to dispatch
    Unchanged,
}

/// Deduplicating builder of outbound events for one session
#[derive(Debug, Clone)]
pub struct EventSynthesizer {
    form: FormConfig,
    last: Option<SelectionState>,
}

impl EventSynthesizer {
    /// Create a synthesizer with no dispatched state
    pub fn new(form: FormConfig) -> Self {
        Self { form, last: None }
    }

    /// Last committed state
    pub fn last(&self) -> Option<&SelectionState> {
        self.last.as_ref()
    }

    /// Classify `state` against the last committed one
    pub fn decide(&self, state: &SelectionState) -> Decision {
        match &self.last {
            None => Decision::Selection,
            Some(last) if last.selected != state.selected => Decision::Selection,
            Some(last) if last == state => Decision::Unchanged,
            Some(_) => Decision::PriceOnly,
        }
    }

    /// Decide, commit and build the envelopes for one cycle
    ///
    /// `host` is the element the bridge is connected to; the selection event
    /// targets it and the product form is looked up around it.
    pub fn synthesize(
        &mut self,
        sensor: &dyn DomSensor,
        host: NodeId,
        extraction: &Extraction,
        change: ChangeType,
    ) -> Vec<DispatchEnvelope> {
        let decision = self.decide(&extraction.state);
        if decision == Decision::Unchanged {
            debug!(host = %host, "selection state unchanged");
            return Vec::new();
        }
        self.last = Some(extraction.state);

        let mut envelopes = Vec::with_capacity(2);
        if decision == Decision::Selection {
            envelopes.push(DispatchEnvelope::new(
                host,
                DomainEvent::SelectionChanged(selection_event(extraction, change)),
            ));
        }

        match self.variant_event(sensor, host, extraction) {
            Ok(envelope) => envelopes.push(envelope),
            Err(e) => warn!(host = %host, error = %e, "variant update skipped"),
        }

        envelopes
    }

    fn variant_event(
        &self,
        sensor: &dyn DomSensor,
        host: NodeId,
        extraction: &Extraction,
    ) -> Result<DispatchEnvelope, Error> {
        let form = variant::locate_form(sensor, host, &self.form)
            .ok_or_else(|| Error::FormNotFound(host.to_string()))?;
        let state = variant::read_form(sensor, form, &self.form);

        let (resource, source, snapshot_error) = variant::resolve_descriptor(&state);
        if let Some(e) = snapshot_error {
            warn!(host = %host, form = %form, error = %e, "using fallback variant descriptor");
        }
        debug!(host = %host, form = %form, source = ?source, "variant descriptor resolved");

        let section = variant::section_id(sensor, host, &self.form);
        let html = variant::price_fragment(&self.form, section.as_deref(), &extraction.price_markup);

        Ok(DispatchEnvelope::new(
            form,
            DomainEvent::VariantUpdated(VariantUpdated {
                resource,
                source: EVENT_SOURCE.to_string(),
                data: VariantData {
                    html,
                    product_id: state.product_id,
                    new_product: None,
                },
            }),
        ))
    }
}

fn selection_event(extraction: &Extraction, change: ChangeType) -> SelectionChanged {
    SelectionChanged {
        selected_option: extraction.state.selected,
        price: extraction.state.price,
        plan_type: extraction.state.plan,
        has_discount: extraction.state.has_discount,
        price_element: extraction.price_node,
        change_type: change,
    }
}
