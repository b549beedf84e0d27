//! Mutation watching on a bound widget boundary
//!
//! Three observers are attached to the boundary:
//! - **selection**: changes of the marker attribute (which option is selected)
//! - **structure**: child-list changes (the widget streams content in)
//! - **text**: character data changes, kept only when price-related
//!
//! plus a one-shot content-ready observer owned by the session.
//!
//! Records are classified into a [`Signal`]; any signal means "state may
//! have changed" and triggers one extraction cycle.

use tokio_stream::StreamExt;

use crate::config::MarkerVocabulary;
use crate::traits::{
    DomSensor, MutationRecord, NodeId, ObserveOptions, Watcher, descendants, has_token,
};

/// Which boundary watcher delivered a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Selection,
    Structure,
    Text,
}

/// Classified "state may have changed" signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The selected marker moved or changed
    SelectionMarker,
    /// Content was added or removed
    Structure,
    /// Text inside a price-bearing node changed
    PriceText,
}

/// The three observers attached to a bound boundary
#[derive(Debug)]
pub struct BoundaryWatchers {
    selection: Watcher,
    structure: Watcher,
    text: Watcher,
}

impl BoundaryWatchers {
    /// Attach all three observers to `boundary`
    pub fn attach(sensor: &dyn DomSensor, boundary: NodeId, markers: &MarkerVocabulary) -> Self {
        Self {
            selection: sensor.observe(
                boundary,
                ObserveOptions::attribute(markers.attribute.clone()).subtree(),
            ),
            structure: sensor.observe(boundary, ObserveOptions::child_list().subtree()),
            text: sensor.observe(boundary, ObserveOptions::character_data().subtree()),
        }
    }

    /// Next record from any of the three observers
    ///
    /// Observers are polled in attachment order, so records queued on the
    /// selection observer are handled before structure and text records.
    /// Returns `None` once every observer stream has ended.
    pub async fn next_record(&mut self) -> Option<(WatchKind, MutationRecord)> {
        tokio::select! {
            biased;
            Some(record) = self.selection.next() => Some((WatchKind::Selection, record)),
            Some(record) = self.structure.next() => Some((WatchKind::Structure, record)),
            Some(record) = self.text.next() => Some((WatchKind::Text, record)),
            else => None,
        }
    }

    /// Disconnect all three observers
    pub fn disconnect(self) {
        self.selection.disconnect();
        self.structure.disconnect();
        self.text.disconnect();
    }
}

/// Observer used to detect the first price-bearing marker
pub fn content_ready_watcher(
    sensor: &dyn DomSensor,
    boundary: NodeId,
    markers: &MarkerVocabulary,
) -> Watcher {
    let options = ObserveOptions {
        child_list: true,
        attributes: true,
        attribute_filter: Some(vec![markers.attribute.clone()]),
        subtree: true,
        ..ObserveOptions::default()
    };
    sensor.observe(boundary, options)
}

/// Whether `node` carries any price token
pub fn is_price_bearing(sensor: &dyn DomSensor, node: NodeId, markers: &MarkerVocabulary) -> bool {
    markers
        .price_tokens()
        .iter()
        .any(|token| has_token(sensor, node, &markers.attribute, token))
}

/// Whether any price-bearing marker exists under `boundary`
pub fn is_content_ready(sensor: &dyn DomSensor, boundary: NodeId, markers: &MarkerVocabulary) -> bool {
    descendants(sensor, boundary)
        .into_iter()
        .any(|node| is_price_bearing(sensor, node, markers))
}

/// Whether a subscription-capable option set is rendered under `boundary`
pub fn has_subscription_options(
    sensor: &dyn DomSensor,
    boundary: NodeId,
    markers: &MarkerVocabulary,
) -> bool {
    descendants(sensor, boundary)
        .into_iter()
        .any(|node| has_token(sensor, node, &markers.attribute, &markers.subscription_options))
}

/// Classify a record delivered by a boundary watcher
///
/// # Returns
///
/// `None` for records that cannot affect the selection state
pub fn classify(
    sensor: &dyn DomSensor,
    boundary: NodeId,
    record: &MutationRecord,
    markers: &MarkerVocabulary,
) -> Option<Signal> {
    match record {
        MutationRecord::Attributes { name, .. } if *name == markers.attribute => {
            Some(Signal::SelectionMarker)
        }
        MutationRecord::Attributes { .. } => None,
        MutationRecord::ChildList { .. } => Some(Signal::Structure),
        MutationRecord::CharacterData { target } => {
            touches_price(sensor, boundary, *target, markers).then_some(Signal::PriceText)
        }
    }
}

/// Whether a text mutation on `target` is inside a node that is or contains
/// a price-bearing marker
fn touches_price(
    sensor: &dyn DomSensor,
    boundary: NodeId,
    target: NodeId,
    markers: &MarkerVocabulary,
) -> bool {
    let mut current = sensor.parent(target);
    let mut first_element = None;
    while let Some(node) = current {
        if node == boundary {
            break;
        }
        if is_price_bearing(sensor, node, markers) {
            return true;
        }
        first_element.get_or_insert(node);
        current = sensor.parent(node);
    }

    first_element.is_some_and(|element| {
        descendants(sensor, element)
            .into_iter()
            .any(|node| is_price_bearing(sensor, node, markers))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{MemoryDom, NodeSpec};

    fn widget() -> (MemoryDom, NodeId) {
        let spec = NodeSpec::element("purchase-options").shadow(vec![
            NodeSpec::element("div")
                .attr("part", "option one-time selected")
                .attr("id", "opt")
                .child(NodeSpec::element("span").attr("part", "price").attr("id", "price").with_text("$10.00"))
                .child(NodeSpec::element("span").attr("id", "label").with_text("One-time")),
        ]);
        let (dom, host) = MemoryDom::from_spec(&spec).unwrap();
        let boundary = dom.shadow_root(host).unwrap();
        (dom, boundary)
    }

    fn first_text_child(dom: &MemoryDom, element: NodeId) -> NodeId {
        dom.children(element)[0]
    }

    #[test]
    fn marker_attribute_changes_are_selection_signals() {
        let (dom, boundary) = widget();
        let markers = MarkerVocabulary::default();
        let opt = dom.find_by_id("opt").unwrap();

        let marker = MutationRecord::Attributes { target: opt, name: "part".into() };
        let other = MutationRecord::Attributes { target: opt, name: "class".into() };
        assert_eq!(classify(&dom, boundary, &marker, &markers), Some(Signal::SelectionMarker));
        assert_eq!(classify(&dom, boundary, &other, &markers), None);
    }

    #[test]
    fn text_changes_only_count_near_prices() {
        let (dom, boundary) = widget();
        let markers = MarkerVocabulary::default();
        let price_text = first_text_child(&dom, dom.find_by_id("price").unwrap());
        let label_text = first_text_child(&dom, dom.find_by_id("label").unwrap());

        let price = MutationRecord::CharacterData { target: price_text };
        let label = MutationRecord::CharacterData { target: label_text };
        assert_eq!(classify(&dom, boundary, &price, &markers), Some(Signal::PriceText));
        assert_eq!(classify(&dom, boundary, &label, &markers), None);
    }

    #[test]
    fn text_directly_in_a_price_container_counts() {
        let spec = NodeSpec::element("purchase-options").shadow(vec![
            NodeSpec::element("div")
                .attr("id", "wrap")
                .with_text("Now ")
                .child(NodeSpec::element("span").attr("part", "unit-price").with_text("$9")),
        ]);
        let (dom, host) = MemoryDom::from_spec(&spec).unwrap();
        let boundary = dom.shadow_root(host).unwrap();
        let text = first_text_child(&dom, dom.find_by_id("wrap").unwrap());

        let record = MutationRecord::CharacterData { target: text };
        assert_eq!(
            classify(&dom, boundary, &record, &MarkerVocabulary::default()),
            Some(Signal::PriceText)
        );
    }

    #[test]
    fn readiness_and_option_set_detection() {
        let (dom, boundary) = widget();
        let markers = MarkerVocabulary::default();
        assert!(is_content_ready(&dom, boundary, &markers));
        assert!(!has_subscription_options(&dom, boundary, &markers));

        let empty = dom.create_element("div");
        assert!(!is_content_ready(&dom, empty, &markers));
    }

    #[tokio::test]
    async fn boundary_watchers_multiplex_and_disconnect() {
        let (dom, boundary) = widget();
        let markers = MarkerVocabulary::default();
        let mut watchers = BoundaryWatchers::attach(&dom, boundary, &markers);
        assert_eq!(dom.live_observer_count(), 3);

        let opt = dom.find_by_id("opt").unwrap();
        dom.set_attribute(opt, "part", "option one-time").unwrap();
        dom.update_text(dom.find_by_id("price").unwrap(), "$11.00").unwrap();

        let (kind, _) = watchers.next_record().await.unwrap();
        assert_eq!(kind, WatchKind::Selection);
        let (kind, _) = watchers.next_record().await.unwrap();
        assert_eq!(kind, WatchKind::Text);

        watchers.disconnect();
        assert_eq!(dom.live_observer_count(), 0);
    }

    #[test]
    fn idle_boundary_stays_pending() {
        let (dom, boundary) = widget();
        let markers = MarkerVocabulary::default();
        let mut watchers = BoundaryWatchers::attach(&dom, boundary, &markers);

        {
            let mut next = tokio_test::task::spawn(watchers.next_record());
            tokio_test::assert_pending!(next.poll());

            dom.mount(boundary, &NodeSpec::element("p")).unwrap();
            assert!(next.is_woken());
            let (kind, _) = tokio_test::assert_ready!(next.poll()).unwrap();
            assert_eq!(kind, WatchKind::Structure);
        }

        watchers.disconnect();
    }
}
