/*!
In-memory document tree with mutation observers.

`Document` is the reference change source for the wait core. Edits queue
`MutationRecord`s on every interested observer; nothing is delivered until
`deliver_mutations()` runs, the equivalent of a browser's microtask checkpoint.
Delivery happens outside the state lock, so observer callbacks may freely
read the document or unsubscribe.

# Example

```
use domwait::{Document, ObserveOptions, ChangeSource};
use std::sync::Arc;

let doc = Document::new();
let body = doc.create_element("body");
doc.append_child(doc.root(), body)?;

let sub = doc.subscribe(body, ObserveOptions::default(), Arc::new(|batch: domwait::ChangeBatch| {
  assert_eq!(batch.len(), 1);
}));
let card = doc.create_element_with("div", &[("class", "card")]);
doc.append_child(body, card)?;
assert_eq!(doc.deliver_mutations(), 1);
doc.unsubscribe(sub);
# Ok::<(), domwait::DomError>(())
```
*/

mod tree;

use async_broadcast::{InactiveReceiver, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::race::{self, Wait};
use crate::selector::{ElementView, Selector};
use crate::services::{BatchCallback, ChangeSource, DeadlineTimer, NodeTree};
use crate::types::{
  ChangeBatch, DomError, DomResult, Event, MutationRecord, NodeId, NodeKind, ObserveOptions,
  SubscriptionId,
};
use crate::WaitRequest;
use tree::TreeLinks;

const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Per-node data.
struct NodeData {
  kind: NodeKind,
  /// Lowercase tag name. Elements only.
  tag: Option<String>,
  /// Attributes in insertion order, names lowercase.
  attributes: Vec<(String, String)>,
  /// Text content. Text and comment nodes only.
  text: Option<String>,
}

impl NodeData {
  fn element(tag: &str) -> Self {
    Self {
      kind: NodeKind::Element,
      tag: Some(tag.to_ascii_lowercase()),
      attributes: Vec::new(),
      text: None,
    }
  }

  fn character_data(kind: NodeKind, text: &str) -> Self {
    Self {
      kind,
      tag: None,
      attributes: Vec::new(),
      text: Some(text.to_owned()),
    }
  }

  const fn can_have_children(&self) -> bool {
    matches!(self.kind, NodeKind::Document | NodeKind::Element)
  }
}

/// A registered observer and the records waiting for its next delivery.
struct Observer {
  target: NodeId,
  options: ObserveOptions,
  callback: BatchCallback,
  pending: ChangeBatch,
}

/// Document state. Only touched through `Document::read`/`Document::write`.
struct DomState {
  root: NodeId,
  nodes: HashMap<NodeId, NodeData>,
  links: TreeLinks,
  /// Ordered by creation, so delivery order matches registration order.
  observers: BTreeMap<SubscriptionId, Observer>,
  events_tx: Sender<Event>,
}

impl DomState {
  fn node(&self, id: NodeId) -> DomResult<&NodeData> {
    self.nodes.get(&id).ok_or(DomError::NodeNotFound(id))
  }

  fn node_mut(&mut self, id: NodeId) -> DomResult<&mut NodeData> {
    self.nodes.get_mut(&id).ok_or(DomError::NodeNotFound(id))
  }

  fn insert_node(&mut self, data: NodeData) -> NodeId {
    let id = NodeId::new();
    self.nodes.insert(id, data);
    self.emit(Event::NodeCreated { node_id: id });
    id
  }

  /// Queue `record` on every observer interested in it, then broadcast it.
  fn queue_record(&mut self, record: MutationRecord) {
    let links = &self.links;
    for observer in self.observers.values_mut() {
      if !observer.options.wants(record.kind) {
        continue;
      }
      let in_scope = if observer.options.subtree {
        links.is_inclusive_ancestor(observer.target, record.target)
      } else {
        observer.target == record.target
      };
      if in_scope {
        observer.pending.push(record.clone());
      }
    }
    self.emit(Event::Mutated(record));
  }

  fn emit(&self, event: Event) {
    if let Err(e) = self.events_tx.try_broadcast(event) {
      if e.is_full() {
        log::error!(
          "Event channel overflow - events are being dropped. \
           Consider increasing EVENT_CHANNEL_CAPACITY or processing events faster."
        );
      }
    }
  }

  fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
    self
      .links
      .descendants(scope)
      .into_iter()
      .filter(|&id| selector.matches_in(self, id))
      .collect()
  }
}

impl ElementView for DomState {
  fn tag_name(&self, node: NodeId) -> Option<&str> {
    self.nodes.get(&node)?.tag.as_deref()
  }

  fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
    self
      .nodes
      .get(&node)?
      .attributes
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  fn parent(&self, node: NodeId) -> Option<NodeId> {
    self.links.parent(node)
  }
}

/// In-memory document. Clone is cheap (Arc bumps) - share freely across threads.
#[derive(Clone)]
pub struct Document {
  state: Arc<RwLock<DomState>>,
  events_keepalive: InactiveReceiver<Event>,
}

impl std::fmt::Debug for Document {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Document")
      .field("root", &self.root())
      .finish_non_exhaustive()
  }
}

impl Default for Document {
  fn default() -> Self {
    Self::new()
  }
}

impl Document {
  /// Create an empty document containing only its root node.
  pub fn new() -> Self {
    let (mut tx, rx) = async_broadcast::broadcast(EVENT_CHANNEL_CAPACITY);
    tx.set_overflow(true); // Drop oldest messages when full

    let root = NodeId::new();
    let mut nodes = HashMap::new();
    nodes.insert(
      root,
      NodeData {
        kind: NodeKind::Document,
        tag: None,
        attributes: Vec::new(),
        text: None,
      },
    );

    Self {
      state: Arc::new(RwLock::new(DomState {
        root,
        nodes,
        links: TreeLinks::new(),
        observers: BTreeMap::new(),
        events_tx: tx,
      })),
      events_keepalive: rx.deactivate(),
    }
  }

  /// Subscribe to events from this document.
  pub fn subscribe_events(&self) -> Receiver<Event> {
    self.events_keepalive.activate_cloned()
  }

  /// Read state. Never call observer callbacks inside the closure.
  #[inline]
  fn read<R>(&self, f: impl FnOnce(&DomState) -> R) -> R {
    f(&self.state.read())
  }

  /// Write state. Never call observer callbacks inside the closure.
  #[inline]
  fn write<R>(&self, f: impl FnOnce(&mut DomState) -> R) -> R {
    f(&mut self.state.write())
  }

  /// The document node. Always present, never has a parent.
  pub fn root(&self) -> NodeId {
    self.read(|s| s.root)
  }

  // ---- creation (detached nodes, no records) ----

  /// Create a detached element.
  pub fn create_element(&self, tag: &str) -> NodeId {
    self.write(|s| s.insert_node(NodeData::element(tag)))
  }

  /// Create a detached element with initial attributes.
  pub fn create_element_with(&self, tag: &str, attributes: &[(&str, &str)]) -> NodeId {
    let mut data = NodeData::element(tag);
    data.attributes = attributes
      .iter()
      .map(|(k, v)| (k.to_ascii_lowercase(), (*v).to_owned()))
      .collect();
    self.write(|s| s.insert_node(data))
  }

  /// Create a detached text node.
  pub fn create_text(&self, text: &str) -> NodeId {
    self.write(|s| s.insert_node(NodeData::character_data(NodeKind::Text, text)))
  }

  /// Create a detached comment node.
  pub fn create_comment(&self, text: &str) -> NodeId {
    self.write(|s| s.insert_node(NodeData::character_data(NodeKind::Comment, text)))
  }

  // ---- structure ----

  /// Append `child` as the last child of `parent`.
  pub fn append_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
    self.insert_before(parent, child, None)
  }

  /// Insert `child` under `parent` before `reference` (or last if `None`).
  ///
  /// `child` must be detached; move a node by removing it first.
  pub fn insert_before(
    &self,
    parent: NodeId,
    child: NodeId,
    reference: Option<NodeId>,
  ) -> DomResult<()> {
    self.write(|s| {
      let parent_data = s.node(parent)?;
      let child_data = s.node(child)?;
      if !parent_data.can_have_children() || child_data.kind == NodeKind::Document {
        return Err(DomError::HierarchyRequest { parent, child });
      }
      if s.links.parent(child).is_some() {
        return Err(DomError::AlreadyAttached(child));
      }
      if s.links.is_inclusive_ancestor(child, parent) {
        return Err(DomError::HierarchyRequest { parent, child });
      }
      if let Some(r) = reference {
        if s.links.parent(r) != Some(parent) {
          return Err(DomError::NotAChild { parent, child: r });
        }
      }

      s.links.insert(parent, child, reference);
      s.queue_record(MutationRecord::added(parent, vec![child]));
      Ok(())
    })
  }

  /// Detach `child` (and its subtree) from `parent`.
  pub fn remove_child(&self, parent: NodeId, child: NodeId) -> DomResult<()> {
    self.write(|s| {
      s.node(parent)?;
      s.node(child)?;
      if s.links.parent(child) != Some(parent) {
        return Err(DomError::NotAChild { parent, child });
      }

      // Queue while still attached so subtree observers above `parent` see it
      s.queue_record(MutationRecord::removed(parent, vec![child]));
      s.links.detach(child);
      Ok(())
    })
  }

  // ---- attributes & text ----

  /// Set an attribute on an element. Names are case-insensitive.
  pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
    let name = name.to_ascii_lowercase();
    self.write(|s| {
      let data = s.node_mut(node)?;
      if data.kind != NodeKind::Element {
        return Err(DomError::NotAnElement(node));
      }
      match data.attributes.iter_mut().find(|(k, _)| *k == name) {
        Some((_, v)) => value.clone_into(v),
        None => data.attributes.push((name.clone(), value.to_owned())),
      }
      s.queue_record(MutationRecord::attribute(node, name));
      Ok(())
    })
  }

  /// Remove an attribute. Returns whether it was present; absent attributes produce no record.
  pub fn remove_attribute(&self, node: NodeId, name: &str) -> DomResult<bool> {
    let name = name.to_ascii_lowercase();
    self.write(|s| {
      let data = s.node_mut(node)?;
      if data.kind != NodeKind::Element {
        return Err(DomError::NotAnElement(node));
      }
      let before = data.attributes.len();
      data.attributes.retain(|(k, _)| *k != name);
      let removed = data.attributes.len() != before;
      if removed {
        s.queue_record(MutationRecord::attribute(node, name));
      }
      Ok(removed)
    })
  }

  /// Replace the content of a text or comment node.
  pub fn set_text(&self, node: NodeId, text: &str) -> DomResult<()> {
    self.write(|s| {
      let data = s.node_mut(node)?;
      match data.text.as_mut() {
        Some(t) => text.clone_into(t),
        None => return Err(DomError::NotCharacterData(node)),
      }
      s.queue_record(MutationRecord::character_data(node));
      Ok(())
    })
  }

  // ---- queries ----

  /// Kind of `node`, or `None` if it does not exist.
  pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
    self.read(|s| s.nodes.get(&node).map(|d| d.kind))
  }

  /// Lowercase tag name. Elements only.
  pub fn tag_name(&self, node: NodeId) -> Option<String> {
    self.read(|s| s.tag_name(node).map(str::to_owned))
  }

  /// Value of attribute `name` (case-insensitive).
  pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
    let name = name.to_ascii_lowercase();
    self.read(|s| s.attribute(node, &name).map(str::to_owned))
  }

  /// Text content of a text or comment node.
  pub fn text(&self, node: NodeId) -> Option<String> {
    self.read(|s| s.nodes.get(&node)?.text.clone())
  }

  /// Parent of `node`, if attached.
  pub fn parent(&self, node: NodeId) -> Option<NodeId> {
    self.read(|s| s.links.parent(node))
  }

  /// Children of `node` in document order.
  pub fn children(&self, node: NodeId) -> Vec<NodeId> {
    self.read(|s| s.links.children(node).to_vec())
  }

  /// Whether `node` is an element matching `selector`.
  pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
    self.read(|s| selector.matches_in(s, node))
  }

  /// All descendants of `scope` matching `selector`, in document order.
  pub fn query_selector_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
    self.read(|s| s.query_all(scope, selector))
  }

  /// First descendant of `scope` matching `selector`.
  pub fn query_selector(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
    self.read(|s| {
      s.links
        .descendants(scope)
        .into_iter()
        .find(|&id| selector.matches_in(s, id))
    })
  }

  // ---- observation ----

  /// Deliver every observer's pending records as one batch each, in
  /// subscription order. Returns the number of batches delivered.
  pub fn deliver_mutations(&self) -> usize {
    // Step 1: take pending batches (quick write, releases lock)
    let deliveries: Vec<(BatchCallback, ChangeBatch)> = self.write(|s| {
      s.observers
        .values_mut()
        .filter(|o| !o.pending.is_empty())
        .map(|o| (Arc::clone(&o.callback), std::mem::take(&mut o.pending)))
        .collect()
    });

    // Step 2: run callbacks (NO LOCK)
    let batches = deliveries.len();
    for (callback, batch) in deliveries {
      callback(batch);
    }

    if batches > 0 {
      self.read(|s| s.emit(Event::MutationsDelivered { batches }));
    }
    batches
  }

  /// Whether `id` is still registered.
  pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
    self.read(|s| s.observers.contains_key(&id))
  }

  /// Number of live subscriptions.
  pub fn subscription_count(&self) -> usize {
    self.read(|s| s.observers.len())
  }

  /// Wait for elements added under `request.target`, observing this document.
  pub fn wait<F, T>(&self, request: WaitRequest<F>, timer: &T) -> Wait<Self, T>
  where
    F: FnOnce() -> bool,
    T: DeadlineTimer + Clone + Send + Sync + 'static,
  {
    race::wait(request, self, timer)
  }
}

impl ChangeSource for Document {
  fn subscribe(
    &self,
    target: NodeId,
    options: ObserveOptions,
    callback: BatchCallback,
  ) -> SubscriptionId {
    let id = SubscriptionId::new();
    self.write(|s| {
      if !s.nodes.contains_key(&target) {
        log::warn!("Subscribing to unknown node {target}; no changes will be delivered");
      }
      s.observers.insert(
        id,
        Observer {
          target,
          options,
          callback,
          pending: Vec::new(),
        },
      );
    });
    log::debug!("Subscription {id} observing node {target} ({options:?})");
    id
  }

  fn unsubscribe(&self, id: SubscriptionId) {
    if self.write(|s| s.observers.remove(&id)).is_some() {
      log::debug!("Subscription {id} released");
    }
  }
}

impl NodeTree for Document {
  fn kind(&self, node: NodeId) -> Option<NodeKind> {
    Document::kind(self, node)
  }

  fn matches(&self, node: NodeId, selector: &Selector) -> bool {
    Document::matches(self, node, selector)
  }

  fn query_descendants(&self, node: NodeId, selector: &Selector) -> Vec<NodeId> {
    self.query_selector_all(node, selector)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::MutationKind;
  use parking_lot::Mutex;

  fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
  }

  /// Subscribe and collect delivered batches.
  fn record(
    doc: &Document,
    target: NodeId,
    options: ObserveOptions,
  ) -> (SubscriptionId, Arc<Mutex<Vec<ChangeBatch>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let id = doc.subscribe(target, options, Arc::new(move |batch: ChangeBatch| sink.lock().push(batch)));
    (id, seen)
  }

  fn body(doc: &Document) -> NodeId {
    let body = doc.create_element("body");
    doc.append_child(doc.root(), body).unwrap();
    body
  }

  #[test]
  fn append_queues_child_list_record() {
    let doc = Document::new();
    let body = body(&doc);
    let (_, seen) = record(&doc, body, ObserveOptions::default());

    let div = doc.create_element("div");
    doc.append_child(body, div).unwrap();
    assert!(seen.lock().is_empty(), "nothing delivered before checkpoint");

    assert_eq!(doc.deliver_mutations(), 1);
    let batches = seen.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], vec![MutationRecord::added(body, vec![div])]);
  }

  #[test]
  fn records_batch_until_delivery() {
    let doc = Document::new();
    let body = body(&doc);
    let (_, seen) = record(&doc, body, ObserveOptions::default());

    let a = doc.create_element("a");
    let b = doc.create_element("b");
    doc.append_child(body, a).unwrap();
    doc.append_child(body, b).unwrap();
    doc.deliver_mutations();

    let batches = seen.lock();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
    assert_eq!(batches[0][1].added, vec![b]);
  }

  #[test]
  fn non_subtree_observer_ignores_grandchildren() {
    let doc = Document::new();
    let body = body(&doc);
    let wrapper = doc.create_element("div");
    doc.append_child(body, wrapper).unwrap();
    doc.deliver_mutations();

    let (_, direct) = record(&doc, body, ObserveOptions::default());
    let (_, deep) = record(&doc, body, ObserveOptions::subtree());

    let inner = doc.create_element("span");
    doc.append_child(wrapper, inner).unwrap();
    doc.deliver_mutations();

    assert!(direct.lock().is_empty());
    assert_eq!(deep.lock().len(), 1);
  }

  #[test]
  fn attribute_records_need_attribute_option() {
    let doc = Document::new();
    let body = body(&doc);
    let (_, plain) = record(&doc, body, ObserveOptions::default());
    let (_, attrs) = record(&doc, body, ObserveOptions::default().with_attributes(true));

    doc.set_attribute(body, "Class", "dark").unwrap();
    doc.deliver_mutations();

    assert!(plain.lock().is_empty());
    let batches = attrs.lock();
    assert_eq!(batches[0][0].kind, MutationKind::Attributes);
    assert_eq!(batches[0][0].attribute_name.as_deref(), Some("class"));
    assert_eq!(doc.attribute(body, "CLASS").as_deref(), Some("dark"));
  }

  #[test]
  fn remove_attribute_only_records_when_present() {
    let doc = Document::new();
    let body = body(&doc);
    let (_, seen) = record(&doc, body, ObserveOptions::default().with_attributes(true));

    assert!(!doc.remove_attribute(body, "id").unwrap());
    doc.set_attribute(body, "id", "x").unwrap();
    assert!(doc.remove_attribute(body, "id").unwrap());
    doc.deliver_mutations();

    assert_eq!(seen.lock()[0].len(), 2);
  }

  #[test]
  fn character_data_records() {
    let doc = Document::new();
    let body = body(&doc);
    let text = doc.create_text("hello");
    doc.append_child(body, text).unwrap();
    doc.deliver_mutations();

    let (_, seen) = record(
      &doc,
      body,
      ObserveOptions::subtree()
        .with_child_list(false)
        .with_character_data(true),
    );
    doc.set_text(text, "bye").unwrap();
    doc.deliver_mutations();

    assert_eq!(doc.text(text).as_deref(), Some("bye"));
    assert_eq!(seen.lock()[0][0].kind, MutationKind::CharacterData);
    assert_eq!(doc.set_text(body, "x"), Err(DomError::NotCharacterData(body)));
  }

  #[test]
  fn removal_seen_by_subtree_observer_above_parent() {
    let doc = Document::new();
    let body = body(&doc);
    let list = doc.create_element("ul");
    let item = doc.create_element("li");
    doc.append_child(body, list).unwrap();
    doc.append_child(list, item).unwrap();
    doc.deliver_mutations();

    let (_, seen) = record(&doc, body, ObserveOptions::subtree());
    doc.remove_child(list, item).unwrap();
    doc.deliver_mutations();

    let batches = seen.lock();
    assert_eq!(batches[0], vec![MutationRecord::removed(list, vec![item])]);
    assert_eq!(doc.parent(item), None);
  }

  #[test]
  fn structural_errors() {
    let doc = Document::new();
    let body = body(&doc);
    let div = doc.create_element("div");
    let text = doc.create_text("t");
    doc.append_child(body, div).unwrap();

    assert_eq!(doc.append_child(body, div), Err(DomError::AlreadyAttached(div)));
    assert_eq!(
      doc.append_child(div, body),
      Err(DomError::AlreadyAttached(body))
    );
    let p = doc.create_element("p");
    assert_eq!(
      doc.append_child(text, p),
      Err(DomError::HierarchyRequest {
        parent: text,
        child: p
      })
    );
    assert_eq!(
      doc.remove_child(div, body),
      Err(DomError::NotAChild {
        parent: div,
        child: body
      })
    );
    assert_eq!(
      doc.append_child(NodeId(0), div),
      Err(DomError::NodeNotFound(NodeId(0)))
    );
    assert_eq!(doc.set_attribute(text, "a", "b"), Err(DomError::NotAnElement(text)));
  }

  #[test]
  fn cycles_are_rejected() {
    let doc = Document::new();
    let outer = doc.create_element("div");
    let inner = doc.create_element("div");
    doc.append_child(outer, inner).unwrap();

    assert_eq!(
      doc.append_child(inner, outer),
      Err(DomError::HierarchyRequest {
        parent: inner,
        child: outer
      })
    );
    assert_eq!(
      doc.append_child(outer, outer),
      Err(DomError::HierarchyRequest {
        parent: outer,
        child: outer
      })
    );
  }

  #[test]
  fn insert_before_reference() {
    let doc = Document::new();
    let body = body(&doc);
    let a = doc.create_element("a");
    let b = doc.create_element("b");
    doc.append_child(body, a).unwrap();
    doc.insert_before(body, b, Some(a)).unwrap();
    assert_eq!(doc.children(body), vec![b, a]);

    let c = doc.create_element("c");
    assert_eq!(
      doc.insert_before(body, c, Some(c)),
      Err(DomError::NotAChild {
        parent: body,
        child: c
      })
    );
  }

  #[test]
  fn query_selector_all_in_document_order() {
    let doc = Document::new();
    let body = body(&doc);
    let first = doc.create_element_with("div", &[("class", "card")]);
    let nested = doc.create_element_with("div", &[("class", "card")]);
    let last = doc.create_element_with("div", &[("class", "card")]);
    doc.append_child(body, first).unwrap();
    doc.append_child(first, nested).unwrap();
    doc.append_child(body, last).unwrap();

    assert_eq!(
      doc.query_selector_all(doc.root(), &sel("div.card")),
      vec![first, nested, last]
    );
    assert_eq!(doc.query_selector(body, &sel(".card .card")), Some(nested));
    assert_eq!(doc.query_selector(body, &sel("span")), None);
    assert_eq!(doc.tag_name(first).as_deref(), Some("div"));
  }

  #[test]
  fn unsubscribe_is_idempotent_and_stops_delivery() {
    let doc = Document::new();
    let body = body(&doc);
    let (id, seen) = record(&doc, body, ObserveOptions::default());
    assert!(doc.is_subscribed(id));

    doc.unsubscribe(id);
    doc.unsubscribe(id);
    assert!(!doc.is_subscribed(id));
    assert_eq!(doc.subscription_count(), 0);

    doc.append_child(body, doc.create_element("p")).unwrap();
    assert_eq!(doc.deliver_mutations(), 0);
    assert!(seen.lock().is_empty());
  }

  #[test]
  fn callback_may_unsubscribe_itself() {
    let doc = Document::new();
    let body = body(&doc);
    let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
    let (doc2, slot2) = (doc.clone(), Arc::clone(&slot));
    let id = doc.subscribe(
      body,
      ObserveOptions::default(),
      Arc::new(move |_: ChangeBatch| {
        if let Some(id) = *slot2.lock() {
          doc2.unsubscribe(id);
        }
      }),
    );
    *slot.lock() = Some(id);

    doc.append_child(body, doc.create_element("p")).unwrap();
    assert_eq!(doc.deliver_mutations(), 1);
    assert!(!doc.is_subscribed(id));
  }

  #[test]
  fn events_are_broadcast() {
    let doc = Document::new();
    let mut events = doc.subscribe_events();
    let body = body(&doc);
    doc.deliver_mutations();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
      seen.push(serde_json::to_value(&event).unwrap()["event"].clone());
    }
    assert_eq!(seen, vec!["node:created", "tree:mutated"]);

    let (_, _batches) = record(&doc, body, ObserveOptions::default());
    doc.append_child(body, doc.create_element("p")).unwrap();
    doc.deliver_mutations();
    let last = std::iter::from_fn(|| events.try_recv().ok()).last().unwrap();
    assert!(matches!(last, Event::MutationsDelivered { batches: 1 }));
  }
}
