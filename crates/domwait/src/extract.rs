/*!
Match extraction over change batches.

Pure: reads the tree, never mutates it, and gives the same answer for the same
tree and batch. Every added element counts as new along with its whole subtree,
so an added node and its matching descendants can all appear in one result.
*/

use crate::selector::Selector;
use crate::services::NodeTree;
use crate::types::{MutationRecord, NodeId};

/// Outcome of searching one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
  /// No added element matched.
  NoMatch,
  /// Matching elements in record, node, then document order. Never empty.
  Matches(Vec<NodeId>),
}

impl MatchResult {
  /// Whether any element matched.
  pub const fn is_match(&self) -> bool {
    matches!(self, MatchResult::Matches(_))
  }
}

/// Find elements matching `query` among the nodes added in `batch`.
///
/// For each added element (text and comment nodes are skipped without being
/// traversed), the element itself is included if it matches, followed by its
/// matching descendants. Overlapping subtrees reported in separate records
/// yield duplicates; they are kept.
pub fn search_batch<R: NodeTree + ?Sized>(
  tree: &R,
  batch: &[MutationRecord],
  query: &Selector,
) -> MatchResult {
  if batch.iter().all(|record| record.added.is_empty()) {
    return MatchResult::NoMatch;
  }

  let mut found = Vec::new();
  for &node in batch.iter().flat_map(|record| &record.added) {
    if !tree.kind(node).is_some_and(|kind| kind.is_element()) {
      continue;
    }
    if tree.matches(node, query) {
      found.push(node);
    }
    found.extend(tree.query_descendants(node, query));
  }

  if found.is_empty() {
    MatchResult::NoMatch
  } else {
    MatchResult::Matches(found)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dom::Document;
  use crate::types::{NodeKind, ObserveOptions};

  fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
  }

  /// Document with an attached `body`.
  fn doc_with_body() -> (Document, NodeId) {
    let doc = Document::new();
    let body = doc.create_element("body");
    doc.append_child(doc.root(), body).unwrap();
    (doc, body)
  }

  #[test]
  fn empty_batch_is_no_match() {
    let (doc, _) = doc_with_body();
    assert_eq!(search_batch(&doc, &[], &Selector::universal()), MatchResult::NoMatch);
  }

  #[test]
  fn batch_without_added_nodes_is_no_match() {
    let (doc, body) = doc_with_body();
    let batch = vec![
      MutationRecord::attribute(body, "class"),
      MutationRecord::removed(body, vec![doc.create_element("p")]),
    ];
    assert_eq!(search_batch(&doc, &batch, &Selector::universal()), MatchResult::NoMatch);
  }

  #[test]
  fn added_node_matching_itself() {
    let (doc, body) = doc_with_body();
    let card = doc.create_element_with("div", &[("class", "card")]);
    let span = doc.create_element("span");
    doc.append_child(body, card).unwrap();
    doc.append_child(body, span).unwrap();

    let batch = vec![
      MutationRecord::added(body, vec![card]),
      MutationRecord::added(body, vec![span]),
    ];
    assert_eq!(
      search_batch(&doc, &batch, &sel("div.card")),
      MatchResult::Matches(vec![card])
    );
  }

  #[test]
  fn descendants_follow_their_root_in_document_order() {
    let (doc, body) = doc_with_body();
    // wrapper(div) -> [a(div.card) -> [b(div.card)], c(span)]
    let wrapper = doc.create_element("div");
    let a = doc.create_element_with("div", &[("class", "card")]);
    let b = doc.create_element_with("div", &[("class", "card")]);
    let c = doc.create_element("span");
    doc.append_child(wrapper, a).unwrap();
    doc.append_child(a, b).unwrap();
    doc.append_child(wrapper, c).unwrap();
    doc.append_child(body, wrapper).unwrap();
    let later = doc.create_element_with("div", &[("class", "card")]);
    doc.append_child(body, later).unwrap();

    let batch = vec![MutationRecord::added(body, vec![wrapper, later])];

    assert_eq!(
      search_batch(&doc, &batch, &sel(".card")),
      MatchResult::Matches(vec![a, b, later])
    );
    assert_eq!(
      search_batch(&doc, &batch, &sel("div")),
      MatchResult::Matches(vec![wrapper, a, b, later])
    );
  }

  #[test]
  fn only_descendant_matches() {
    let (doc, body) = doc_with_body();
    let section = doc.create_element("section");
    let player = doc.create_element("vrtnu-player");
    doc.append_child(section, player).unwrap();
    doc.append_child(body, section).unwrap();

    let batch = vec![MutationRecord::added(body, vec![section])];
    assert_eq!(
      search_batch(&doc, &batch, &sel("vrtnu-player")),
      MatchResult::Matches(vec![player])
    );
  }

  #[test]
  fn non_element_nodes_are_skipped() {
    let (doc, body) = doc_with_body();
    let text = doc.create_text("hi");
    let comment = doc.create_comment("note");
    doc.append_child(body, text).unwrap();
    doc.append_child(body, comment).unwrap();

    assert_eq!(doc.kind(text), Some(NodeKind::Text));
    let batch = vec![MutationRecord::added(body, vec![text, comment])];
    assert_eq!(search_batch(&doc, &batch, &Selector::universal()), MatchResult::NoMatch);
  }

  #[test]
  fn overlapping_subtrees_keep_duplicates() {
    let (doc, body) = doc_with_body();
    let outer = doc.create_element("div");
    let inner = doc.create_element("p");
    doc.append_child(outer, inner).unwrap();
    doc.append_child(body, outer).unwrap();

    let batch = vec![
      MutationRecord::added(body, vec![outer]),
      MutationRecord::added(outer, vec![inner]),
    ];
    assert_eq!(
      search_batch(&doc, &batch, &sel("p")),
      MatchResult::Matches(vec![inner, inner])
    );
  }

  #[test]
  fn works_on_delivered_batches() {
    let (doc, body) = doc_with_body();
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
    let (sink, reader) = (std::sync::Arc::clone(&seen), doc.clone());
    crate::ChangeSource::subscribe(
      &doc,
      body,
      ObserveOptions::default(),
      std::sync::Arc::new(move |batch: crate::ChangeBatch| {
        *sink.lock() = Some(search_batch(&reader, &batch, &Selector::universal()));
      }),
    );

    let img = doc.create_element("img");
    doc.append_child(body, img).unwrap();
    doc.deliver_mutations();

    assert_eq!(*seen.lock(), Some(MatchResult::Matches(vec![img])));
  }
}
