/*!
Selector parsing and matching.

Supports the subset of CSS selectors callers use to pick out added elements:

- selector lists: `a, b`
- combinators: descendant (`a b`) and child (`a > b`)
- compounds: type or `*`, `#id`, `.class`
- attributes: `[a]`, `[a=v]`, `[a~=v]`, `[a^=v]`, `[a$=v]`, `[a*=v]` (values may be quoted)

Type and attribute names are ASCII case-insensitive. Matching walks ancestors
through the whole tree, the way DOM `matches` does, so `section .card` matches a
`.card` whose `section` ancestor sits above the node a query started from.
*/

use std::fmt;
use std::str::FromStr;

use crate::types::{NodeId, SelectorError, SelectorResult};

/// What the matcher needs from a tree.
pub(crate) trait ElementView {
  /// Lowercase tag name, or `None` if `node` is not an element.
  fn tag_name(&self, node: NodeId) -> Option<&str>;
  /// Attribute value by lowercase name.
  fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;
  fn parent(&self, node: NodeId) -> Option<NodeId>;
}

/// A parsed selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
  source: String,
  alternatives: Vec<Complex>,
}

/// Compounds joined by combinators, left to right.
/// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
  compounds: Vec<Compound>,
  combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
  Descendant,
  Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
  /// `None` = universal.
  tag: Option<String>,
  conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
  Id(String),
  Class(String),
  Attribute {
    name: String,
    test: Option<(AttrOp, String)>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
  Equals,
  Includes,
  Prefix,
  Suffix,
  Substring,
}

impl Selector {
  /// The universal selector `*`, used when no query is given.
  pub fn universal() -> Self {
    Self {
      source: "*".to_owned(),
      alternatives: vec![Complex {
        compounds: vec![Compound::default()],
        combinators: Vec::new(),
      }],
    }
  }

  /// Parse a selector list.
  pub fn parse(input: &str) -> SelectorResult<Self> {
    let alternatives = Parser::new(input).parse_list()?;
    Ok(Self {
      source: input.trim().to_owned(),
      alternatives,
    })
  }

  /// The selector text as given (trimmed).
  pub fn as_str(&self) -> &str {
    &self.source
  }

  /// Whether this is exactly `*`.
  pub fn is_universal(&self) -> bool {
    matches!(
      self.alternatives.as_slice(),
      [Complex { compounds, .. }] if matches!(compounds.as_slice(), [c] if c.tag.is_none() && c.conditions.is_empty())
    )
  }

  /// Match `node` against this selector using `view` for tree access.
  pub(crate) fn matches_in<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
    view.tag_name(node).is_some() && self.alternatives.iter().any(|c| c.matches(view, node))
  }
}

impl Default for Selector {
  fn default() -> Self {
    Self::universal()
  }
}

impl FromStr for Selector {
  type Err = SelectorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.source)
  }
}

impl Complex {
  fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
    match self.compounds.len().checked_sub(1) {
      Some(last) => self.matches_from(view, last, node),
      None => false,
    }
  }

  /// Match compounds `0..=idx` with `compounds[idx]` anchored at `node`.
  fn matches_from<V: ElementView + ?Sized>(&self, view: &V, idx: usize, node: NodeId) -> bool {
    let Some(compound) = self.compounds.get(idx) else {
      return false;
    };
    if !compound.matches(view, node) {
      return false;
    }
    let Some(prev) = idx.checked_sub(1) else {
      return true;
    };

    match self.combinators.get(prev) {
      Some(Combinator::Child) => view
        .parent(node)
        .is_some_and(|p| view.tag_name(p).is_some() && self.matches_from(view, prev, p)),
      Some(Combinator::Descendant) => {
        let mut ancestor = view.parent(node);
        while let Some(a) = ancestor {
          if view.tag_name(a).is_some() && self.matches_from(view, prev, a) {
            return true;
          }
          ancestor = view.parent(a);
        }
        false
      }
      None => false,
    }
  }
}

impl Compound {
  fn is_empty(&self) -> bool {
    self.tag.is_none() && self.conditions.is_empty()
  }

  fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
    let Some(tag) = view.tag_name(node) else {
      return false;
    };
    if let Some(want) = &self.tag {
      if want != tag {
        return false;
      }
    }
    self.conditions.iter().all(|c| c.matches(view, node))
  }
}

impl Condition {
  fn matches<V: ElementView + ?Sized>(&self, view: &V, node: NodeId) -> bool {
    match self {
      Condition::Id(id) => view.attribute(node, "id") == Some(id.as_str()),
      Condition::Class(class) => view
        .attribute(node, "class")
        .is_some_and(|v| v.split_ascii_whitespace().any(|c| c == class)),
      Condition::Attribute { name, test } => {
        let Some(value) = view.attribute(node, name) else {
          return false;
        };
        match test {
          None => true,
          Some((op, want)) => op.test(value, want),
        }
      }
    }
  }
}

impl AttrOp {
  fn test(self, value: &str, want: &str) -> bool {
    match self {
      AttrOp::Equals => value == want,
      AttrOp::Includes => !want.is_empty() && value.split_ascii_whitespace().any(|w| w == want),
      AttrOp::Prefix => !want.is_empty() && value.starts_with(want),
      AttrOp::Suffix => !want.is_empty() && value.ends_with(want),
      AttrOp::Substring => !want.is_empty() && value.contains(want),
    }
  }
}

/// Recursive-descent parser over `(byte offset, char)` pairs.
struct Parser {
  chars: Vec<(usize, char)>,
  pos: usize,
  len: usize,
}

impl Parser {
  fn new(input: &str) -> Self {
    Self {
      chars: input.char_indices().collect(),
      pos: 0,
      len: input.len(),
    }
  }

  fn peek(&self) -> Option<char> {
    self.chars.get(self.pos).map(|&(_, c)| c)
  }

  fn peek_at(&self, ahead: usize) -> Option<char> {
    self.chars.get(self.pos + ahead).map(|&(_, c)| c)
  }

  fn offset(&self) -> usize {
    self.chars.get(self.pos).map_or(self.len, |&(o, _)| o)
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek();
    if c.is_some() {
      self.pos += 1;
    }
    c
  }

  /// Skip whitespace. Returns true if any was skipped.
  fn skip_ws(&mut self) -> bool {
    let start = self.pos;
    while self.peek().is_some_and(char::is_whitespace) {
      self.pos += 1;
    }
    self.pos != start
  }

  fn unexpected(&self) -> SelectorError {
    match self.peek() {
      Some(found) => SelectorError::UnexpectedChar {
        found,
        offset: self.offset(),
      },
      None => SelectorError::UnexpectedEnd {
        offset: self.offset(),
      },
    }
  }

  fn unsupported(&self, syntax: &str) -> SelectorError {
    SelectorError::Unsupported {
      syntax: syntax.to_owned(),
      offset: self.offset(),
    }
  }

  fn parse_list(&mut self) -> SelectorResult<Vec<Complex>> {
    self.skip_ws();
    if self.peek().is_none() {
      return Err(SelectorError::Empty);
    }

    let mut list = vec![self.parse_complex()?];
    while self.peek() == Some(',') {
      self.bump();
      self.skip_ws();
      list.push(self.parse_complex()?);
    }

    match self.peek() {
      None => Ok(list),
      Some(_) => Err(self.unexpected()),
    }
  }

  fn parse_complex(&mut self) -> SelectorResult<Complex> {
    let mut compounds = vec![self.parse_compound()?];
    let mut combinators = Vec::new();

    loop {
      let had_ws = self.skip_ws();
      let combinator = match self.peek() {
        None | Some(',') => break,
        Some('>') => {
          self.bump();
          self.skip_ws();
          Combinator::Child
        }
        Some('+') => return Err(self.unsupported("+")),
        Some('~') => return Err(self.unsupported("~")),
        Some(_) if had_ws => Combinator::Descendant,
        Some(_) => return Err(self.unexpected()),
      };
      combinators.push(combinator);
      compounds.push(self.parse_compound()?);
    }

    Ok(Complex {
      compounds,
      combinators,
    })
  }

  fn parse_compound(&mut self) -> SelectorResult<Compound> {
    let mut compound = Compound::default();
    let mut universal = false;

    match self.peek() {
      Some('*') => {
        self.bump();
        universal = true;
      }
      Some(c) if is_ident_char(c) => {
        compound.tag = Some(self.parse_ident()?.to_ascii_lowercase());
      }
      _ => {}
    }

    loop {
      match self.peek() {
        Some('#') => {
          self.bump();
          compound.conditions.push(Condition::Id(self.parse_ident()?));
        }
        Some('.') => {
          self.bump();
          compound.conditions.push(Condition::Class(self.parse_ident()?));
        }
        Some('[') => {
          self.bump();
          compound.conditions.push(self.parse_attribute()?);
        }
        Some(':') => return Err(self.unsupported(":")),
        _ => break,
      }
    }

    if compound.is_empty() && !universal {
      return Err(self.unexpected());
    }
    Ok(compound)
  }

  fn parse_ident(&mut self) -> SelectorResult<String> {
    let mut ident = String::new();
    while let Some(c) = self.peek().filter(|&c| is_ident_char(c)) {
      ident.push(c);
      self.pos += 1;
    }
    if ident.is_empty() {
      return Err(self.unexpected());
    }
    Ok(ident)
  }

  fn parse_attribute(&mut self) -> SelectorResult<Condition> {
    self.skip_ws();
    let name = self.parse_ident()?.to_ascii_lowercase();
    self.skip_ws();

    let op = match (self.peek(), self.peek_at(1)) {
      (Some(']'), _) => {
        self.bump();
        return Ok(Condition::Attribute { name, test: None });
      }
      (Some('='), _) => {
        self.bump();
        AttrOp::Equals
      }
      (Some(c), Some('=')) => {
        let op = match c {
          '~' => AttrOp::Includes,
          '^' => AttrOp::Prefix,
          '$' => AttrOp::Suffix,
          '*' => AttrOp::Substring,
          '|' => return Err(self.unsupported("|=")),
          _ => return Err(self.unexpected()),
        };
        self.bump();
        self.bump();
        op
      }
      _ => return Err(self.unexpected()),
    };

    self.skip_ws();
    let value = match self.peek() {
      Some(q @ ('"' | '\'')) => {
        self.bump();
        let mut value = String::new();
        loop {
          match self.bump() {
            Some(c) if c == q => break,
            Some(c) => value.push(c),
            None => return Err(self.unexpected()),
          }
        }
        value
      }
      _ => self.parse_ident()?,
    };
    self.skip_ws();

    if self.peek() != Some(']') {
      return Err(self.unexpected());
    }
    self.bump();

    Ok(Condition::Attribute {
      name,
      test: Some((op, value)),
    })
  }
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}
