/*!
Domwait - single-shot waits for elements added to an observed tree

```
use domwait::{Document, ManualTimer, WaitRequest};
use futures::FutureExt;

let doc = Document::new();
let body = doc.create_element("body");
doc.append_child(doc.root(), body)?;
let timer = ManualTimer::new();

// Subscribe, arm a 500ms deadline, then run the trigger
let wait = doc.wait(
  WaitRequest::passive(body).query("div.card".parse()?).timeout_ms(500),
  &timer,
);

timer.advance_ms(50);
let card = doc.create_element_with("div", &[("class", "card")]);
doc.append_child(body, card)?;
doc.deliver_mutations();

assert_eq!(wait.now_or_never(), Some(Ok(vec![card])));
# Ok::<(), Box<dyn std::error::Error>>(())
```

Any tree can be waited on by implementing [`ChangeSource`] and [`NodeTree`];
any clock by implementing [`DeadlineTimer`]. See [`wait`].
*/

mod dom;
mod extract;
mod race;
mod request;
mod selector;
mod services;
mod timer;

mod types;
pub use types::*;

pub use crate::dom::Document;
pub use crate::extract::{search_batch, MatchResult};
pub use crate::race::{wait, Wait};
pub use crate::request::WaitRequest;
pub use crate::selector::Selector;
pub use crate::services::{BatchCallback, ChangeSource, DeadlineTimer, NodeTree, TimerCallback};
pub use crate::timer::{ManualTimer, ThreadTimer};
