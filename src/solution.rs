use indexmap::IndexMap;
use serde::Serialize;

use crate::occurrence::OccurrenceRef;
use crate::value::Value;

/// Variable assignments of one solution, in binding order.
pub type Bindings = IndexMap<String, Value>;

/// One way the pattern fits the tree: bindings, the refs backing each
/// binding, and the ref of the match root itself.
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub bindings: Bindings,
    /// Per name, every region the binding was observed at, in match
    /// order. Names here and in `bindings` coincide.
    pub at: IndexMap<String, Vec<OccurrenceRef>>,
    /// Where the whole match is anchored.
    pub where_: OccurrenceRef,
}

impl Solution {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    /// Dedup key over the named bindings; names absent from the solution
    /// serialize as a hole so `unique` can tell them apart from bound
    /// nulls.
    pub fn key_of(&self, names: &[String]) -> String {
        let mut out = String::new();
        for name in names {
            match self.bindings.get(name) {
                Some(v) => v.write_structural_key(&mut out),
                None => out.push('?'),
            }
            out.push('\u{1f}');
        }
        out
    }
}
