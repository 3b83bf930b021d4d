//! Path-based occurrence references.
//!
//! A ref never holds a pointer into the tree: it is a path of keys and
//! indices from the query root plus a site description. The edit planner
//! re-derives every location against whatever tree it is handed, so refs
//! stay valid (or detectably stale) across rewrites.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Path(pub Vec<Step>);

impl Path {
    pub fn root() -> Self {
        Path(Vec::new())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Navigates the path inside `tree`.
    pub fn deref<'t>(&self, tree: &'t Value) -> Option<&'t Value> {
        let mut node = tree;
        for step in &self.0 {
            node = match (step, node) {
                (Step::Key(k), Value::Map(map)) => map.get(k)?,
                (Step::Index(i), Value::Seq(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Deterministic text form, used for planner tie-breaking.
    pub fn sort_key(&self) -> String {
        let mut out = String::new();
        for step in &self.0 {
            match step {
                Step::Key(k) => {
                    out.push('.');
                    out.push_str(k);
                }
                Step::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("$")
        } else {
            f.write_str(&self.sort_key())
        }
    }
}

/// Persistent path used while matching: descending shares the parent
/// spine, so extending is O(1) and choice points can hold paths freely.
#[derive(Debug)]
pub(crate) enum PathCell {
    Root,
    Step { parent: Rc<PathCell>, step: Step },
}

impl PathCell {
    pub(crate) fn root() -> Rc<PathCell> {
        Rc::new(PathCell::Root)
    }

    pub(crate) fn push(parent: &Rc<PathCell>, step: Step) -> Rc<PathCell> {
        Rc::new(PathCell::Step {
            parent: Rc::clone(parent),
            step,
        })
    }

    pub(crate) fn to_path(&self) -> Path {
        let mut steps = Vec::new();
        let mut cell = self;
        while let PathCell::Step { parent, step } = cell {
            steps.push(step.clone());
            cell = parent.as_ref();
        }
        steps.reverse();
        Path(steps)
    }
}

/// A minimal, immutable description of where a match region lives.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OccurrenceRef {
    /// The value at `path` itself.
    Node { path: Path },
    /// A half-open index range of the sequence at `path`.
    ArraySlice {
        path: Path,
        start: usize,
        end: usize,
    },
    /// The value under `key` of the mapping at `path`.
    ObjectValue { path: Path, key: String },
    /// A key set of the mapping at `path` (remainders, key renames).
    ObjectKeys { path: Path, keys: Vec<String> },
}

impl OccurrenceRef {
    pub fn path(&self) -> &Path {
        match self {
            OccurrenceRef::Node { path }
            | OccurrenceRef::ArraySlice { path, .. }
            | OccurrenceRef::ObjectValue { path, .. }
            | OccurrenceRef::ObjectKeys { path, .. } => path,
        }
    }

    /// Depth used for deepest-first planning: sites below the container
    /// count one level past the container path.
    pub fn depth(&self) -> usize {
        match self {
            OccurrenceRef::Node { path } => path.depth(),
            _ => self.path().depth() + 1,
        }
    }

    /// Materializes the referenced region out of `tree`.
    pub fn deref(&self, tree: &Value) -> Option<Value> {
        match self {
            OccurrenceRef::Node { path } => path.deref(tree).cloned(),
            OccurrenceRef::ArraySlice { path, start, end } => {
                let items = path.deref(tree)?.as_seq()?;
                if *start > *end || *end > items.len() {
                    return None;
                }
                Some(Value::Seq(items[*start..*end].to_vec()))
            }
            OccurrenceRef::ObjectValue { path, key } => {
                path.deref(tree)?.as_map()?.get(key).cloned()
            }
            OccurrenceRef::ObjectKeys { path, keys } => {
                let map = path.deref(tree)?.as_map()?;
                let mut projection = IndexMap::new();
                for key in keys {
                    projection.insert(key.clone(), map.get(key)?.clone());
                }
                Some(Value::Map(projection))
            }
        }
    }

    /// Deterministic text form for dedup and tie-breaking.
    pub fn sort_key(&self) -> String {
        match self {
            OccurrenceRef::Node { path } => format!("{}!", path.sort_key()),
            OccurrenceRef::ArraySlice { path, start, end } => {
                format!("{}[{}..{}]", path.sort_key(), start, end)
            }
            OccurrenceRef::ObjectValue { path, key } => {
                format!("{}.{}", path.sort_key(), key)
            }
            OccurrenceRef::ObjectKeys { path, keys } => {
                format!("{}#{}", path.sort_key(), keys.join(","))
            }
        }
    }
}
