//! The edit planner: solutions + replacement plans → a fresh tree.
//!
//! Deterministic by construction: deepest match roots first, ties broken
//! by the textual form of the root ref, duplicate refs applied once,
//! slice edits within one container applied right-to-left. The input
//! tree is never touched; edits land on a clone and a stale solution
//! (its region changed under an earlier edit) is skipped silently.

use indexmap::IndexMap;

use crate::error::{MatchError, MatchResult};
use crate::occurrence::{OccurrenceRef, Path};
use crate::solution::Solution;
use crate::value::Value;

/// Replacement values keyed by variable name. The synthetic name `"0"`
/// (or `"$0"`) targets the match root.
pub type Plan = IndexMap<String, Value>;

/// One concrete tree edit, as produced from a plan or handed back by an
/// `edit` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub at: OccurrenceRef,
    pub op: EditOp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    Replace(Value),
    /// Rename the single key of an `ObjectKeys` ref.
    Rename(String),
}

/// Expands a plan against one solution's refs.
pub fn plan_edits(solution: &Solution, plan: &Plan) -> Vec<Edit> {
    let mut edits = Vec::new();
    for (name, value) in plan {
        if name == "0" || name == "$0" {
            edits.push(Edit {
                at: solution.where_.clone(),
                op: EditOp::Replace(value.clone()),
            });
            continue;
        }
        // Names the solution never bound contribute nothing.
        if let Some(refs) = solution.at.get(name) {
            for refr in refs {
                let op = match (refr, value) {
                    // A string against a key-set ref is a rename.
                    (OccurrenceRef::ObjectKeys { .. }, Value::String(s)) => {
                        EditOp::Rename(s.clone())
                    }
                    _ => EditOp::Replace(value.clone()),
                };
                edits.push(Edit {
                    at: refr.clone(),
                    op,
                });
            }
        }
    }
    edits
}

/// Applies `(solution, edits)` batches to a clone of `original`.
pub fn apply_edits(
    original: &Value,
    mut batches: Vec<(Solution, Vec<Edit>)>,
) -> MatchResult<Value> {
    // Deepest match roots first; ties by the textual ref form.
    batches.sort_by(|(a, _), (b, _)| {
        b.where_
            .depth()
            .cmp(&a.where_.depth())
            .then_with(|| a.where_.sort_key().cmp(&b.where_.sort_key()))
    });

    let mut result = original.clone();
    let mut applied: std::collections::HashSet<String> = std::collections::HashSet::new();

    for (_, mut edits) in batches {
        // Dedupe by ref; first occurrence wins.
        let mut batch_seen = std::collections::HashSet::new();
        edits.retain(|e| batch_seen.insert(e.at.sort_key()));
        edits.retain(|e| !applied.contains(&e.at.sort_key()));

        // Stale check: every targeted region must still hold what the
        // original tree held there.
        let stale = edits.iter().any(|e| {
            let recorded = e.at.deref(original);
            let live = e.at.deref(&result);
            recorded.is_none() || recorded != live
        });
        if stale {
            continue;
        }

        // Non-slice edits first, then slice edits right-to-left within
        // each container so earlier splices cannot shift later indices.
        let (mut slices, others): (Vec<Edit>, Vec<Edit>) = edits
            .into_iter()
            .partition(|e| matches!(e.at, OccurrenceRef::ArraySlice { .. }));
        slices.sort_by(|a, b| {
            let (pa, sa) = slice_key(&a.at);
            let (pb, sb) = slice_key(&b.at);
            pa.cmp(&pb).then(sb.cmp(&sa))
        });
        for edit in others.into_iter().chain(slices) {
            applied.insert(edit.at.sort_key());
            apply_one(&mut result, &edit)?;
        }
    }
    Ok(result)
}

fn slice_key(refr: &OccurrenceRef) -> (String, usize) {
    match refr {
        OccurrenceRef::ArraySlice { path, start, .. } => (path.sort_key(), *start),
        _ => (String::new(), 0),
    }
}

fn apply_one(tree: &mut Value, edit: &Edit) -> MatchResult<()> {
    match (&edit.at, &edit.op) {
        (OccurrenceRef::Node { path }, EditOp::Replace(v)) => {
            let Some(target) = navigate_mut(tree, path) else {
                return Ok(());
            };
            *target = v.clone();
        }
        (OccurrenceRef::ObjectValue { path, key }, EditOp::Replace(v)) => {
            let Some(Value::Map(map)) = navigate_mut(tree, path) else {
                return Ok(());
            };
            map.insert(key.clone(), v.clone());
        }
        (OccurrenceRef::ArraySlice { path, start, end }, EditOp::Replace(v)) => {
            let Some(Value::Seq(items)) = navigate_mut(tree, path) else {
                return Ok(());
            };
            if *start > items.len() || *end > items.len() || start > end {
                return Ok(());
            }
            let replacement = match v {
                // A sequence splices in; anything else is one element.
                Value::Seq(elems) => elems.clone(),
                other => vec![other.clone()],
            };
            items.splice(*start..*end, replacement);
        }
        (OccurrenceRef::ObjectKeys { path, keys }, EditOp::Rename(new_key)) => {
            if keys.len() != 1 {
                return Err(MatchError::InvalidPlan(format!(
                    "rename targets {} keys; exactly one required",
                    keys.len()
                )));
            }
            let Some(Value::Map(map)) = navigate_mut(tree, path) else {
                return Ok(());
            };
            rename_key(map, &keys[0], new_key);
        }
        (OccurrenceRef::ObjectKeys { path, keys }, EditOp::Replace(v)) => {
            let Value::Map(entries) = v else {
                return Err(MatchError::InvalidPlan(
                    "a key-set ref takes a mapping replacement or a string rename".to_string(),
                ));
            };
            let Some(Value::Map(map)) = navigate_mut(tree, path) else {
                return Ok(());
            };
            replace_keys(map, keys, entries);
        }
        (_, EditOp::Rename(_)) => {
            return Err(MatchError::InvalidPlan(
                "rename applies only to key-set refs".to_string(),
            ));
        }
    }
    Ok(())
}

fn navigate_mut<'a>(tree: &'a mut Value, path: &Path) -> Option<&'a mut Value> {
    let mut node = tree;
    for step in &path.0 {
        node = match (step, node) {
            (crate::occurrence::Step::Key(k), Value::Map(map)) => map.get_mut(k)?,
            (crate::occurrence::Step::Index(i), Value::Seq(items)) => items.get_mut(*i)?,
            _ => return None,
        };
    }
    Some(node)
}

/// Renames `old` to `new` preserving entry position and value.
fn rename_key(map: &mut IndexMap<String, Value>, old: &str, new: &str) {
    if old == new || !map.contains_key(old) {
        return;
    }
    let mut rebuilt = IndexMap::with_capacity(map.len());
    for (k, v) in map.drain(..) {
        if k == old {
            rebuilt.insert(new.to_string(), v);
        } else {
            rebuilt.insert(k, v);
        }
    }
    *map = rebuilt;
}

/// Replaces a key set with new entries, anchored at the first removed
/// key's position.
fn replace_keys(
    map: &mut IndexMap<String, Value>,
    keys: &[String],
    entries: &IndexMap<String, Value>,
) {
    let mut rebuilt = IndexMap::with_capacity(map.len());
    let mut inserted = false;
    for (k, v) in map.drain(..) {
        if keys.contains(&k) {
            if !inserted {
                for (nk, nv) in entries {
                    rebuilt.insert(nk.clone(), nv.clone());
                }
                inserted = true;
            }
        } else {
            rebuilt.insert(k, v);
        }
    }
    if !inserted {
        for (nk, nv) in entries {
            rebuilt.insert(nk.clone(), nv.clone());
        }
    }
    *map = rebuilt;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occurrence::Step;

    fn seq(items: Vec<Value>) -> Value {
        Value::Seq(items)
    }

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    #[test]
    fn slice_edits_apply_right_to_left() {
        let tree = seq(vec![n(1.0), n(2.0), n(3.0), n(4.0)]);
        let sol = Solution {
            bindings: IndexMap::new(),
            at: IndexMap::new(),
            where_: OccurrenceRef::Node { path: Path::root() },
        };
        let edits = vec![
            Edit {
                at: OccurrenceRef::ArraySlice {
                    path: Path::root(),
                    start: 0,
                    end: 1,
                },
                op: EditOp::Replace(seq(vec![n(9.0), n(9.0)])),
            },
            Edit {
                at: OccurrenceRef::ArraySlice {
                    path: Path::root(),
                    start: 2,
                    end: 4,
                },
                op: EditOp::Replace(n(7.0)),
            },
        ];
        let out = apply_edits(&tree, vec![(sol, edits)]).unwrap();
        assert_eq!(out, seq(vec![n(9.0), n(9.0), n(2.0), n(7.0)]));
    }

    #[test]
    fn stale_solution_is_skipped() {
        let tree = seq(vec![n(1.0)]);
        let make_sol = || Solution {
            bindings: IndexMap::new(),
            at: IndexMap::new(),
            where_: OccurrenceRef::Node { path: Path::root() },
        };
        let first = Edit {
            at: OccurrenceRef::Node {
                path: Path(vec![Step::Index(0)]),
            },
            op: EditOp::Replace(n(5.0)),
        };
        // Same region through a different ref shape: the recorded value
        // (1) no longer matches the live one (5).
        let second = Edit {
            at: OccurrenceRef::ArraySlice {
                path: Path::root(),
                start: 0,
                end: 1,
            },
            op: EditOp::Replace(n(6.0)),
        };
        let out = apply_edits(
            &tree,
            vec![(make_sol(), vec![first]), (make_sol(), vec![second])],
        )
        .unwrap();
        // The second batch saw 5 where the original recorded 1: stale.
        assert_eq!(out, seq(vec![n(5.0)]));
    }

    #[test]
    fn rename_preserves_position() {
        let mut map = IndexMap::new();
        map.insert("a".to_string(), n(1.0));
        map.insert("b".to_string(), n(2.0));
        map.insert("c".to_string(), n(3.0));
        rename_key(&mut map, "b", "z");
        let keys: Vec<&String> = map.keys().collect();
        assert_eq!(keys, ["a", "z", "c"]);
        assert_eq!(map["z"], n(2.0));
    }
}
