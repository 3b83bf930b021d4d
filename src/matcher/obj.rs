//! Object matching: key competition across terms, breadcrumb descent,
//! imply sweeps, group captures and the remainder.
//!
//! Keys compete greedily in source order; a key one term consumed is
//! gone for later terms in the same solution. Consumption lives on the
//! pool trail so backtracking releases keys in lock-step with bindings.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::MatchResult;
use crate::ir::{CrumbIr, ObjItem, ObjTermIr, RemnantIr};
use crate::occurrence::{OccurrenceRef, PathCell, Step};
use crate::value::Value;

use super::{contains_bind, flow, Engine, Flow, Goal, KeyCommit, NextObj};

/// One resolution of a breadcrumb chain: the value the term's value
/// pattern applies to, plus any key binds to commit on this path.
struct Target<'p, 't> {
    node: &'t Value,
    path: Rc<PathCell>,
    commits: Vec<KeyCommit<'p>>,
}

impl<'p, 't> Engine<'p, 't> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn exec_obj_step(
        &mut self,
        members: &'p [ObjItem],
        idx: usize,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
    ) -> MatchResult<Flow> {
        if idx == members.len() {
            return Ok(Flow::Cont);
        }
        let next = NextObj {
            members,
            idx: idx + 1,
        };
        Ok(match &members[idx] {
            ObjItem::Term(term) => {
                if term.root {
                    self.dispatch_root_term(term, owner, map, path, obj_id, depth, next)
                } else if term.imply {
                    self.push_goal(Goal::ImplyStep {
                        term,
                        owner,
                        map,
                        path,
                        obj_id,
                        depth,
                        key_idx: 0,
                        count: 0,
                        next,
                    });
                    Flow::Cont
                } else {
                    self.push_goal(Goal::TermSelect {
                        term,
                        owner,
                        map,
                        path,
                        obj_id,
                        depth,
                        taken: 0,
                        cursor: 0,
                        next,
                    });
                    Flow::Cont
                }
            }
            ObjItem::Group {
                bind,
                members: sub,
            } => {
                let mut goals = vec![Goal::ObjStep {
                    members: sub,
                    idx: 0,
                    owner,
                    map,
                    path: Rc::clone(&path),
                    obj_id,
                    depth,
                }];
                if let Some(name) = bind {
                    goals.push(Goal::ObjGroupEnd {
                        name: *name,
                        obj_id,
                        map,
                        path: Rc::clone(&path),
                        mark: self.pool_trail_len(),
                    });
                }
                goals.push(Goal::ObjStep {
                    members,
                    idx: idx + 1,
                    owner,
                    map,
                    path,
                    obj_id,
                    depth,
                });
                self.push_goals(goals);
                Flow::Cont
            }
            ObjItem::Look {
                negated,
                members: sub,
            } => {
                let hit = self.lookahead_obj(sub, owner, map, &path, obj_id, depth)?;
                if hit != *negated {
                    self.push_goal(Goal::ObjStep {
                        members,
                        idx: idx + 1,
                        owner,
                        map,
                        path,
                        obj_id,
                        depth,
                    });
                    Flow::Cont
                } else {
                    Flow::Fail
                }
            }
            ObjItem::Guard(expr) => {
                self.push_goals(vec![
                    Goal::GuardCheck { expr },
                    Goal::ObjStep {
                        members,
                        idx: idx + 1,
                        owner,
                        map,
                        path,
                        obj_id,
                        depth,
                    },
                ]);
                Flow::Cont
            }
        })
    }

    fn lookahead_obj(
        &mut self,
        members: &'p [ObjItem],
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: &Rc<PathCell>,
        obj_id: u32,
        depth: usize,
    ) -> MatchResult<bool> {
        self.lookahead(vec![Goal::ObjStep {
            members,
            idx: 0,
            owner,
            map,
            path: Rc::clone(path),
            obj_id,
            depth,
        }])
    }

    /// `..`-led terms descend from the mapping root. A successful descent
    /// consumes the top-level key it passed through (requiring terms
    /// only; imply stays an assertion).
    #[allow(clippy::too_many_arguments)]
    fn dispatch_root_term(
        &mut self,
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        next: NextObj<'p>,
    ) -> Flow {
        let targets = self.crumb_targets(&term.crumbs, owner, &path);
        let next_goal = Goal::ObjStep {
            members: next.members,
            idx: next.idx,
            owner,
            map,
            path: Rc::clone(&path),
            obj_id,
            depth,
        };
        if term.imply {
            // Every reachable target must satisfy the value pattern.
            let mut goals = Vec::new();
            for target in targets {
                goals.push(Goal::KeyCommits {
                    commits: target.commits,
                });
                goals.push(Goal::Node {
                    pat: &term.value,
                    node: target.node,
                    path: target.path,
                });
            }
            goals.push(next_goal);
            self.push_goals(goals);
            return Flow::Cont;
        }
        let mut alternatives: Vec<Vec<Goal<'p, 't>>> = targets
            .into_iter()
            .map(|target| {
                vec![
                    Goal::KeyCommits {
                        commits: target.commits,
                    },
                    Goal::ConsumeTop {
                        obj_id,
                        obj_depth: depth,
                        target: Rc::clone(&target.path),
                        map,
                    },
                    Goal::Node {
                        pat: &term.value,
                        node: target.node,
                        path: target.path,
                    },
                    next_goal.clone(),
                ]
            })
            .collect();
        if term.min == 0 {
            alternatives.push(vec![next_goal]);
        }
        self.push_choice(alternatives)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn exec_term_select(
        &mut self,
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        taken: usize,
        cursor: usize,
        next: NextObj<'p>,
    ) -> Flow {
        let next_goal = Goal::ObjStep {
            members: next.members,
            idx: next.idx,
            owner,
            map,
            path: Rc::clone(&path),
            obj_id,
            depth,
        };
        if taken >= term.max {
            self.push_goal(next_goal);
            return Flow::Cont;
        }
        let key_pat = term
            .key
            .as_ref()
            .expect("non-root object terms carry a key pattern");
        let mut alternatives: Vec<Vec<Goal<'p, 't>>> = Vec::new();
        for k in cursor..map.len() {
            self.add_steps(1);
            if !self.key_free(obj_id, k) {
                continue;
            }
            let (key, _) = map.get_index(k).unwrap();
            if !self.probe_key(key_pat, &Step::Key(key.clone())) {
                continue;
            }
            alternatives.push(vec![Goal::TermTake {
                term,
                owner,
                map,
                path: Rc::clone(&path),
                obj_id,
                depth,
                taken,
                key_idx: k,
                next,
            }]);
        }
        if taken >= term.min {
            alternatives.push(vec![next_goal]);
        }
        self.push_choice(alternatives)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn exec_term_take(
        &mut self,
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        taken: usize,
        key_idx: usize,
        next: NextObj<'p>,
    ) -> Flow {
        if !self.consume_key(obj_id, key_idx) {
            return Flow::Fail;
        }
        let (key, value) = map.get_index(key_idx).unwrap();
        let key_pat = term.key.as_ref().unwrap();
        if !self.commit_key(key_pat, &Step::Key(key.clone()), &path) {
            return Flow::Fail;
        }
        let value_path = PathCell::push(&path, Step::Key(key.clone()));
        let targets = self.crumb_targets(&term.crumbs, value, &value_path);
        let resume = Goal::TermSelect {
            term,
            owner,
            map,
            path,
            obj_id,
            depth,
            taken: taken + 1,
            cursor: key_idx + 1,
            next,
        };
        let alternatives: Vec<Vec<Goal<'p, 't>>> = targets
            .into_iter()
            .map(|target| {
                vec![
                    Goal::KeyCommits {
                        commits: target.commits,
                    },
                    Goal::Node {
                        pat: &term.value,
                        node: target.node,
                        path: target.path,
                    },
                    resume.clone(),
                ]
            })
            .collect();
        self.push_choice(alternatives)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn exec_imply_step(
        &mut self,
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        key_idx: usize,
        count: usize,
        next: NextObj<'p>,
    ) -> Flow {
        let key_pat = term
            .key
            .as_ref()
            .expect("non-root object terms carry a key pattern");
        let mut k = key_idx;
        let found = loop {
            if k >= map.len() {
                break None;
            }
            self.add_steps(1);
            if self.key_free(obj_id, k) {
                let (key, _) = map.get_index(k).unwrap();
                if self.probe_key(key_pat, &Step::Key(key.clone())) {
                    break Some(k);
                }
            }
            k += 1;
        };
        let Some(k) = found else {
            // Zero (further) matching keys is success for `:>`.
            self.push_goal(Goal::ObjStep {
                members: next.members,
                idx: next.idx,
                owner,
                map,
                path,
                obj_id,
                depth,
            });
            return Flow::Cont;
        };
        if count + 1 > term.max {
            return Flow::Fail;
        }
        if !self.consume_key(obj_id, k) {
            return Flow::Fail;
        }
        let (key, value) = map.get_index(k).unwrap();
        if !self.commit_key(key_pat, &Step::Key(key.clone()), &path) {
            return Flow::Fail;
        }
        let value_path = PathCell::push(&path, Step::Key(key.clone()));
        let targets = self.crumb_targets(&term.crumbs, value, &value_path);
        let resume = Goal::ImplyStep {
            term,
            owner,
            map,
            path,
            obj_id,
            depth,
            key_idx: k + 1,
            count: count + 1,
            next,
        };
        let alternatives: Vec<Vec<Goal<'p, 't>>> = targets
            .into_iter()
            .map(|target| {
                vec![
                    Goal::KeyCommits {
                        commits: target.commits,
                    },
                    Goal::Node {
                        pat: &term.value,
                        node: target.node,
                        path: target.path,
                    },
                    resume.clone(),
                ]
            })
            .collect();
        self.push_choice(alternatives)
    }

    pub(super) fn exec_key_commits(&mut self, commits: Vec<KeyCommit<'p>>) -> Flow {
        for commit in commits {
            if !self.commit_key(commit.pat, &commit.step, &commit.container) {
                return Flow::Fail;
            }
        }
        Flow::Cont
    }

    pub(super) fn exec_consume_top(
        &mut self,
        obj_id: u32,
        obj_depth: usize,
        target: &Rc<PathCell>,
        map: &'t IndexMap<String, Value>,
    ) -> Flow {
        let full = target.to_path();
        if full.depth() <= obj_depth {
            // Depth-zero target: the mapping itself, nothing to consume.
            return Flow::Cont;
        }
        match &full.0[obj_depth] {
            Step::Key(key) => match map.get_index_of(key) {
                Some(i) => flow(self.consume_key(obj_id, i)),
                None => Flow::Fail,
            },
            Step::Index(_) => Flow::Cont,
        }
    }

    pub(super) fn exec_obj_group_end(
        &mut self,
        name: crate::intern::Symbol,
        obj_id: u32,
        map: &'t IndexMap<String, Value>,
        path: &Rc<PathCell>,
        mark: usize,
    ) -> Flow {
        let mut indices = self.pool_consumed_since(mark, obj_id);
        indices.sort_unstable();
        indices.dedup();
        let mut projection = IndexMap::new();
        let mut keys = Vec::new();
        for i in indices {
            let (k, v) = map.get_index(i).unwrap();
            projection.insert(k.clone(), v.clone());
            keys.push(k.clone());
        }
        let refr = OccurrenceRef::ObjectKeys {
            path: path.to_path(),
            keys,
        };
        flow(self.bind(name, Value::Map(projection), refr))
    }

    pub(super) fn exec_remnant(
        &mut self,
        rem: &'p RemnantIr,
        map: &'t IndexMap<String, Value>,
        path: &Rc<PathCell>,
        obj_id: u32,
    ) -> Flow {
        let free: Vec<usize> = (0..map.len())
            .filter(|k| self.key_free(obj_id, *k))
            .collect();
        match rem {
            RemnantIr::Exhaust => flow(free.is_empty()),
            RemnantIr::Allow { capture, min, max } => {
                if free.len() < *min || free.len() > *max {
                    return Flow::Fail;
                }
                let Some(name) = capture else {
                    return Flow::Cont;
                };
                let mut projection = IndexMap::new();
                let mut keys = Vec::new();
                for i in free {
                    let (k, v) = map.get_index(i).unwrap();
                    projection.insert(k.clone(), v.clone());
                    keys.push(k.clone());
                }
                let refr = OccurrenceRef::ObjectKeys {
                    path: path.to_path(),
                    keys,
                };
                flow(self.bind(*name, Value::Map(projection), refr))
            }
        }
    }

    // -- breadcrumbs --------------------------------------------------------

    /// Resolves a breadcrumb chain to its targets, shallowest first and
    /// in insertion order within a depth. Key binds along the way are
    /// recorded as deferred commits, not applied here.
    fn crumb_targets(
        &mut self,
        crumbs: &'p [CrumbIr],
        node: &'t Value,
        path: &Rc<PathCell>,
    ) -> Vec<Target<'p, 't>> {
        let mut out = Vec::new();
        self.walk_crumbs(crumbs, 0, node, path, &Vec::new(), &mut out);
        out
    }

    fn walk_crumbs(
        &mut self,
        crumbs: &'p [CrumbIr],
        idx: usize,
        node: &'t Value,
        path: &Rc<PathCell>,
        commits: &Vec<KeyCommit<'p>>,
        out: &mut Vec<Target<'p, 't>>,
    ) {
        if idx == crumbs.len() {
            out.push(Target {
                node,
                path: Rc::clone(path),
                commits: commits.clone(),
            });
            return;
        }
        let crumb = &crumbs[idx];
        if !crumb.skip {
            // `.key` / `[key]` repeated min..max times; shallower
            // application counts first.
            let mut frontier = vec![(node, Rc::clone(path), commits.clone())];
            let mut applied = 0usize;
            loop {
                if applied >= crumb.min {
                    for (n, p, c) in &frontier {
                        self.walk_crumbs(crumbs, idx + 1, *n, p, c, out);
                    }
                }
                if applied >= crumb.max || frontier.is_empty() {
                    return;
                }
                let mut next = Vec::new();
                for (n, p, c) in &frontier {
                    self.matching_children(crumb.key.as_ref(), *n, p, c, &mut next);
                }
                frontier = next;
                applied += 1;
            }
        }

        match &crumb.key {
            // `..key`: any-depth descent to a matching key. Depth d is
            // the container's distance below the current value.
            Some(key_pat) => {
                let mut frontier = vec![(node, Rc::clone(path), commits.clone())];
                let mut depth = 0usize;
                loop {
                    if depth >= crumb.min {
                        let mut hits = Vec::new();
                        for (n, p, c) in &frontier {
                            self.matching_children(Some(key_pat), *n, p, c, &mut hits);
                        }
                        for (n, p, c) in &hits {
                            self.walk_crumbs(crumbs, idx + 1, *n, p, c, out);
                        }
                    }
                    if depth >= crumb.max {
                        return;
                    }
                    let mut next = Vec::new();
                    for (n, p, c) in &frontier {
                        self.matching_children(None, *n, p, c, &mut next);
                    }
                    if next.is_empty() {
                        return;
                    }
                    frontier = next;
                    depth += 1;
                }
            }
            // Trailing `..`: any key, any depth, including the current
            // value itself.
            None => {
                let mut frontier = vec![(node, Rc::clone(path), commits.clone())];
                let mut depth = 0usize;
                loop {
                    if depth >= crumb.min {
                        for (n, p, c) in &frontier {
                            self.walk_crumbs(crumbs, idx + 1, *n, p, c, out);
                        }
                    }
                    if depth >= crumb.max {
                        return;
                    }
                    let mut next = Vec::new();
                    for (n, p, c) in &frontier {
                        self.matching_children(None, *n, p, c, &mut next);
                    }
                    if next.is_empty() {
                        return;
                    }
                    frontier = next;
                    depth += 1;
                }
            }
        }
    }

    /// Children of `node` whose key (for mappings) or index (for
    /// sequences) matches the pattern; `None` admits all children.
    fn matching_children(
        &mut self,
        key_pat: Option<&'p crate::ir::Ir>,
        node: &'t Value,
        path: &Rc<PathCell>,
        commits: &Vec<KeyCommit<'p>>,
        out: &mut Vec<(&'t Value, Rc<PathCell>, Vec<KeyCommit<'p>>)>,
    ) {
        match node {
            Value::Map(map) => {
                for (k, v) in map {
                    self.add_steps(1);
                    let step = Step::Key(k.clone());
                    match key_pat {
                        Some(pat) if !self.probe_key(pat, &step) => continue,
                        _ => {}
                    }
                    let mut child_commits = commits.clone();
                    if let Some(pat) = key_pat {
                        if contains_bind(pat) {
                            child_commits.push(KeyCommit {
                                pat,
                                step: step.clone(),
                                container: Rc::clone(path),
                            });
                        }
                    }
                    out.push((v, PathCell::push(path, step), child_commits));
                }
            }
            Value::Seq(items) => {
                for (i, v) in items.iter().enumerate() {
                    self.add_steps(1);
                    let step = Step::Index(i);
                    match key_pat {
                        Some(pat) if !self.probe_key(pat, &step) => continue,
                        _ => {}
                    }
                    let mut child_commits = commits.clone();
                    if let Some(pat) = key_pat {
                        if contains_bind(pat) {
                            child_commits.push(KeyCommit {
                                pat,
                                step: step.clone(),
                                container: Rc::clone(path),
                            });
                        }
                    }
                    out.push((v, PathCell::push(path, step), child_commits));
                }
            }
            _ => {}
        }
    }
}
