//! The backtracking matcher.
//!
//! The engine is an explicit machine, not a recursive function: pending
//! work is a cons-list continuation of tagged `Goal` records, and every
//! decision point pushes a `Choice` holding the saved continuation plus
//! the untried alternatives. Backtracking truncates the trails (bindings,
//! occurrences, consumed object keys) to the choice's marks and resumes.
//! `next_solution` pulls one solution at a time, so streams stay lazy and
//! cancellation is just dropping the engine.

mod obj;
mod seq;

use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::error::{MatchError, MatchResult};
use crate::guard::{self, GuardExpr};
use crate::intern::Symbol;
use crate::ir::{Ir, ObjItem, ObjTermIr, Program, RemnantIr, SeqItem, SpanBind};
use crate::occurrence::{OccurrenceRef, Path, PathCell, Step};
use crate::options::Options;
use crate::solution::Solution;
use crate::value::{num_eq, Value};

pub(crate) type Cont<'p, 't> = Option<Rc<Frame<'p, 't>>>;

pub(crate) struct Frame<'p, 't> {
    pub goal: Goal<'p, 't>,
    pub next: Cont<'p, 't>,
}

/// What to do when a (sub)sequence finishes at a dynamic position.
#[derive(Clone)]
pub(crate) enum SeqFin<'p, 't> {
    /// Top of a sequence pattern: optionally require full consumption.
    Done { require_end: bool, end: usize },
    /// One repetition instance finished; resume the quantifier.
    Rep {
        ctx: RepCtx<'p, 't>,
        count: usize,
        instance_start: usize,
    },
    /// One instance of a counted `{m,n}` attempt finished.
    RepX {
        ctx: RepCtx<'p, 't>,
        count: usize,
        target: usize,
        cut_to: usize,
        instance_start: usize,
    },
}

/// Everything a quantifier needs to keep running: the item, its
/// surroundings, and where its span began.
#[derive(Clone)]
pub(crate) struct RepCtx<'p, 't> {
    pub item: &'p SeqItem,
    pub items: &'p [SeqItem],
    pub idx: usize,
    pub seq: &'t [Value],
    pub base: Rc<PathCell>,
    pub end: usize,
    pub span_start: usize,
    pub outer_fin: Rc<SeqFin<'p, 't>>,
    /// Choice-stack height when the quantifier began; possessive commits
    /// cut back to here.
    pub cut_mark: usize,
}

/// Static pointer to the member list an object term resumes into.
#[derive(Clone, Copy)]
pub(crate) struct NextObj<'p> {
    pub members: &'p [ObjItem],
    pub idx: usize,
}

/// A key-pattern bind deferred from crumb-target enumeration; committed
/// (with unification) when the alternative actually runs.
#[derive(Clone)]
pub(crate) struct KeyCommit<'p> {
    pub pat: &'p Ir,
    pub step: Step,
    pub container: Rc<PathCell>,
}

#[derive(Clone)]
pub(crate) enum Goal<'p, 't> {
    Node {
        pat: &'p Ir,
        node: &'t Value,
        path: Rc<PathCell>,
    },
    /// Anchored match of the root pattern against a sequence slice.
    Slice {
        pat: &'p Ir,
        seq: &'t [Value],
        path: Rc<PathCell>,
        start: usize,
        end: usize,
    },
    BindNode {
        name: Symbol,
        node: &'t Value,
        path: Rc<PathCell>,
    },
    BindSpan {
        bind: SpanBind,
        seq: &'t [Value],
        base: Rc<PathCell>,
        start: usize,
        end: usize,
    },
    SeqStep {
        items: &'p [SeqItem],
        idx: usize,
        seq: &'t [Value],
        base: Rc<PathCell>,
        end: usize,
        pos: usize,
        fin: Rc<SeqFin<'p, 't>>,
    },
    RepDecide {
        ctx: RepCtx<'p, 't>,
        pos: usize,
        count: usize,
        stuck: bool,
    },
    RepExact {
        ctx: RepCtx<'p, 't>,
        pos: usize,
        count: usize,
        target: usize,
        cut_to: Option<usize>,
    },
    Cut {
        to: usize,
    },
    GuardCheck {
        expr: &'p GuardExpr,
    },
    LookSeq {
        negated: bool,
        items: &'p [SeqItem],
        seq: &'t [Value],
        base: Rc<PathCell>,
        end: usize,
        pos: usize,
    },
    ObjStep {
        members: &'p [ObjItem],
        idx: usize,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
    },
    ObjGroupEnd {
        name: Symbol,
        obj_id: u32,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        mark: usize,
    },
    RemnantCheck {
        rem: &'p RemnantIr,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
    },
    /// Greedy key selection state of one requiring term.
    TermSelect {
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        taken: usize,
        cursor: usize,
        next: NextObj<'p>,
    },
    /// Commit one selected key: consume it, bind its key pattern, then
    /// branch over breadcrumb targets.
    TermTake {
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        taken: usize,
        key_idx: usize,
        next: NextObj<'p>,
    },
    /// `:>` terms: sweep the remaining pool; every key-matching key must
    /// value-match.
    ImplyStep {
        term: &'p ObjTermIr,
        owner: &'t Value,
        map: &'t IndexMap<String, Value>,
        path: Rc<PathCell>,
        obj_id: u32,
        depth: usize,
        key_idx: usize,
        count: usize,
        next: NextObj<'p>,
    },
    /// Run the deferred key-pattern binds of a chosen crumb target.
    KeyCommits {
        commits: Vec<KeyCommit<'p>>,
    },
    /// Root-led terms consume the top-level key their descent passes
    /// through.
    ConsumeTop {
        obj_id: u32,
        obj_depth: usize,
        target: Rc<PathCell>,
        map: &'t IndexMap<String, Value>,
    },
    /// Unconditional dead end (used where an alternative is known
    /// infeasible at construction time).
    Fail,
}

pub(crate) struct Choice<'p, 't> {
    cont: Cont<'p, 't>,
    env_len: usize,
    occ_len: usize,
    pool_len: usize,
    alts: std::vec::IntoIter<Vec<Goal<'p, 't>>>,
}

#[derive(Clone, Copy)]
pub(crate) enum AnchorRoot<'t> {
    Node(&'t Value),
    Slice(&'t [Value], usize, usize),
}

pub(crate) struct Anchor<'t> {
    root: AnchorRoot<'t>,
    path: Rc<PathCell>,
}

pub(crate) enum Flow {
    Cont,
    Fail,
}

pub struct Engine<'p, 't> {
    program: &'p Program,
    opts: &'p Options,
    anchors: Vec<Anchor<'t>>,
    anchor_idx: usize,
    anchor_root: AnchorRoot<'t>,
    where_: OccurrenceRef,
    cont: Cont<'p, 't>,
    env: Vec<(Symbol, Value)>,
    occs: Vec<(Symbol, OccurrenceRef)>,
    pool: FxHashSet<(u32, u32)>,
    pool_trail: Vec<(u32, u32)>,
    choices: Vec<Choice<'p, 't>>,
    obj_counter: u32,
    steps: usize,
    max_steps: Option<usize>,
    seeds: Vec<(Symbol, Value)>,
    seed_extra: Vec<(String, Value)>,
    started: bool,
    done: bool,
}

impl<'p, 't> Engine<'p, 't> {
    pub fn new(program: &'p Program, opts: &'p Options, tree: &'t Value, scan: bool) -> Self {
        let root = PathCell::root();
        let anchors = if scan {
            let mut anchors = Vec::new();
            collect_anchors(tree, &root, program.wants_slices, &mut anchors);
            anchors
        } else {
            vec![Anchor {
                root: AnchorRoot::Node(tree),
                path: root,
            }]
        };

        let mut seeds = Vec::new();
        let mut seed_extra = Vec::new();
        for (name, value) in &opts.env_seed {
            match program.names.find(name) {
                Some(sym) => seeds.push((sym, value.clone())),
                None => seed_extra.push((name.clone(), value.clone())),
            }
        }

        Engine {
            program,
            opts,
            anchors,
            anchor_idx: 0,
            anchor_root: AnchorRoot::Node(tree),
            where_: OccurrenceRef::Node { path: Path::root() },
            cont: None,
            env: Vec::new(),
            occs: Vec::new(),
            pool: FxHashSet::default(),
            pool_trail: Vec::new(),
            choices: Vec::new(),
            obj_counter: 0,
            steps: 0,
            max_steps: opts.max_steps,
            seeds,
            seed_extra,
            started: false,
            done: false,
        }
    }

    pub fn next_solution(&mut self) -> MatchResult<Option<Solution>> {
        if !self.started {
            self.started = true;
            for name in &self.program.open_guard_vars {
                if !self.opts.env_seed.iter().any(|(n, _)| n == name) {
                    return Err(MatchError::UnboundGuardVar(name.clone()));
                }
            }
            if self.anchors.is_empty() {
                self.done = true;
            } else {
                self.start_anchor();
            }
        }
        loop {
            if self.done {
                return Ok(None);
            }
            if let Some(max) = self.max_steps {
                if self.steps > max {
                    return Err(MatchError::StepBudgetExceeded { budget: max });
                }
            }
            self.steps += 1;
            match self.take_goal() {
                None => {
                    let solution = self.build_solution();
                    self.step_back();
                    return Ok(Some(solution));
                }
                Some(goal) => match self.exec(goal)? {
                    Flow::Cont => {}
                    Flow::Fail => self.step_back(),
                },
            }
        }
    }

    /// Runs a forked engine to its first success, sharing the step
    /// budget. Used for lookaheads; the fork's bindings and occurrences
    /// are discarded whatever the outcome.
    fn lookahead(&mut self, goals: Vec<Goal<'p, 't>>) -> MatchResult<bool> {
        let mut fork = Engine {
            program: self.program,
            opts: self.opts,
            anchors: Vec::new(),
            anchor_idx: 0,
            anchor_root: self.anchor_root,
            where_: self.where_.clone(),
            cont: None,
            env: self.env.clone(),
            occs: Vec::new(),
            pool: self.pool.clone(),
            pool_trail: Vec::new(),
            choices: Vec::new(),
            obj_counter: self.obj_counter,
            steps: self.steps,
            max_steps: self.max_steps,
            seeds: Vec::new(),
            seed_extra: self.seed_extra.clone(),
            started: true,
            done: false,
        };
        fork.push_goals(goals);
        let outcome = fork.run_to_success()?;
        self.steps = fork.steps;
        self.obj_counter = fork.obj_counter;
        Ok(outcome)
    }

    fn run_to_success(&mut self) -> MatchResult<bool> {
        loop {
            if let Some(max) = self.max_steps {
                if self.steps > max {
                    return Err(MatchError::StepBudgetExceeded { budget: max });
                }
            }
            self.steps += 1;
            match self.take_goal() {
                None => return Ok(true),
                Some(goal) => match self.exec(goal)? {
                    Flow::Cont => {}
                    Flow::Fail => {
                        if !self.backtrack() {
                            return Ok(false);
                        }
                    }
                },
            }
        }
    }

    // -- machine plumbing ---------------------------------------------------

    fn take_goal(&mut self) -> Option<Goal<'p, 't>> {
        let frame = self.cont.take()?;
        self.cont = frame.next.clone();
        Some(frame.goal.clone())
    }

    pub(crate) fn push_goal(&mut self, goal: Goal<'p, 't>) {
        self.cont = Some(Rc::new(Frame {
            goal,
            next: self.cont.take(),
        }));
    }

    pub(crate) fn push_goals(&mut self, goals: Vec<Goal<'p, 't>>) {
        for goal in goals.into_iter().rev() {
            self.push_goal(goal);
        }
    }

    /// Runs the first alternative now and parks the rest in a choice
    /// point. An empty list fails immediately.
    fn push_choice(&mut self, alternatives: Vec<Vec<Goal<'p, 't>>>) -> Flow {
        let mut iter = alternatives.into_iter();
        let Some(first) = iter.next() else {
            return Flow::Fail;
        };
        let rest: Vec<Vec<Goal<'p, 't>>> = iter.collect();
        if !rest.is_empty() {
            self.choices.push(Choice {
                cont: self.cont.clone(),
                env_len: self.env.len(),
                occ_len: self.occs.len(),
                pool_len: self.pool_trail.len(),
                alts: rest.into_iter(),
            });
        }
        self.push_goals(first);
        Flow::Cont
    }

    fn backtrack(&mut self) -> bool {
        while let Some(choice) = self.choices.last_mut() {
            if let Some(goals) = choice.alts.next() {
                let cont = choice.cont.clone();
                let env_len = choice.env_len;
                let occ_len = choice.occ_len;
                let pool_len = choice.pool_len;
                self.env.truncate(env_len);
                self.occs.truncate(occ_len);
                while self.pool_trail.len() > pool_len {
                    let entry = self.pool_trail.pop().unwrap();
                    self.pool.remove(&entry);
                }
                self.cont = cont;
                self.push_goals(goals);
                return true;
            }
            self.choices.pop();
        }
        false
    }

    fn step_back(&mut self) {
        if !self.backtrack() {
            self.advance_anchor();
        }
    }

    fn advance_anchor(&mut self) {
        self.anchor_idx += 1;
        if self.anchor_idx >= self.anchors.len() {
            self.done = true;
        } else {
            self.start_anchor();
        }
    }

    fn start_anchor(&mut self) {
        let root = self.anchors[self.anchor_idx].root;
        let path = Rc::clone(&self.anchors[self.anchor_idx].path);
        self.env.clear();
        self.env.extend(self.seeds.iter().cloned());
        self.occs.clear();
        self.pool.clear();
        self.pool_trail.clear();
        self.choices.clear();
        self.cont = None;
        self.anchor_root = root;
        self.where_ = match root {
            AnchorRoot::Node(_) => OccurrenceRef::Node {
                path: path.to_path(),
            },
            AnchorRoot::Slice(_, start, end) => OccurrenceRef::ArraySlice {
                path: path.to_path(),
                start,
                end,
            },
        };
        let goal = match root {
            AnchorRoot::Node(node) => Goal::Node {
                pat: &self.program.root,
                node,
                path,
            },
            AnchorRoot::Slice(seq, start, end) => Goal::Slice {
                pat: &self.program.root,
                seq,
                path,
                start,
                end,
            },
        };
        self.push_goal(goal);
    }

    // -- trails -------------------------------------------------------------

    /// Binds or unifies. A second occurrence of a bound name must equal
    /// the existing value (SameValueZero, deep for composites); mismatch
    /// is an ordinary branch failure.
    pub(crate) fn bind(&mut self, name: Symbol, value: Value, refr: OccurrenceRef) -> bool {
        let existing = self.env.iter().position(|(n, _)| *n == name);
        match existing {
            Some(i) => {
                if self.env[i].1 != value {
                    return false;
                }
            }
            None => self.env.push((name, value)),
        }
        self.occs.push((name, refr));
        true
    }

    pub(crate) fn consume_key(&mut self, obj_id: u32, key_idx: usize) -> bool {
        let entry = (obj_id, key_idx as u32);
        if self.pool.contains(&entry) {
            return false;
        }
        self.pool.insert(entry);
        self.pool_trail.push(entry);
        true
    }

    pub(crate) fn key_free(&self, obj_id: u32, key_idx: usize) -> bool {
        !self.pool.contains(&(obj_id, key_idx as u32))
    }

    pub(crate) fn next_obj_id(&mut self) -> u32 {
        self.obj_counter += 1;
        self.obj_counter
    }

    pub(crate) fn pool_trail_len(&self) -> usize {
        self.pool_trail.len()
    }

    /// Key indices this object instance consumed since `mark`.
    pub(crate) fn pool_consumed_since(&self, mark: usize, obj_id: u32) -> Vec<usize> {
        self.pool_trail[mark..]
            .iter()
            .filter(|(id, _)| *id == obj_id)
            .map(|(_, k)| *k as usize)
            .collect()
    }

    pub(crate) fn add_steps(&mut self, n: usize) {
        self.steps = self.steps.saturating_add(n);
    }

    // -- goal execution -----------------------------------------------------

    fn exec(&mut self, goal: Goal<'p, 't>) -> MatchResult<Flow> {
        Ok(match goal {
            Goal::Node { pat, node, path } => self.exec_node(pat, node, path)?,
            Goal::Slice {
                pat,
                seq,
                path,
                start,
                end,
            } => self.exec_slice(pat, seq, path, start, end),
            Goal::BindNode { name, node, path } => {
                let refr = node_site(&path);
                if self.bind(name, node.clone(), refr) {
                    Flow::Cont
                } else {
                    Flow::Fail
                }
            }
            Goal::BindSpan {
                bind,
                seq,
                base,
                start,
                end,
            } => self.exec_bind_span(bind, seq, &base, start, end),
            Goal::SeqStep {
                items,
                idx,
                seq,
                base,
                end,
                pos,
                fin,
            } => self.exec_seq_step(items, idx, seq, base, end, pos, fin),
            Goal::RepDecide {
                ctx,
                pos,
                count,
                stuck,
            } => self.exec_rep_decide(ctx, pos, count, stuck),
            Goal::RepExact {
                ctx,
                pos,
                count,
                target,
                cut_to,
            } => self.exec_rep_exact(ctx, pos, count, target, cut_to),
            Goal::Cut { to } => {
                self.choices.truncate(to.min(self.choices.len()));
                Flow::Cont
            }
            Goal::GuardCheck { expr } => self.exec_guard(expr)?,
            Goal::LookSeq {
                negated,
                items,
                seq,
                base,
                end,
                pos,
            } => {
                let goal = Goal::SeqStep {
                    items,
                    idx: 0,
                    seq,
                    base,
                    end,
                    pos,
                    fin: Rc::new(SeqFin::Done {
                        require_end: false,
                        end,
                    }),
                };
                let hit = self.lookahead(vec![goal])?;
                if hit != negated {
                    Flow::Cont
                } else {
                    Flow::Fail
                }
            }
            Goal::ObjStep {
                members,
                idx,
                owner,
                map,
                path,
                obj_id,
                depth,
            } => self.exec_obj_step(members, idx, owner, map, path, obj_id, depth)?,
            Goal::ObjGroupEnd {
                name,
                obj_id,
                map,
                path,
                mark,
            } => self.exec_obj_group_end(name, obj_id, map, &path, mark),
            Goal::RemnantCheck {
                rem,
                map,
                path,
                obj_id,
            } => self.exec_remnant(rem, map, &path, obj_id),
            Goal::TermSelect {
                term,
                owner,
                map,
                path,
                obj_id,
                depth,
                taken,
                cursor,
                next,
            } => self.exec_term_select(term, owner, map, path, obj_id, depth, taken, cursor, next),
            Goal::TermTake {
                term,
                owner,
                map,
                path,
                obj_id,
                depth,
                taken,
                key_idx,
                next,
            } => self.exec_term_take(term, owner, map, path, obj_id, depth, taken, key_idx, next),
            Goal::ImplyStep {
                term,
                owner,
                map,
                path,
                obj_id,
                depth,
                key_idx,
                count,
                next,
            } => self.exec_imply_step(term, owner, map, path, obj_id, depth, key_idx, count, next),
            Goal::KeyCommits { commits } => self.exec_key_commits(commits),
            Goal::ConsumeTop {
                obj_id,
                obj_depth,
                target,
                map,
            } => self.exec_consume_top(obj_id, obj_depth, &target, map),
            Goal::Fail => Flow::Fail,
        })
    }

    fn exec_node(
        &mut self,
        pat: &'p Ir,
        node: &'t Value,
        path: Rc<PathCell>,
    ) -> MatchResult<Flow> {
        Ok(match pat {
            Ir::Any => Flow::Cont,
            Ir::Null => flow(matches!(node, Value::Null)),
            Ir::Bool(b) => flow(matches!(node, Value::Bool(actual) if actual == b)),
            Ir::Num(n) => flow(matches!(node, Value::Number(actual) if num_eq(*actual, *n))),
            Ir::Str(s) => flow(matches!(node, Value::String(actual) if self.opts.str_eq(s, actual))),
            Ir::Regex(r) => match node {
                Value::String(subject) => {
                    let subject = self.opts.normalize_str(subject);
                    flow(r.regex.is_match(&subject))
                }
                _ => Flow::Fail,
            },
            Ir::Alt(alts) => {
                let alternatives = alts
                    .iter()
                    .map(|alt| {
                        vec![Goal::Node {
                            pat: alt,
                            node,
                            path: Rc::clone(&path),
                        }]
                    })
                    .collect();
                self.push_choice(alternatives)
            }
            Ir::Bind { name, sub, .. } => {
                self.push_goals(vec![
                    Goal::Node {
                        pat: sub,
                        node,
                        path: Rc::clone(&path),
                    },
                    Goal::BindNode {
                        name: *name,
                        node,
                        path,
                    },
                ]);
                Flow::Cont
            }
            Ir::Look { negated, sub } => {
                let hit = self.lookahead(vec![Goal::Node {
                    pat: sub,
                    node,
                    path,
                }])?;
                flow(hit != *negated)
            }
            Ir::Guard(expr) => self.exec_guard(expr)?,
            Ir::Seq(items) => match node {
                Value::Seq(values) => {
                    self.push_goal(Goal::SeqStep {
                        items,
                        idx: 0,
                        seq: values,
                        base: path,
                        end: values.len(),
                        pos: 0,
                        fin: Rc::new(SeqFin::Done {
                            require_end: true,
                            end: values.len(),
                        }),
                    });
                    Flow::Cont
                }
                _ => Flow::Fail,
            },
            Ir::Obj(obj) => match node {
                Value::Map(map) => {
                    let obj_id = self.next_obj_id();
                    let depth = path.to_path().depth();
                    self.push_goals(vec![
                        Goal::ObjStep {
                            members: &obj.members,
                            idx: 0,
                            owner: node,
                            map,
                            path: Rc::clone(&path),
                            obj_id,
                            depth,
                        },
                        Goal::RemnantCheck {
                            rem: &obj.remnant,
                            map,
                            path,
                            obj_id,
                        },
                    ]);
                    Flow::Cont
                }
                _ => Flow::Fail,
            },
        })
    }

    fn exec_slice(
        &mut self,
        pat: &'p Ir,
        seq: &'t [Value],
        path: Rc<PathCell>,
        start: usize,
        end: usize,
    ) -> Flow {
        match pat {
            Ir::Seq(items) => {
                self.push_goal(Goal::SeqStep {
                    items,
                    idx: 0,
                    seq,
                    base: path,
                    end,
                    pos: start,
                    fin: Rc::new(SeqFin::Done {
                        require_end: true,
                        end,
                    }),
                });
                Flow::Cont
            }
            Ir::Alt(alts) => {
                let alternatives = alts
                    .iter()
                    .map(|alt| {
                        vec![Goal::Slice {
                            pat: alt,
                            seq,
                            path: Rc::clone(&path),
                            start,
                            end,
                        }]
                    })
                    .collect();
                self.push_choice(alternatives)
            }
            Ir::Bind { name, sub, .. } => {
                self.push_goals(vec![
                    Goal::Slice {
                        pat: sub,
                        seq,
                        path: Rc::clone(&path),
                        start,
                        end,
                    },
                    Goal::BindSpan {
                        bind: SpanBind {
                            name: *name,
                            group: true,
                        },
                        seq,
                        base: path,
                        start,
                        end,
                    },
                ]);
                Flow::Cont
            }
            _ => Flow::Fail,
        }
    }

    fn exec_bind_span(
        &mut self,
        bind: SpanBind,
        seq: &'t [Value],
        base: &Rc<PathCell>,
        start: usize,
        end: usize,
    ) -> Flow {
        if bind.group {
            let value = Value::Seq(seq[start..end].to_vec());
            let refr = OccurrenceRef::ArraySlice {
                path: base.to_path(),
                start,
                end,
            };
            flow(self.bind(bind.name, value, refr))
        } else {
            // Scalar span binds are single-element by construction.
            let elem_path = PathCell::push(base, Step::Index(start));
            let refr = node_site(&elem_path);
            flow(self.bind(bind.name, seq[start].clone(), refr))
        }
    }

    fn exec_guard(&mut self, expr: &'p GuardExpr) -> MatchResult<Flow> {
        let owned;
        let root: &Value = match self.anchor_root {
            AnchorRoot::Node(node) => node,
            AnchorRoot::Slice(seq, start, end) => {
                owned = Value::Seq(seq[start..end].to_vec());
                &owned
            }
        };
        let program = self.program;
        let env = &self.env;
        let seed_extra = &self.seed_extra;
        let resolve = move |name: &str| -> Option<Value> {
            if let Some(sym) = program.names.find(name) {
                if let Some((_, v)) = env.iter().find(|(n, _)| *n == sym) {
                    return Some(v.clone());
                }
            }
            seed_extra
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        };
        // Type errors, `%` by zero and unbound names all fail the branch.
        Ok(match guard::eval(expr, &resolve, root) {
            Ok(v) => flow(v.truthy()),
            Err(_) => Flow::Fail,
        })
    }

    // -- solution assembly --------------------------------------------------

    fn build_solution(&self) -> Solution {
        let mut at: IndexMap<String, Vec<OccurrenceRef>> = IndexMap::new();
        for (sym, refr) in &self.occs {
            at.entry(self.program.names.resolve(*sym).to_string())
                .or_default()
                .push(refr.clone());
        }
        let mut bindings = IndexMap::new();
        for (sym, value) in &self.env {
            let name = self.program.names.resolve(*sym);
            // Seeded-but-unobserved names stay out of the solution; every
            // reported binding has at least one occurrence.
            if at.contains_key(name) {
                bindings.insert(name.to_string(), value.clone());
            }
        }
        Solution {
            bindings,
            at,
            where_: self.where_.clone(),
        }
    }
}

pub(crate) fn flow(ok: bool) -> Flow {
    if ok {
        Flow::Cont
    } else {
        Flow::Fail
    }
}

/// Site of a single node: values under a mapping key canonicalize to
/// `ObjectValue`, everything else stays a `Node` path.
pub(crate) fn node_site(path: &Rc<PathCell>) -> OccurrenceRef {
    let mut full = path.to_path();
    if let Some(Step::Key(_)) = full.0.last() {
        if let Some(Step::Key(key)) = full.0.pop() {
            return OccurrenceRef::ObjectValue { path: full, key };
        }
    }
    OccurrenceRef::Node { path: full }
}

/// Scan order: the node itself, then (for sequences) proper contiguous
/// slices start-ascending / longest-first, then children in order.
fn collect_anchors<'t>(
    node: &'t Value,
    path: &Rc<PathCell>,
    wants_slices: bool,
    out: &mut Vec<Anchor<'t>>,
) {
    out.push(Anchor {
        root: AnchorRoot::Node(node),
        path: Rc::clone(path),
    });
    match node {
        Value::Seq(items) => {
            if wants_slices {
                let len = items.len();
                for start in 0..=len {
                    for end in (start..=len).rev() {
                        if start == 0 && end == len {
                            // Same region as the node anchor.
                            continue;
                        }
                        out.push(Anchor {
                            root: AnchorRoot::Slice(items, start, end),
                            path: Rc::clone(path),
                        });
                    }
                }
            }
            for (i, child) in items.iter().enumerate() {
                let child_path = PathCell::push(path, Step::Index(i));
                collect_anchors(child, &child_path, wants_slices, out);
            }
        }
        Value::Map(map) => {
            for (k, child) in map {
                let child_path = PathCell::push(path, Step::Key(k.clone()));
                collect_anchors(child, &child_path, wants_slices, out);
            }
        }
        _ => {}
    }
}

/// Does this pattern subtree contain a binder? Crumb-target enumeration
/// only defers a commit when it does.
pub(crate) fn contains_bind(ir: &Ir) -> bool {
    match ir {
        Ir::Bind { .. } => true,
        Ir::Alt(alts) => alts.iter().any(contains_bind),
        _ => false,
    }
}

/// Probe and commit matching for key positions (object keys, sequence
/// indices inside breadcrumbs). Probes never touch the environment.
impl<'p, 't> Engine<'p, 't> {
    pub(crate) fn probe_key(&self, pat: &Ir, step: &Step) -> bool {
        match pat {
            Ir::Any => true,
            Ir::Str(s) => match step {
                Step::Key(k) => self.opts.str_eq(s, k),
                Step::Index(_) => false,
            },
            Ir::Num(n) => match step {
                Step::Index(i) => num_eq(*n, *i as f64),
                Step::Key(k) => {
                    let mut text = String::new();
                    Value::Number(*n).write_structural_key(&mut text);
                    text == *k
                }
            },
            Ir::Regex(r) => {
                let text = match step {
                    Step::Key(k) => k.clone(),
                    Step::Index(i) => i.to_string(),
                };
                let subject = self.opts.normalize_str(&text);
                r.regex.is_match(&subject)
            }
            Ir::Alt(alts) => alts.iter().any(|alt| self.probe_key(alt, step)),
            Ir::Bind { sub, .. } => self.probe_key(sub, step),
            _ => false,
        }
    }

    /// Re-matches a key pattern with bindings applied. The step's value
    /// form is a string for keys, a number for indices.
    pub(crate) fn commit_key(
        &mut self,
        pat: &'p Ir,
        step: &Step,
        container: &Rc<PathCell>,
    ) -> bool {
        match pat {
            Ir::Bind { name, sub, .. } => {
                if !self.commit_key(sub, step, container) {
                    return false;
                }
                let (value, refr) = match step {
                    Step::Key(k) => (
                        Value::String(k.clone()),
                        OccurrenceRef::ObjectKeys {
                            path: container.to_path(),
                            keys: vec![k.clone()],
                        },
                    ),
                    Step::Index(i) => (
                        Value::Number(*i as f64),
                        OccurrenceRef::ArraySlice {
                            path: container.to_path(),
                            start: *i,
                            end: *i + 1,
                        },
                    ),
                };
                self.bind(*name, value, refr)
            }
            Ir::Alt(alts) => {
                // First probe-matching alternative wins; key alternation
                // does not reopen on later unification failure.
                for alt in alts {
                    if self.probe_key(alt, step) {
                        return self.commit_key(alt, step, container);
                    }
                }
                false
            }
            other => self.probe_key(other, step),
        }
    }
}
