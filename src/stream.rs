//! Lazy solution streams.
//!
//! A stream wraps the engine's pull loop: nothing matches until the
//! consumer asks, and dropping the stream cancels the query. Errors
//! (the step budget, an unseedable guard variable) surface as an `Err`
//! item, after which the stream is fused.

use std::collections::HashSet;

use crate::error::{LowerError, MatchResult};
use crate::guard::{self, GuardExpr};
use crate::matcher::Engine;
use crate::solution::Solution;
use crate::token::Span;
use crate::value::Value;

pub struct SolutionStream<'a> {
    inner: Box<dyn Iterator<Item = MatchResult<Solution>> + 'a>,
}

struct EngineIter<'p, 't> {
    engine: Engine<'p, 't>,
    errored: bool,
}

impl<'p, 't> Iterator for EngineIter<'p, 't> {
    type Item = MatchResult<Solution>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.errored {
            return None;
        }
        match self.engine.next_solution() {
            Ok(Some(solution)) => Some(Ok(solution)),
            Ok(None) => None,
            Err(e) => {
                self.errored = true;
                Some(Err(e))
            }
        }
    }
}

impl<'a> SolutionStream<'a> {
    pub(crate) fn from_engine(engine: Engine<'a, 'a>) -> Self {
        SolutionStream {
            inner: Box::new(EngineIter {
                engine,
                errored: false,
            }),
        }
    }

    pub fn from_iter<I>(iter: I) -> Self
    where
        I: Iterator<Item = MatchResult<Solution>> + 'a,
    {
        SolutionStream {
            inner: Box::new(iter),
        }
    }

    /// Keeps solutions the predicate accepts. Errors pass through.
    pub fn filter<F>(self, mut pred: F) -> Self
    where
        F: FnMut(&Solution) -> bool + 'a,
    {
        SolutionStream {
            inner: Box::new(self.inner.filter(move |item| match item {
                Ok(solution) => pred(solution),
                Err(_) => true,
            })),
        }
    }

    /// Keeps solutions a guard-expression string accepts. Guard failures
    /// of any kind (type error, unbound name) reject the solution, in
    /// line with branch-failure semantics inside patterns.
    pub fn filter_guard(self, src: &str) -> Result<Self, LowerError> {
        let expr = guard::parse_guard(src).map_err(|msg| {
            LowerError::new(
                crate::error::LowerErrorKind::GuardSyntax(msg),
                Span::default(),
            )
        })?;
        Ok(self.filter(move |solution| guard_accepts(&expr, solution)))
    }

    /// One solution per distinct assignment of the given names.
    pub fn unique(self, names: &[&str]) -> Self {
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let mut seen = HashSet::new();
        self.filter(move |solution| seen.insert(solution.key_of(&names)))
    }

    /// One solution per distinct key; the caller derives the key.
    pub fn unique_by<F>(self, mut key_fn: F) -> Self
    where
        F: FnMut(&Solution) -> String + 'a,
    {
        let mut seen = HashSet::new();
        self.filter(move |solution| seen.insert(key_fn(solution)))
    }

    pub fn take(self, n: usize) -> Self {
        SolutionStream {
            inner: Box::new(self.inner.take(n)),
        }
    }

    /// Transforms solutions in place.
    pub fn map_solutions<F>(self, mut f: F) -> Self
    where
        F: FnMut(Solution) -> Solution + 'a,
    {
        SolutionStream {
            inner: Box::new(self.inner.map(move |item| item.map(&mut f))),
        }
    }

    /// Projects each solution through `f`, keeping laziness.
    pub fn project<T, F>(self, mut f: F) -> impl Iterator<Item = MatchResult<T>> + 'a
    where
        F: FnMut(&Solution) -> T + 'a,
        T: 'a,
    {
        self.inner.map(move |item| item.map(|s| f(&s)))
    }

    pub fn first(mut self) -> MatchResult<Option<Solution>> {
        self.inner.next().transpose()
    }

    pub fn count(self) -> MatchResult<usize> {
        let mut n = 0;
        for item in self.inner {
            item?;
            n += 1;
        }
        Ok(n)
    }

    pub fn to_vec(self) -> MatchResult<Vec<Solution>> {
        self.inner.collect()
    }
}

impl<'a> Iterator for SolutionStream<'a> {
    type Item = MatchResult<Solution>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

fn guard_accepts(expr: &GuardExpr, solution: &Solution) -> bool {
    let resolve = |name: &str| solution.bindings.get(name).cloned();
    match guard::eval(expr, &resolve, &Value::Null) {
        Ok(v) => v.truthy(),
        Err(_) => false,
    }
}
