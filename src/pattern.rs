use std::sync::Arc;

use crate::edit::{apply_edits, plan_edits, Edit, Plan};
use crate::error::{CompileError, MatchResult};
use crate::ir::Program;
use crate::intern::NameTable;
use crate::lexer::Lexer;
use crate::lower::lower;
use crate::matcher::Engine;
use crate::options::{NormalForm, Options};
use crate::parser::Parser;
use crate::solution::{Bindings, Solution};
use crate::stream::SolutionStream;
use crate::value::Value;

/// A compiled pattern. Compilation happens once; the program is shared
/// between configured variants, which differ only in their options.
#[derive(Debug)]
pub struct Pattern {
    program: Arc<Program>,
    options: Options,
    source: String,
}

impl Clone for Pattern {
    fn clone(&self) -> Self {
        Pattern {
            program: Arc::clone(&self.program),
            options: self.options.clone(),
            source: self.source.clone(),
        }
    }
}

impl Pattern {
    pub fn compile(src: &str) -> Result<Pattern, CompileError> {
        let mut names = NameTable::new();
        let tokens = Lexer::new(src, &mut names).tokenize()?;
        let item = Parser::new(tokens, &names).parse()?;
        let program = lower(&item, names)?;
        Ok(Pattern {
            program: Arc::new(program),
            options: Options::default(),
            source: src.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    // -- copy-on-write option builders --------------------------------------

    pub fn unicode_normalize(&self, form: NormalForm) -> Pattern {
        let mut copy = self.clone();
        copy.options.unicode_normalize = Some(form);
        copy
    }

    pub fn max_steps(&self, budget: usize) -> Pattern {
        let mut copy = self.clone();
        copy.options.max_steps = Some(budget);
        copy
    }

    /// Pre-binds `name` before matching. Seeded names participate in
    /// unification and guards; a seed the pattern never observes stays
    /// out of its solutions.
    pub fn env_seed(&self, name: &str, value: Value) -> Pattern {
        let mut copy = self.clone();
        copy.options.env_seed.push((name.to_string(), value));
        copy
    }

    // -- queries ------------------------------------------------------------

    /// Anchored solutions: the pattern must cover the whole tree root.
    pub fn solutions<'a>(&'a self, tree: &'a Value) -> SolutionStream<'a> {
        SolutionStream::from_engine(Engine::new(&self.program, &self.options, tree, false))
    }

    /// Scan mode: visits every node (and, for sequence-shaped patterns,
    /// every contiguous slice) and anchors there.
    pub fn occurrences<'a>(&'a self, tree: &'a Value) -> SolutionStream<'a> {
        SolutionStream::from_engine(Engine::new(&self.program, &self.options, tree, true))
    }

    pub fn matches(&self, tree: &Value) -> MatchResult<bool> {
        Ok(self.solutions(tree).first()?.is_some())
    }

    /// Bindings of the first solution, if any.
    pub fn extract(&self, tree: &Value) -> MatchResult<Option<Bindings>> {
        Ok(self.solutions(tree).first()?.map(|s| s.bindings))
    }

    /// Bindings of every solution, in solution order.
    pub fn extract_all(&self, tree: &Value) -> MatchResult<Vec<Bindings>> {
        Ok(self
            .solutions(tree)
            .to_vec()?
            .into_iter()
            .map(|s| s.bindings)
            .collect())
    }

    // -- rewrites -----------------------------------------------------------

    /// Applies `plan` to the first solution only.
    pub fn replace(&self, tree: &Value, plan: &Plan) -> MatchResult<Value> {
        let Some(solution) = self.solutions(tree).first()? else {
            return Ok(tree.clone());
        };
        let edits = plan_edits(&solution, plan);
        apply_edits(tree, vec![(solution, edits)])
    }

    /// Derives a plan from the first solution only.
    pub fn replace_with(
        &self,
        tree: &Value,
        f: impl FnOnce(&Solution) -> Option<Plan>,
    ) -> MatchResult<Value> {
        let Some(solution) = self.solutions(tree).first()? else {
            return Ok(tree.clone());
        };
        let Some(plan) = f(&solution) else {
            return Ok(tree.clone());
        };
        let edits = plan_edits(&solution, &plan);
        apply_edits(tree, vec![(solution, edits)])
    }

    /// Applies `plan` to every solution.
    pub fn replace_all(&self, tree: &Value, plan: &Plan) -> MatchResult<Value> {
        self.replace_all_with(tree, |_| Some(plan.clone()))
    }

    /// Derives a plan per solution; `None` skips that solution.
    pub fn replace_all_with(
        &self,
        tree: &Value,
        mut f: impl FnMut(&Solution) -> Option<Plan>,
    ) -> MatchResult<Value> {
        let mut batches = Vec::new();
        for item in self.solutions(tree) {
            let solution = item?;
            if let Some(plan) = f(&solution) {
                let edits = plan_edits(&solution, &plan);
                batches.push((solution, edits));
            }
        }
        apply_edits(tree, batches)
    }

    /// Fully general rewriting: the callback hands back raw edits.
    pub fn edit(
        &self,
        tree: &Value,
        mut f: impl FnMut(&Solution) -> Vec<Edit>,
    ) -> MatchResult<Value> {
        let mut batches = Vec::new();
        for item in self.solutions(tree) {
            let solution = item?;
            let edits = f(&solution);
            if !edits.is_empty() {
                batches.push((solution, edits));
            }
        }
        apply_edits(tree, batches)
    }
}

/// Compiles a pattern; the free-function spelling of
/// [`Pattern::compile`].
pub fn compile(src: &str) -> Result<Pattern, CompileError> {
    Pattern::compile(src)
}
