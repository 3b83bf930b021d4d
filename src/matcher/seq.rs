//! Sequence-span matching: item stepping and the quantifier policies.
//!
//! Greedy tries "one more" before "stop", reluctant the reverse, and
//! possessive plays greedy but cuts every choice point it created the
//! moment it commits. Counted ranges try each count ascending, each
//! count committed like a possessive.

use std::rc::Rc;

use crate::ir::{Policy, SeqItem, SeqUnit};
use crate::occurrence::{PathCell, Step};
use crate::value::Value;

use super::{flow, Engine, Flow, Goal, RepCtx, SeqFin};

impl<'p, 't> Engine<'p, 't> {
    pub(super) fn exec_seq_step(
        &mut self,
        items: &'p [SeqItem],
        idx: usize,
        seq: &'t [Value],
        base: Rc<PathCell>,
        end: usize,
        pos: usize,
        fin: Rc<SeqFin<'p, 't>>,
    ) -> Flow {
        if idx == items.len() {
            return self.complete_seq(pos, &fin);
        }
        let item = &items[idx];

        // Unquantified, unbound one-element units step directly.
        if item.quant.is_one() && item.bind.is_none() {
            match &item.unit {
                SeqUnit::Elem(pat) => {
                    if pos >= end {
                        return Flow::Fail;
                    }
                    self.push_goals(vec![
                        Goal::Node {
                            pat,
                            node: &seq[pos],
                            path: PathCell::push(&base, Step::Index(pos)),
                        },
                        Goal::SeqStep {
                            items,
                            idx: idx + 1,
                            seq,
                            base,
                            end,
                            pos: pos + 1,
                            fin,
                        },
                    ]);
                    return Flow::Cont;
                }
                SeqUnit::Look {
                    negated,
                    items: look_items,
                } => {
                    self.push_goals(vec![
                        Goal::LookSeq {
                            negated: *negated,
                            items: look_items,
                            seq,
                            base: Rc::clone(&base),
                            end,
                            pos,
                        },
                        Goal::SeqStep {
                            items,
                            idx: idx + 1,
                            seq,
                            base,
                            end,
                            pos,
                            fin,
                        },
                    ]);
                    return Flow::Cont;
                }
                SeqUnit::Guard(expr) => {
                    self.push_goals(vec![
                        Goal::GuardCheck { expr },
                        Goal::SeqStep {
                            items,
                            idx: idx + 1,
                            seq,
                            base,
                            end,
                            pos,
                            fin,
                        },
                    ]);
                    return Flow::Cont;
                }
                _ => {}
            }
        }

        let ctx = RepCtx {
            item,
            items,
            idx,
            seq,
            base,
            end,
            span_start: pos,
            outer_fin: fin,
            cut_mark: self.choices.len(),
        };
        if item.quant.policy == Policy::Counted {
            self.counted_alternatives(ctx, pos)
        } else {
            self.exec_rep_decide(ctx, pos, 0, false)
        }
    }

    pub(super) fn complete_seq(&mut self, pos: usize, fin: &SeqFin<'p, 't>) -> Flow {
        match fin {
            SeqFin::Done { require_end, end } => flow(!*require_end || pos == *end),
            SeqFin::Rep {
                ctx,
                count,
                instance_start,
            } => {
                let stuck = pos == *instance_start;
                self.exec_rep_decide(ctx.clone(), pos, *count, stuck)
            }
            SeqFin::RepX {
                ctx,
                count,
                target,
                cut_to,
                instance_start,
            } => {
                if pos == *instance_start && *count < *target {
                    // The instance consumed nothing; repeating it cannot
                    // reach the count.
                    return Flow::Fail;
                }
                self.exec_rep_exact(ctx.clone(), pos, *count, *target, Some(*cut_to))
            }
        }
    }

    pub(super) fn exec_rep_decide(
        &mut self,
        ctx: RepCtx<'p, 't>,
        pos: usize,
        count: usize,
        stuck: bool,
    ) -> Flow {
        let quant = ctx.item.quant;
        let mut more: Vec<Vec<Goal<'p, 't>>> = Vec::new();
        if count < quant.max && !stuck {
            let fin = |c: &RepCtx<'p, 't>, instance_start: usize| {
                Rc::new(SeqFin::Rep {
                    ctx: c.clone(),
                    count: count + 1,
                    instance_start,
                })
            };
            more = instance_alternatives(&ctx, pos, &fin, |next_pos, zero_width| {
                Goal::RepDecide {
                    ctx: ctx.clone(),
                    pos: next_pos,
                    count: count + 1,
                    stuck: zero_width,
                }
            });
        }
        let possessive = quant.policy == Policy::Possessive;
        let stop = if count >= quant.min {
            Some(stop_goals(&ctx, pos, possessive.then_some(ctx.cut_mark)))
        } else {
            None
        };

        let mut alternatives = Vec::new();
        match quant.policy {
            Policy::Reluctant => {
                if let Some(stop) = stop {
                    alternatives.push(stop);
                }
                alternatives.extend(more);
            }
            _ => {
                alternatives.extend(more);
                if let Some(stop) = stop {
                    alternatives.push(stop);
                }
            }
        }
        self.push_choice(alternatives)
    }

    /// `{m,n}`: one alternative per count, ascending. Each attempt cuts
    /// its internal choice points when it completes.
    fn counted_alternatives(&mut self, ctx: RepCtx<'p, 't>, pos: usize) -> Flow {
        let quant = ctx.item.quant;
        let remaining = ctx.end.saturating_sub(pos);
        let cap = if quant.max == usize::MAX {
            quant.min.max(remaining)
        } else {
            quant.max
        };
        if quant.min > cap {
            return Flow::Fail;
        }
        let alternatives: Vec<Vec<Goal<'p, 't>>> = (quant.min..=cap)
            .map(|target| {
                vec![Goal::RepExact {
                    ctx: ctx.clone(),
                    pos,
                    count: 0,
                    target,
                    cut_to: None,
                }]
            })
            .collect();
        self.push_choice(alternatives)
    }

    pub(super) fn exec_rep_exact(
        &mut self,
        ctx: RepCtx<'p, 't>,
        pos: usize,
        count: usize,
        target: usize,
        cut_to: Option<usize>,
    ) -> Flow {
        // First execution of an attempt records the choice height; the
        // cut on completion removes only this attempt's internals.
        let cut_to = cut_to.unwrap_or(self.choices.len());
        if count == target {
            let mut goals = vec![Goal::Cut { to: cut_to }];
            goals.extend(stop_goals(&ctx, pos, None));
            self.push_goals(goals);
            return Flow::Cont;
        }
        let fin = |c: &RepCtx<'p, 't>, instance_start: usize| {
            Rc::new(SeqFin::RepX {
                ctx: c.clone(),
                count: count + 1,
                target,
                cut_to,
                instance_start,
            })
        };
        let alternatives = instance_alternatives(&ctx, pos, &fin, |next_pos, zero_width| {
            if zero_width && count + 1 < target {
                Goal::Fail
            } else {
                Goal::RepExact {
                    ctx: ctx.clone(),
                    pos: next_pos,
                    count: count + 1,
                    target,
                    cut_to: Some(cut_to),
                }
            }
        });
        self.push_choice(alternatives)
    }
}

/// Goal lists that each match one more instance of the unit, then resume
/// the quantifier. Span-shaped instances resume through `make_fin` (their
/// end position is only known once they finish); one-element and
/// zero-width instances resume directly via `resume`, whose second
/// argument flags a zero-width instance.
fn instance_alternatives<'p, 't>(
    ctx: &RepCtx<'p, 't>,
    pos: usize,
    make_fin: &dyn Fn(&RepCtx<'p, 't>, usize) -> Rc<SeqFin<'p, 't>>,
    resume: impl Fn(usize, bool) -> Goal<'p, 't>,
) -> Vec<Vec<Goal<'p, 't>>> {
    match &ctx.item.unit {
        SeqUnit::Elem(pat) => {
            if pos >= ctx.end {
                return Vec::new();
            }
            vec![vec![
                Goal::Node {
                    pat,
                    node: &ctx.seq[pos],
                    path: PathCell::push(&ctx.base, Step::Index(pos)),
                },
                resume(pos + 1, false),
            ]]
        }
        SeqUnit::Span(sub_items) => {
            vec![vec![Goal::SeqStep {
                items: sub_items,
                idx: 0,
                seq: ctx.seq,
                base: Rc::clone(&ctx.base),
                end: ctx.end,
                pos,
                fin: make_fin(ctx, pos),
            }]]
        }
        SeqUnit::AltSpan(alts) => alts
            .iter()
            .map(|alt| {
                vec![Goal::SeqStep {
                    items: std::slice::from_ref(alt),
                    idx: 0,
                    seq: ctx.seq,
                    base: Rc::clone(&ctx.base),
                    end: ctx.end,
                    pos,
                    fin: make_fin(ctx, pos),
                }]
            })
            .collect(),
        SeqUnit::Look {
            negated,
            items: look_items,
        } => {
            vec![vec![
                Goal::LookSeq {
                    negated: *negated,
                    items: look_items,
                    seq: ctx.seq,
                    base: Rc::clone(&ctx.base),
                    end: ctx.end,
                    pos,
                },
                resume(pos, true),
            ]]
        }
        SeqUnit::Guard(expr) => {
            vec![vec![Goal::GuardCheck { expr }, resume(pos, true)]]
        }
    }
}

/// End the quantifier at `pos`: optionally cut, bind the consumed span,
/// continue with the item after it.
fn stop_goals<'p, 't>(
    ctx: &RepCtx<'p, 't>,
    pos: usize,
    cut: Option<usize>,
) -> Vec<Goal<'p, 't>> {
    let mut goals = Vec::new();
    if let Some(to) = cut {
        goals.push(Goal::Cut { to });
    }
    if let Some(bind) = ctx.item.bind {
        goals.push(Goal::BindSpan {
            bind,
            seq: ctx.seq,
            base: Rc::clone(&ctx.base),
            start: ctx.span_start,
            end: pos,
        });
    }
    goals.push(Goal::SeqStep {
        items: ctx.items,
        idx: ctx.idx + 1,
        seq: ctx.seq,
        base: Rc::clone(&ctx.base),
        end: ctx.end,
        pos,
        fin: Rc::clone(&ctx.outer_fin),
    });
    goals
}
