use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{
    BlockId, BlockKind, ControlFlowGraph, EdgeKind, ExecutionPath, Finding, Instr, Outcome,
    PathStep, UnreachableReason,
};

/// Result of verifying one control flow graph: the outcome sets reachable at
/// each exit with a representative path per outcome, plus structured
/// findings. Verification never fails on a well-formed graph and never
/// mutates it.
#[derive(Clone, Debug)]
pub(crate) struct Verification {
    pub(crate) exits: Vec<ExitOutcomes>,
    pub(crate) findings: Vec<Finding>,
}

#[derive(Clone, Debug)]
pub(crate) struct ExitOutcomes {
    pub(crate) exit: BlockId,
    pub(crate) outcomes: Vec<(Outcome, ExecutionPath)>,
}

impl Verification {
    pub(crate) fn outcomes_at(&self, exit: BlockId) -> &[(Outcome, ExecutionPath)] {
        self.exits
            .iter()
            .find(|report| report.exit == exit)
            .map(|report| report.outcomes.as_slice())
            .unwrap_or(&[])
    }
}

/// Enumerate every execution path from entry to an exit and compute its
/// Outcome.
///
/// The enumeration is bounded: branch points are call throw-sites, `if`
/// arms, and the loop {skip, one-pass} choice; backedges are never
/// traversed, so the traversable graph is acyclic. Masking is a pure data
/// transformation on the pending outcome: a return or throw executing while
/// an outcome is pending, or an exceptional edge taken over a different
/// pending outcome, replaces it and records a mask event.
pub(crate) fn verify(cfg: &ControlFlowGraph) -> Verification {
    let mut walker = Walker {
        cfg,
        return_outcomes: BTreeMap::new(),
        throw_outcomes: BTreeMap::new(),
        masks: BTreeMap::new(),
    };
    let mut steps = Vec::new();
    let mut path_masks = Vec::new();
    walker.walk(cfg.entry, None, &mut steps, &mut path_masks);

    let mut findings = Vec::new();
    for ((at, delivered, discarded), path) in walker.masks {
        findings.push(Finding::MaskedOutcome {
            at,
            delivered,
            discarded,
            path,
        });
    }
    findings.extend(unreachable_findings(cfg));

    Verification {
        exits: vec![
            ExitOutcomes {
                exit: cfg.return_exit,
                outcomes: walker.return_outcomes.into_iter().collect(),
            },
            ExitOutcomes {
                exit: cfg.throw_exit,
                outcomes: walker.throw_outcomes.into_iter().collect(),
            },
        ],
        findings,
    }
}

struct Walker<'a> {
    cfg: &'a ControlFlowGraph,
    return_outcomes: BTreeMap<Outcome, ExecutionPath>,
    throw_outcomes: BTreeMap<Outcome, ExecutionPath>,
    masks: BTreeMap<MaskEvent, ExecutionPath>,
}

type MaskEvent = (BlockId, Outcome, Outcome);

impl Walker<'_> {
    fn walk(
        &mut self,
        block: BlockId,
        pending_in: Option<Outcome>,
        steps: &mut Vec<PathStep>,
        path_masks: &mut Vec<MaskEvent>,
    ) {
        let cfg = self.cfg;
        let current = cfg.block(block);
        let masks_before = path_masks.len();

        let mut pending = pending_in;
        // Entering a handler consumes the in-flight exception.
        if matches!(current.kind, BlockKind::CatchEntry { .. }) {
            pending = None;
        }
        for instr in &current.instructions {
            match instr {
                Instr::Return(value) => {
                    let produced = Outcome::Returns(value.clone());
                    pending = Some(mask_over(block, produced, pending.take(), path_masks));
                }
                Instr::Throw(exception) => {
                    let produced = Outcome::Throws(exception.clone());
                    pending = Some(mask_over(block, produced, pending.take(), path_masks));
                }
                Instr::Assign { .. } | Instr::Call { .. } => {}
            }
        }

        steps.push(PathStep {
            block,
            pending: pending.clone(),
        });

        if cfg.is_exit(block) {
            self.finalize(block, pending, steps, path_masks);
        } else {
            for edge in cfg.successors(block) {
                let mark = path_masks.len();
                let next_pending = match &edge.kind {
                    EdgeKind::Backedge => continue,
                    EdgeKind::Normal | EdgeKind::Branch => pending.clone(),
                    EdgeKind::Exception(exception) => {
                        let raised = Outcome::Throws(exception.clone());
                        match &pending {
                            None => Some(raised),
                            // Continuation of the same unwind after a
                            // normally-completing finally copy.
                            Some(existing) if *existing.effective() == raised => pending.clone(),
                            Some(existing) => {
                                let discarded = existing.effective().clone();
                                path_masks.push((block, raised.clone(), discarded.clone()));
                                Some(Outcome::MaskedByFinally {
                                    delivered: Box::new(raised),
                                    discarded: Box::new(discarded),
                                })
                            }
                        }
                    }
                };
                self.walk(edge.to, next_pending, steps, path_masks);
                path_masks.truncate(mark);
            }
        }

        steps.pop();
        path_masks.truncate(masks_before);
    }

    fn finalize(
        &mut self,
        exit: BlockId,
        pending: Option<Outcome>,
        steps: &[PathStep],
        path_masks: &[MaskEvent],
    ) {
        let outcome = match &pending {
            Some(outcome) => outcome.effective().clone(),
            // Fall-off-end completion at the return exit.
            None => Outcome::Returns(None),
        };
        let path = ExecutionPath {
            steps: steps.to_vec(),
        };
        let map = if exit == self.cfg.return_exit {
            &mut self.return_outcomes
        } else {
            &mut self.throw_outcomes
        };
        map.entry(outcome).or_insert_with(|| path.clone());
        for event in path_masks {
            self.masks
                .entry(event.clone())
                .or_insert_with(|| path.clone());
        }
    }
}

/// Replace a pending outcome with a newly produced one, recording the mask.
/// Only reachable inside finally copies entered with a pending outcome.
fn mask_over(
    at: BlockId,
    produced: Outcome,
    pending: Option<Outcome>,
    path_masks: &mut Vec<MaskEvent>,
) -> Outcome {
    match pending {
        None => produced,
        Some(old) => {
            let discarded = old.effective().clone();
            path_masks.push((at, produced.clone(), discarded.clone()));
            Outcome::MaskedByFinally {
                delivered: Box::new(produced),
                discarded: Box::new(discarded),
            }
        }
    }
}

/// Blocks not reachable from entry are a diagnosable defect, not a crash.
/// A catch entry with no incoming edge means no throw site in its guarded
/// region can match the clause.
fn unreachable_findings(cfg: &ControlFlowGraph) -> Vec<Finding> {
    let mut reachable = BTreeSet::new();
    let mut queue = vec![cfg.entry];
    while let Some(block) = queue.pop() {
        if !reachable.insert(block) {
            continue;
        }
        for edge in cfg.successors(block) {
            queue.push(edge.to);
        }
    }

    let mut findings = Vec::new();
    for block in &cfg.blocks {
        if reachable.contains(&block.id) || cfg.is_exit(block.id) {
            continue;
        }
        let has_incoming = cfg.edges.iter().any(|edge| edge.to == block.id);
        let reason = match &block.kind {
            BlockKind::CatchEntry { catches } if !has_incoming => {
                UnreachableReason::UnmatchedCatch {
                    catches: catches.clone(),
                }
            }
            _ => UnreachableReason::DeadCode,
        };
        findings.push(Finding::UnreachableBlock {
            block: block.id,
            reason,
        });
    }
    findings
}
