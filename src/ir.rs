#![allow(dead_code)]

use crate::ast::{CallSite, ExceptionValue};

/// Intermediate representation for exception-aware control flow graphs.
///
/// Blocks and edges are stored flat, indexed by [`BlockId`]; the graph is
/// immutable once built and the verifier never mutates it.
#[derive(Clone, Debug)]
pub(crate) struct ControlFlowGraph {
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) edges: Vec<FlowEdge>,
    pub(crate) entry: BlockId,
    /// Exit reached by normal returns and fall-off-end completion.
    pub(crate) return_exit: BlockId,
    /// Exit reached by exceptions no enclosing catch clause matches.
    pub(crate) throw_exit: BlockId,
}

impl ControlFlowGraph {
    pub(crate) fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub(crate) fn successors(&self, id: BlockId) -> impl Iterator<Item = &FlowEdge> {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    pub(crate) fn is_exit(&self, id: BlockId) -> bool {
        id == self.return_exit || id == self.throw_exit
    }
}

/// Index of a basic block within its graph.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct BlockId(pub(crate) usize);

/// Basic block: straight-line instructions with no internal branch.
#[derive(Clone, Debug)]
pub(crate) struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    pub(crate) instructions: Vec<Instr>,
}

/// Role of a block, used by the verifier's outcome transfer function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum BlockKind {
    Plain,
    /// Handler entry for one catch clause; entering it consumes the
    /// in-flight exception.
    CatchEntry { catches: String },
    /// Entry of one inlined copy of a finally block. Copies of the same
    /// syntactic finally share the id.
    FinallyEntry { finally: FinallyId },
    ReturnExit,
    ThrowExit,
}

/// Identity of a syntactic finally block across its inlined copies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct FinallyId(pub(crate) usize);

/// Directed edge between basic blocks.
#[derive(Clone, Debug)]
pub(crate) struct FlowEdge {
    pub(crate) from: BlockId,
    pub(crate) to: BlockId,
    pub(crate) kind: EdgeKind,
}

/// Edge classification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum EdgeKind {
    /// Sequential flow, including unwind chains for pending returns.
    Normal,
    /// Symbolic branch out of an `if` condition or loop header.
    Branch,
    /// Symbolic loop backedge; recorded for completeness, never traversed.
    Backedge,
    /// Exceptional flow carrying the raised value.
    Exception(ExceptionValue),
}

/// Lowered statement. Calls that may throw and return/throw instructions
/// terminate their block.
#[derive(Clone, Debug)]
pub(crate) enum Instr {
    Assign { target: String, value: Value },
    Call { result: Option<String>, call: CallSite },
    Return(Option<Value>),
    Throw(ExceptionValue),
}

/// Symbolic value slot; no constant propagation is performed.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Value {
    Const(i64),
    Var(String),
    /// Result of a call, keyed by the callee name.
    Result(String),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Const(literal) => write!(f, "{literal}"),
            Value::Var(name) => f.write_str(name),
            Value::Result(callee) => write!(f, "{callee}()"),
        }
    }
}

/// Effective result of one execution path.
///
/// `MaskedByFinally` only exists while a path is being walked; at an exit it
/// finalizes to its delivered outcome and the mask becomes a finding.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Outcome {
    Returns(Option<Value>),
    Throws(ExceptionValue),
    MaskedByFinally {
        delivered: Box<Outcome>,
        discarded: Box<Outcome>,
    },
}

impl Outcome {
    /// Outcome actually delivered at an exit, with mask wrappers peeled off.
    pub(crate) fn effective(&self) -> &Outcome {
        match self {
            Outcome::MaskedByFinally { delivered, .. } => delivered.effective(),
            other => other,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Returns(None) => f.write_str("returns void"),
            Outcome::Returns(Some(value)) => write!(f, "returns {value}"),
            Outcome::Throws(exception) => write!(f, "throws {exception}"),
            Outcome::MaskedByFinally {
                delivered,
                discarded,
            } => {
                write!(f, "{delivered} (masking {discarded})")
            }
        }
    }
}

/// One enumerated path from entry to an exit, annotated with the pending
/// outcome at each step. Generated on demand; never persisted.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct ExecutionPath {
    pub(crate) steps: Vec<PathStep>,
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct PathStep {
    pub(crate) block: BlockId,
    pub(crate) pending: Option<Outcome>,
}

impl ExecutionPath {
    pub(crate) fn blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.steps.iter().map(|step| step.block)
    }
}

/// Structured analysis finding. Findings are values returned to the caller;
/// no defect class aborts verification.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Finding {
    /// A finally block discarded a pending return or in-flight exception.
    MaskedOutcome {
        at: BlockId,
        delivered: Outcome,
        discarded: Outcome,
        path: ExecutionPath,
    },
    /// Block with no incoming edge; catch entries get a dedicated reason.
    UnreachableBlock {
        block: BlockId,
        reason: UnreachableReason,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum UnreachableReason {
    DeadCode,
    /// Catch clause whose tag matches no throw site in its guarded region.
    UnmatchedCatch { catches: String },
}
