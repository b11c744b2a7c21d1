use crate::ast::{
    Assign, CallSite, CatchClause, ExceptionValue, Expr, IfStatement, LoopStatement, Method,
    Return, Statement, TryStatement,
};
use crate::ir::{
    BasicBlock, BlockId, BlockKind, ControlFlowGraph, EdgeKind, FinallyId, FlowEdge, Instr, Value,
};

/// Build a control flow graph for one method body.
///
/// Construction is total: every statement has an edge-production rule, and
/// statements after an abrupt terminator land in orphan blocks that the
/// verifier reports as unreachable instead of dropping them.
///
/// A finally block is inserted on every edge leaving its try/catch region:
/// normal completion and catch completions share one inlined copy, and each
/// abrupt exit (return, throw, unhandled exception) gets its own copy chain
/// whose normal exit continues the unwinding. A finally that itself returns
/// or throws therefore ends its copies abruptly, which is exactly where the
/// pending outcome of the guarded region gets discarded.
pub(crate) fn build_cfg(method: &Method) -> ControlFlowGraph {
    let mut builder = Builder::new();
    let entry = builder.entry;
    if let Some(end) = builder.lower_stmts(&method.body, Some(entry), &[]) {
        // Fall off the end of the body: completes as a void return.
        let return_exit = builder.return_exit;
        builder.edge(end, return_exit, EdgeKind::Normal);
    }
    builder.finish()
}

struct Builder {
    blocks: Vec<BasicBlock>,
    edges: Vec<FlowEdge>,
    entry: BlockId,
    return_exit: BlockId,
    throw_exit: BlockId,
    next_finally: usize,
}

/// Enclosing try context while lowering. `catch_targets` are pre-created
/// handler entries; `catches_active` is false inside catch bodies, where the
/// clauses of the same try no longer intercept.
#[derive(Clone)]
struct Frame<'a> {
    catch_targets: Vec<CatchTarget<'a>>,
    catches_active: bool,
    finally_block: Option<(FinallyId, &'a [Statement])>,
}

#[derive(Clone)]
struct CatchTarget<'a> {
    clause: &'a CatchClause,
    entry: BlockId,
}

struct FinallyCopy {
    entry: BlockId,
    /// None when the finally body itself ends abruptly.
    normal_exit: Option<BlockId>,
}

impl Builder {
    fn new() -> Self {
        let mut builder = Builder {
            blocks: Vec::new(),
            edges: Vec::new(),
            entry: BlockId(0),
            return_exit: BlockId(0),
            throw_exit: BlockId(0),
            next_finally: 0,
        };
        builder.entry = builder.new_block(BlockKind::Plain);
        builder.return_exit = builder.new_block(BlockKind::ReturnExit);
        builder.throw_exit = builder.new_block(BlockKind::ThrowExit);
        builder
    }

    fn finish(self) -> ControlFlowGraph {
        ControlFlowGraph {
            blocks: self.blocks,
            edges: self.edges,
            entry: self.entry,
            return_exit: self.return_exit,
            throw_exit: self.throw_exit,
        }
    }

    fn new_block(&mut self, kind: BlockKind) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock {
            id,
            kind,
            instructions: Vec::new(),
        });
        id
    }

    fn push(&mut self, block: BlockId, instr: Instr) {
        self.blocks[block.0].instructions.push(instr);
    }

    fn edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.edges.push(FlowEdge { from, to, kind });
    }

    fn fresh_finally(&mut self) -> FinallyId {
        let id = FinallyId(self.next_finally);
        self.next_finally += 1;
        id
    }

    /// Lower a statement sequence. Returns the open block where normal flow
    /// continues, or None when flow ended abruptly. Statements reached with
    /// no open block start an orphan block.
    fn lower_stmts<'a>(
        &mut self,
        stmts: &'a [Statement],
        mut cur: Option<BlockId>,
        frames: &[Frame<'a>],
    ) -> Option<BlockId> {
        for stmt in stmts {
            let block = match cur {
                Some(block) => block,
                None => self.new_block(BlockKind::Plain),
            };
            cur = match stmt {
                Statement::Assign(assign) => Some(self.lower_assign(block, assign, frames)),
                Statement::Call(call) => Some(self.lower_call(block, None, call, frames)),
                Statement::Return(ret) => {
                    self.lower_return(block, ret, frames);
                    None
                }
                Statement::Throw(throw) => {
                    self.push(block, Instr::Throw(throw.exception.clone()));
                    self.dispatch(block, &throw.exception, frames);
                    None
                }
                Statement::Try(try_stmt) => self.lower_try(block, try_stmt, frames),
                Statement::If(if_stmt) => self.lower_if(block, if_stmt, frames),
                Statement::Loop(loop_stmt) => Some(self.lower_loop(block, loop_stmt, frames)),
            };
        }
        cur
    }

    fn lower_assign<'a>(
        &mut self,
        block: BlockId,
        assign: &Assign,
        frames: &[Frame<'a>],
    ) -> BlockId {
        match &assign.value {
            Expr::Const(literal) => {
                self.push(
                    block,
                    Instr::Assign {
                        target: assign.target.clone(),
                        value: Value::Const(*literal),
                    },
                );
                block
            }
            Expr::Var(name) => {
                self.push(
                    block,
                    Instr::Assign {
                        target: assign.target.clone(),
                        value: Value::Var(name.clone()),
                    },
                );
                block
            }
            Expr::Call(call) => self.lower_call(block, Some(assign.target.clone()), call, frames),
        }
    }

    /// Lower a call. When the call may throw it terminates its block: one
    /// exceptional edge per throwable spec, then a fresh block for normal
    /// completion.
    fn lower_call<'a>(
        &mut self,
        block: BlockId,
        result: Option<String>,
        call: &CallSite,
        frames: &[Frame<'a>],
    ) -> BlockId {
        self.push(
            block,
            Instr::Call {
                result,
                call: call.clone(),
            },
        );
        if call.may_throw.is_empty() {
            return block;
        }
        for exception in &call.may_throw {
            self.dispatch(block, exception, frames);
        }
        let next = self.new_block(BlockKind::Plain);
        self.edge(block, next, EdgeKind::Normal);
        next
    }

    fn lower_return<'a>(&mut self, mut block: BlockId, ret: &Return, frames: &[Frame<'a>]) {
        let value = match &ret.value {
            None => None,
            Some(Expr::Const(literal)) => Some(Value::Const(*literal)),
            Some(Expr::Var(name)) => Some(Value::Var(name.clone())),
            Some(Expr::Call(call)) => {
                block = self.lower_call(block, None, call, frames);
                Some(Value::Result(call.name.clone()))
            }
        };
        self.push(block, Instr::Return(value));
        self.unwind_return(block, frames);
    }

    /// Chain the pending return through every enclosing finally, innermost
    /// first, then to the return exit. A finally copy that ends abruptly
    /// takes over the path, so the chain stops there.
    fn unwind_return<'a>(&mut self, mut from: BlockId, frames: &[Frame<'a>]) {
        for depth in (0..frames.len()).rev() {
            if let Some((finally, body)) = frames[depth].finally_block {
                let copy = self.inline_finally(finally, body, &frames[..depth]);
                self.edge(from, copy.entry, EdgeKind::Normal);
                match copy.normal_exit {
                    Some(exit) => from = exit,
                    None => return,
                }
            }
        }
        let return_exit = self.return_exit;
        self.edge(from, return_exit, EdgeKind::Normal);
    }

    /// Route a raised exception: first matching catch clause of the
    /// innermost active try wins; every finally crossed on the way out is
    /// inlined into the unwind chain; anything unmatched reaches the
    /// unhandled-exception exit.
    fn dispatch<'a>(&mut self, mut from: BlockId, exception: &ExceptionValue, frames: &[Frame<'a>]) {
        for depth in (0..frames.len()).rev() {
            if frames[depth].catches_active {
                let target = frames[depth]
                    .catch_targets
                    .iter()
                    .find(|target| exception.satisfies(&target.clause.catches))
                    .map(|target| target.entry);
                if let Some(entry) = target {
                    self.edge(from, entry, EdgeKind::Exception(exception.clone()));
                    return;
                }
            }
            if let Some((finally, body)) = frames[depth].finally_block {
                let copy = self.inline_finally(finally, body, &frames[..depth]);
                self.edge(from, copy.entry, EdgeKind::Exception(exception.clone()));
                match copy.normal_exit {
                    Some(exit) => from = exit,
                    None => return,
                }
            }
        }
        let throw_exit = self.throw_exit;
        self.edge(from, throw_exit, EdgeKind::Exception(exception.clone()));
    }

    /// Inline one copy of a finally body, lowered against the frames outside
    /// its own try so its abrupt exits unwind correctly.
    fn inline_finally<'a>(
        &mut self,
        finally: FinallyId,
        body: &'a [Statement],
        outer: &[Frame<'a>],
    ) -> FinallyCopy {
        let entry = self.new_block(BlockKind::FinallyEntry { finally });
        let normal_exit = self.lower_stmts(body, Some(entry), outer);
        FinallyCopy { entry, normal_exit }
    }

    fn lower_try<'a>(
        &mut self,
        block: BlockId,
        try_stmt: &'a TryStatement,
        frames: &[Frame<'a>],
    ) -> Option<BlockId> {
        let finally_block = try_stmt
            .finally_block
            .as_deref()
            .map(|body| (self.fresh_finally(), body));
        let catch_targets: Vec<CatchTarget<'_>> = try_stmt
            .catches
            .iter()
            .map(|clause| CatchTarget {
                clause,
                entry: self.new_block(BlockKind::CatchEntry {
                    catches: clause.catches.clone(),
                }),
            })
            .collect();

        let mut body_frames = frames.to_vec();
        body_frames.push(Frame {
            catch_targets: catch_targets.clone(),
            catches_active: true,
            finally_block,
        });
        let body_end = self.lower_stmts(&try_stmt.body, Some(block), &body_frames);

        let mut normal_ends = Vec::new();
        if let Some(end) = body_end {
            normal_ends.push(end);
        }
        for target in &catch_targets {
            let mut catch_frames = frames.to_vec();
            catch_frames.push(Frame {
                catch_targets: catch_targets.clone(),
                catches_active: false,
                finally_block,
            });
            if let Some(end) = self.lower_stmts(&target.clause.body, Some(target.entry), &catch_frames)
            {
                normal_ends.push(end);
            }
        }

        match finally_block {
            Some((finally, body)) if !normal_ends.is_empty() => {
                let copy = self.inline_finally(finally, body, frames);
                for end in normal_ends {
                    self.edge(end, copy.entry, EdgeKind::Normal);
                }
                copy.normal_exit
            }
            Some(_) => None,
            None => self.join(normal_ends),
        }
    }

    fn lower_if<'a>(
        &mut self,
        block: BlockId,
        if_stmt: &'a IfStatement,
        frames: &[Frame<'a>],
    ) -> Option<BlockId> {
        let mut ends = Vec::new();

        let then_entry = self.new_block(BlockKind::Plain);
        self.edge(block, then_entry, EdgeKind::Branch);
        if let Some(end) = self.lower_stmts(&if_stmt.then_branch, Some(then_entry), frames) {
            ends.push((end, EdgeKind::Normal));
        }

        if if_stmt.else_branch.is_empty() {
            ends.push((block, EdgeKind::Branch));
        } else {
            let else_entry = self.new_block(BlockKind::Plain);
            self.edge(block, else_entry, EdgeKind::Branch);
            if let Some(end) = self.lower_stmts(&if_stmt.else_branch, Some(else_entry), frames) {
                ends.push((end, EdgeKind::Normal));
            }
        }

        if ends.is_empty() {
            return None;
        }
        let join = self.new_block(BlockKind::Plain);
        for (end, kind) in ends {
            self.edge(end, join, kind);
        }
        Some(join)
    }

    /// Loops contribute zero or one symbolic pass; the backedge is recorded
    /// but never traversed by the verifier.
    fn lower_loop<'a>(
        &mut self,
        block: BlockId,
        loop_stmt: &'a LoopStatement,
        frames: &[Frame<'a>],
    ) -> BlockId {
        let join = self.new_block(BlockKind::Plain);
        self.edge(block, join, EdgeKind::Branch);
        let body_entry = self.new_block(BlockKind::Plain);
        self.edge(block, body_entry, EdgeKind::Branch);
        if let Some(body_end) = self.lower_stmts(&loop_stmt.body, Some(body_entry), frames) {
            self.edge(body_end, join, EdgeKind::Branch);
            self.edge(body_end, body_entry, EdgeKind::Backedge);
        }
        join
    }

    fn join(&mut self, ends: Vec<BlockId>) -> Option<BlockId> {
        match ends.len() {
            0 => None,
            1 => Some(ends[0]),
            _ => {
                let join = self.new_block(BlockKind::Plain);
                for end in ends {
                    self.edge(end, join, EdgeKind::Normal);
                }
                Some(join)
            }
        }
    }
}
