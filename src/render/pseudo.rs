//! The structured pseudocode renderer.
//!
//! Consumes the CFG and emits one structured listing per procedure. Recovery is
//! pattern-based: conditionals whose arms reconverge at a common post-dominator
//! become `if`/`else`, back edges to a dominating block become `while` or
//! `do`/`while` loops, calls and returns map directly, and any shape that resists
//! structuring falls back to a labeled `goto L_<hex>` with a comment stating the
//! reason. Every statement carries a trailing `// @0x<addr>: <hex>` evidence
//! comment citing the exact input bytes it was inferred from.
//!
//! Output uses four-space indentation, LF line endings, no trailing whitespace,
//! and is byte-for-byte deterministic.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{
        cfg::{BasicBlock, EdgeKind, TerminatorKind},
        procedures::{DetectionReason, Procedure},
    },
    assembly::{ConditionMask, Instruction, Operand},
    render::{Labels, UNRESOLVED_TARGET},
    AnalysisConfig, AnalysisResult, PseudocodeStyle,
};

/// Render the pseudocode listing for the whole analysis.
///
/// An artifact with no sections produces an empty listing.
#[must_use]
pub fn render_pseudocode(result: &AnalysisResult, config: &AnalysisConfig) -> String {
    if result.artifact.sections.is_empty() {
        return String::new();
    }

    let labels = Labels::build(result);
    let mut lines: Vec<Line> = Vec::new();

    lines.push(Line::flat(format!("// Module: {}", result.artifact.name)));
    lines.push(Line::flat(format!(
        "// Pseudocode reconstructed from branch structure ({})",
        config.pseudocode_style
    )));

    for procedure in &result.procedures {
        lines.push(Line::flat(String::new()));
        let mut emitter = ProcEmitter::new(result, config, &labels, procedure);
        emitter.emit();
        lines.extend(emitter.finish());
    }

    let mut out = String::new();
    for line in &lines {
        let rendered = format!("{}{}", "    ".repeat(line.indent), line.text);
        out.push_str(rendered.trim_end());
        out.push('\n');
    }
    out
}

/// One output line at a given indentation depth.
#[derive(Debug, Clone)]
struct Line {
    indent: usize,
    text: String,
}

impl Line {
    fn flat(text: String) -> Self {
        Line { indent: 0, text }
    }
}

/// How a branch arm resolves from the emitter's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arm {
    /// A block of this procedure.
    InProc(usize),
    /// A resolved address outside this procedure.
    OutOfProc(u64),
    /// Statically unknown.
    Unresolved,
}

/// Recovered shape of a natural loop.
#[derive(Debug, Clone, Copy)]
enum LoopShape {
    /// Condition at the header: `while (cond) { ... }`.
    While {
        negate: bool,
        body_start: Option<usize>,
        follow: Option<usize>,
    },
    /// Single-block self loop: `do { ... } while (cond);`.
    DoWhileSelf { negate: bool, follow: Option<usize> },
    /// Condition at the latch: `do { ... } while (cond);`.
    DoWhileTail {
        latch: usize,
        negate: bool,
        follow: Option<usize>,
    },
}

struct ProcEmitter<'a> {
    result: &'a AnalysisResult,
    config: &'a AnalysisConfig,
    labels: &'a Labels,
    procedure: &'a Procedure,
    blocks: Vec<&'a BasicBlock>,
    index: FxHashMap<u64, usize>,
    succs: Vec<Vec<usize>>,
    ipostdom: Vec<Option<usize>>,
    loops: FxHashMap<usize, LoopShape>,
    active: FxHashSet<usize>,
    visited: Vec<bool>,
    lines: Vec<Line>,
    block_start_line: FxHashMap<usize, usize>,
    goto_targets: FxHashSet<usize>,
    labeled: FxHashSet<usize>,
}

impl<'a> ProcEmitter<'a> {
    fn new(
        result: &'a AnalysisResult,
        config: &'a AnalysisConfig,
        labels: &'a Labels,
        procedure: &'a Procedure,
    ) -> Self {
        let blocks: Vec<&BasicBlock> = procedure
            .blocks
            .iter()
            .filter_map(|leader| {
                result
                    .cfgs
                    .iter()
                    .find_map(|cfg| cfg.blocks.get(leader))
            })
            .collect();

        let index: FxHashMap<u64, usize> = blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.leader, i))
            .collect();

        let succs: Vec<Vec<usize>> = blocks
            .iter()
            .map(|b| {
                b.edges
                    .iter()
                    .filter(|e| e.kind.is_intraprocedural())
                    .filter_map(|e| e.target.and_then(|t| index.get(&t).copied()))
                    .collect()
            })
            .collect();

        let count = blocks.len();
        let visited = vec![false; count];
        let mut emitter = ProcEmitter {
            result,
            config,
            labels,
            procedure,
            blocks,
            index,
            succs,
            ipostdom: vec![None; count],
            loops: FxHashMap::default(),
            active: FxHashSet::default(),
            visited,
            lines: Vec::new(),
            block_start_line: FxHashMap::default(),
            goto_targets: FxHashSet::default(),
            labeled: FxHashSet::default(),
        };
        if count > 0 && emitter.procedure.reason != DetectionReason::Orphan {
            emitter.compute_structure();
        }
        emitter
    }

    // ---- graph analyses -------------------------------------------------

    fn compute_structure(&mut self) {
        let count = self.blocks.len();
        let entry = self.index[&self.procedure.entry];

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); count];
        for (b, succs) in self.succs.iter().enumerate() {
            for &s in succs {
                preds[s].push(b);
            }
        }

        let rpo = reverse_postorder(count, entry, &self.succs);
        let idom = immediate_dominators(count, entry, &preds, &rpo);

        self.ipostdom = postdominators(count, &self.succs, &preds, &self.blocks_exit_set());
        self.detect_loops(&preds, &idom);
    }

    fn blocks_exit_set(&self) -> Vec<usize> {
        (0..self.blocks.len())
            .filter(|&b| self.succs[b].is_empty())
            .collect()
    }

    fn detect_loops(&mut self, preds: &[Vec<usize>], idom: &[Option<usize>]) {
        let count = self.blocks.len();
        let mut bodies: FxHashMap<usize, (FxHashSet<usize>, Vec<usize>)> = FxHashMap::default();

        for b in 0..count {
            for &h in &self.succs[b] {
                if dominates(h, b, idom) {
                    let entry = bodies.entry(h).or_insert_with(|| {
                        let mut set = FxHashSet::default();
                        set.insert(h);
                        (set, Vec::new())
                    });
                    entry.1.push(b);
                    // Natural loop: reverse reachability from the latch to the header.
                    let mut stack = vec![b];
                    while let Some(x) = stack.pop() {
                        if entry.0.insert(x) {
                            stack.extend(preds[x].iter().copied());
                        }
                    }
                }
            }
        }

        let mut headers: Vec<usize> = bodies.keys().copied().collect();
        headers.sort_unstable();
        for h in headers {
            let (body, latches) = &bodies[&h];
            if let Some(shape) = self.classify_loop(h, body, latches) {
                self.loops.insert(h, shape);
            }
        }
    }

    fn classify_loop(
        &self,
        h: usize,
        body: &FxHashSet<usize>,
        latches: &[usize],
    ) -> Option<LoopShape> {
        let header = self.blocks[h];

        if header.terminator_kind == TerminatorKind::Conditional {
            let (taken, not_taken) = self.conditional_arms(h);
            let arm_in = |arm: Arm| matches!(arm, Arm::InProc(i) if body.contains(&i));
            let arm_block = |arm: Arm| match arm {
                Arm::InProc(i) => Some(i),
                _ => None,
            };

            if body.len() == 1 && latches.contains(&h) {
                // Self loop: the test sits at the tail of the single block.
                let follow = if arm_in(taken) {
                    arm_block(not_taken)
                } else {
                    arm_block(taken)
                };
                // The exit must be a block of this procedure, or the loop loses
                // its continuation; anything else falls back to goto rendering.
                follow?;
                return Some(LoopShape::DoWhileSelf {
                    negate: !arm_in(taken),
                    follow,
                });
            }

            if arm_in(taken) != arm_in(not_taken) {
                let (inside, outside) = if arm_in(taken) {
                    (arm_block(taken), arm_block(not_taken))
                } else {
                    (arm_block(not_taken), arm_block(taken))
                };
                outside?;
                return Some(LoopShape::While {
                    negate: !arm_in(taken),
                    body_start: inside,
                    follow: outside,
                });
            }
            return None;
        }

        if let [latch] = latches {
            let latch = *latch;
            if latch != h && self.blocks[latch].terminator_kind == TerminatorKind::Conditional {
                let (taken, not_taken) = self.conditional_arms(latch);
                let to_header = |arm: Arm| arm == Arm::InProc(h);
                if to_header(taken) || to_header(not_taken) {
                    let follow = match if to_header(taken) { not_taken } else { taken } {
                        Arm::InProc(i) => Some(i),
                        _ => None,
                    };
                    follow?;
                    return Some(LoopShape::DoWhileTail {
                        latch,
                        negate: !to_header(taken),
                        follow,
                    });
                }
            }
        }

        None
    }

    /// The taken and not-taken arms of a conditional block.
    fn conditional_arms(&self, b: usize) -> (Arm, Arm) {
        let block = self.blocks[b];
        let mut taken = Arm::Unresolved;
        let mut not_taken = Arm::Unresolved;
        for edge in &block.edges {
            match edge.kind {
                EdgeKind::BranchTaken => {
                    taken = match edge.target {
                        Some(t) => self
                            .index
                            .get(&t)
                            .map_or(Arm::OutOfProc(t), |&i| Arm::InProc(i)),
                        None => Arm::Unresolved,
                    };
                }
                EdgeKind::BranchNotTaken => {
                    not_taken = match edge.target {
                        Some(t) => self
                            .index
                            .get(&t)
                            .map_or(Arm::OutOfProc(t), |&i| Arm::InProc(i)),
                        None => Arm::Unresolved,
                    };
                }
                _ => {}
            }
        }
        (taken, not_taken)
    }

    // ---- emission -------------------------------------------------------

    fn emit(&mut self) {
        let proc = self.procedure;
        let end = proc.end(&self.result.cfgs);
        self.lines.push(Line::flat(format!(
            "// {}  [0x{:08X}-0x{:08X})  confidence={}  linkage={}  detection={}",
            proc.name, proc.entry, end, proc.confidence, proc.linkage, proc.reason
        )));

        match self.config.pseudocode_style {
            PseudocodeStyle::CLike => self.lines.push(Line::flat(format!("{}() {{", proc.name))),
            PseudocodeStyle::PythonLike => {
                self.lines.push(Line::flat(format!("def {}():", proc.name)));
            }
        }

        if self.blocks.is_empty() {
            self.push(1, self.stmt("return".to_string()), None);
        } else if self.procedure.reason == DetectionReason::Orphan {
            self.push_comment(1, "blocks not reachable from any detected entry".to_string());
            for b in 0..self.blocks.len() {
                self.emit_linear_block(b, 1);
            }
        } else {
            let entry = self.index[&self.procedure.entry];
            self.emit_seq(Some(entry), &[], 1);
            let leftovers: Vec<usize> =
                (0..self.blocks.len()).filter(|&b| !self.visited[b]).collect();
            if !leftovers.is_empty() {
                self.push_comment(1, "shape not recovered; remaining blocks follow".to_string());
                for b in leftovers {
                    self.emit_linear_block(b, 1);
                }
            }
        }

        if self.config.pseudocode_style == PseudocodeStyle::CLike {
            self.lines.push(Line::flat("}".to_string()));
        }
    }

    /// Insert `L_<hex>:` labels for every block a goto referenced.
    fn finish(mut self) -> Vec<Line> {
        let mut inserts: Vec<(usize, Line)> = Vec::new();
        for &target in &self.goto_targets {
            if self.labeled.contains(&target) {
                continue;
            }
            if let Some(&at) = self.block_start_line.get(&target) {
                let indent = self.lines.get(at).map_or(1, |l| l.indent);
                inserts.push((
                    at,
                    Line {
                        indent,
                        text: format!("{}:", self.block_label(target)),
                    },
                ));
            }
        }
        inserts.sort_by(|a, b| b.0.cmp(&a.0));
        for (at, line) in inserts {
            self.lines.insert(at, line);
        }
        self.lines
    }

    fn emit_seq(&mut self, mut cur: Option<usize>, stops: &[usize], indent: usize) {
        while let Some(b) = cur {
            if stops.contains(&b) {
                return;
            }
            if self.visited[b] {
                self.emit_goto(b, indent, "block rendered above");
                return;
            }
            if self.loops.contains_key(&b) && !self.active.contains(&b) {
                cur = self.emit_loop(b, stops, indent);
                continue;
            }

            self.visited[b] = true;
            self.block_start_line.insert(b, self.lines.len());
            self.emit_block_statements(b, indent);

            let block = self.blocks[b];
            match block.terminator_kind {
                TerminatorKind::Return => {
                    let terminator = self.terminator_instr(b);
                    let evidence = self.evidence(terminator);
                    self.push(indent, self.stmt("return".to_string()), Some(evidence));
                    return;
                }
                TerminatorKind::CallWithFallthrough => {
                    self.emit_call(b, indent);
                    cur = self.fallthrough_of(b);
                    if cur.is_none() {
                        return;
                    }
                }
                TerminatorKind::Conditional => {
                    cur = self.emit_conditional(b, stops, indent);
                    if cur.is_none() {
                        return;
                    }
                }
                TerminatorKind::Unconditional => {
                    let terminator = self.terminator_instr(b);
                    match terminator.target {
                        Some(t) => match self.index.get(&t).copied() {
                            Some(next) => {
                                cur = Some(next);
                            }
                            None => {
                                let label = self
                                    .labels
                                    .get(t)
                                    .map_or_else(|| format!("0x{t:08X}"), str::to_string);
                                let evidence = self.evidence(terminator);
                                self.push(
                                    indent,
                                    self.stmt(format!("goto {label}")),
                                    Some(evidence),
                                );
                                return;
                            }
                        },
                        None => {
                            let evidence = self.evidence(terminator);
                            self.push(
                                indent,
                                self.stmt(format!("goto {UNRESOLVED_TARGET}")),
                                Some(evidence),
                            );
                            return;
                        }
                    }
                }
                TerminatorKind::Indirect => {
                    let terminator = self.terminator_instr(b);
                    let evidence = self.evidence(terminator);
                    self.push(
                        indent,
                        self.stmt(format!("goto {UNRESOLVED_TARGET}")),
                        Some(evidence),
                    );
                    return;
                }
                TerminatorKind::Fallthrough => {
                    cur = self.fallthrough_of(b);
                    if cur.is_none() {
                        return;
                    }
                }
            }
        }
    }

    /// Emit an `if`/`else` region; returns the continuation block.
    fn emit_conditional(&mut self, b: usize, stops: &[usize], indent: usize) -> Option<usize> {
        let terminator = self.terminator_instr(b);
        let evidence = self.evidence(terminator);
        let cond = branch_condition(terminator);
        let (taken, not_taken) = self.conditional_arms(b);
        let follow = self.ipostdom[b];

        let mut inner_stops: Vec<usize> = stops.to_vec();
        if let Some(f) = follow {
            inner_stops.push(f);
        }

        // A taken arm that is already the join point inverts the condition.
        if let (Arm::InProc(t), Some(f)) = (taken, follow) {
            if t == f {
                match not_taken {
                    Arm::InProc(n) if n != f => {
                        self.push_if(indent, &cond, true, &evidence);
                        self.emit_seq(Some(n), &inner_stops, indent + 1);
                        self.close_if(indent);
                        return follow;
                    }
                    _ => return follow,
                }
            }
        }

        self.push_if(indent, &cond, false, &evidence);
        match taken {
            Arm::InProc(t) => self.emit_seq(Some(t), &inner_stops, indent + 1),
            Arm::OutOfProc(addr) => {
                let label = self
                    .labels
                    .get(addr)
                    .map_or_else(|| format!("0x{addr:08X}"), str::to_string);
                let text = self.stmt(format!("goto {label}"));
                self.push(indent + 1, text, None);
            }
            Arm::Unresolved => {
                let text = self.stmt(format!("goto {UNRESOLVED_TARGET}"));
                self.push(indent + 1, text, None);
            }
        }

        match not_taken {
            Arm::InProc(n) if Some(n) != follow => {
                self.push_else(indent);
                self.emit_seq(Some(n), &inner_stops, indent + 1);
                self.close_if(indent);
            }
            _ => self.close_if(indent),
        }

        follow
    }

    /// Emit a recovered loop; returns the continuation block.
    fn emit_loop(&mut self, h: usize, stops: &[usize], indent: usize) -> Option<usize> {
        let shape = self.loops[&h];
        self.active.insert(h);

        let follow = match shape {
            LoopShape::While {
                negate,
                body_start,
                follow,
            } => {
                let terminator = self.terminator_instr(h);
                let evidence = self.evidence(terminator);
                let cond = branch_condition(terminator);

                self.visited[h] = true;
                self.block_start_line.insert(h, self.lines.len());
                self.push_while(indent, &cond, negate, &evidence);
                self.emit_block_statements_at(h, indent + 1);

                let mut inner_stops: Vec<usize> = stops.to_vec();
                inner_stops.push(h);
                if let Some(f) = follow {
                    inner_stops.push(f);
                }
                self.emit_seq(body_start, &inner_stops, indent + 1);
                self.close_if(indent);
                follow
            }
            LoopShape::DoWhileSelf { negate, follow } => {
                let terminator = self.terminator_instr(h);
                let evidence = self.evidence(terminator);
                let cond = branch_condition(terminator);

                self.visited[h] = true;
                self.block_start_line.insert(h, self.lines.len());
                self.push_do(indent);
                self.emit_block_statements_at(h, indent + 1);
                self.push_do_while(indent, &cond, negate, &evidence);
                follow
            }
            LoopShape::DoWhileTail {
                latch,
                negate,
                follow,
            } => {
                let terminator = self.terminator_instr(latch);
                let evidence = self.evidence(terminator);
                let cond = branch_condition(terminator);

                self.push_do(indent);
                let mut inner_stops: Vec<usize> = stops.to_vec();
                inner_stops.push(latch);
                self.emit_seq(Some(h), &inner_stops, indent + 1);
                self.visited[latch] = true;
                self.block_start_line.insert(latch, self.lines.len());
                self.emit_block_statements_at(latch, indent + 1);
                self.push_do_while(indent, &cond, negate, &evidence);
                follow
            }
        };

        self.active.remove(&h);
        follow
    }

    /// Linear fallback: label, statements, explicit control transfer.
    fn emit_linear_block(&mut self, b: usize, indent: usize) {
        self.visited[b] = true;
        self.labeled.insert(b);
        self.lines.push(Line {
            indent,
            text: format!("{}:", self.block_label(b)),
        });
        self.block_start_line.insert(b, self.lines.len());
        self.emit_block_statements(b, indent);

        let block = self.blocks[b];
        let terminator = self.terminator_instr(b);
        let evidence = self.evidence(terminator);
        match block.terminator_kind {
            TerminatorKind::Return => {
                self.push(indent, self.stmt("return".to_string()), Some(evidence));
            }
            TerminatorKind::CallWithFallthrough => {
                self.emit_call(b, indent);
                if let Some(next) = self.fallthrough_of(b) {
                    self.emit_goto(next, indent, "continues after call");
                }
            }
            TerminatorKind::Conditional => {
                let cond = branch_condition(terminator);
                let (taken, not_taken) = self.conditional_arms(b);
                let target = self.arm_label(taken);
                let text = self.stmt(format!("if ({cond}) goto {target}"));
                self.push(indent, text, Some(evidence));
                if let Arm::InProc(n) = not_taken {
                    self.emit_goto(n, indent, "fall through");
                }
            }
            TerminatorKind::Unconditional | TerminatorKind::Indirect => {
                let target = match terminator.target {
                    Some(t) => match self.index.get(&t).copied() {
                        Some(i) => {
                            self.goto_targets.insert(i);
                            self.block_label(i)
                        }
                        None => self
                            .labels
                            .get(t)
                            .map_or_else(|| format!("0x{t:08X}"), str::to_string),
                    },
                    None => UNRESOLVED_TARGET.to_string(),
                };
                self.push(indent, self.stmt(format!("goto {target}")), Some(evidence));
            }
            TerminatorKind::Fallthrough => {
                if let Some(next) = self.fallthrough_of(b) {
                    self.emit_goto(next, indent, "fall through");
                }
            }
        }
    }

    // ---- small pieces ---------------------------------------------------

    fn emit_block_statements(&mut self, b: usize, indent: usize) {
        self.emit_block_statements_at(b, indent);
    }

    fn emit_block_statements_at(&mut self, b: usize, indent: usize) {
        let block = self.blocks[b];
        let structural_tail = !matches!(block.terminator_kind, TerminatorKind::Fallthrough);
        let range = block.instructions.clone();
        let end = if structural_tail && !range.is_empty() {
            range.end - 1
        } else {
            range.end
        };
        for idx in range.start..end {
            let instruction = &self.result.instructions[idx];
            let text = self.stmt(statement_text(instruction));
            let evidence = self.evidence(instruction);
            self.push(indent, text, Some(evidence));
        }
    }

    fn emit_call(&mut self, b: usize, indent: usize) {
        let terminator = self.terminator_instr(b);
        let evidence = self.evidence(terminator);
        let callee = match terminator.target {
            Some(t) => self
                .labels
                .get(t)
                .map_or_else(|| format!("0x{t:08X}"), str::to_string),
            None => UNRESOLVED_TARGET.to_string(),
        };
        self.push(indent, self.stmt(format!("call {callee}()")), Some(evidence));
    }

    fn emit_goto(&mut self, b: usize, indent: usize, reason: &str) {
        self.goto_targets.insert(b);
        let text = format!("{}  // {}", self.stmt(format!("goto {}", self.block_label(b))), reason);
        self.push(indent, text, None);
    }

    fn fallthrough_of(&self, b: usize) -> Option<usize> {
        self.blocks[b]
            .edges
            .iter()
            .filter(|e| matches!(e.kind, EdgeKind::Fallthrough))
            .find_map(|e| e.target.and_then(|t| self.index.get(&t).copied()))
    }

    fn terminator_instr(&self, b: usize) -> &'a Instruction {
        let block = self.blocks[b];
        &self.result.instructions[block.instructions.end - 1]
    }

    fn block_label(&self, b: usize) -> String {
        format!("L_{:08X}", self.blocks[b].leader)
    }

    fn arm_label(&mut self, arm: Arm) -> String {
        match arm {
            Arm::InProc(i) => {
                self.goto_targets.insert(i);
                self.block_label(i)
            }
            Arm::OutOfProc(addr) => self
                .labels
                .get(addr)
                .map_or_else(|| format!("0x{addr:08X}"), str::to_string),
            Arm::Unresolved => UNRESOLVED_TARGET.to_string(),
        }
    }

    fn evidence(&self, instruction: &Instruction) -> String {
        format!("// @0x{:08X}: {}", instruction.address, instruction.hex_bytes())
    }

    fn stmt(&self, text: String) -> String {
        match self.config.pseudocode_style {
            PseudocodeStyle::CLike => format!("{text};"),
            PseudocodeStyle::PythonLike => text,
        }
    }

    fn push(&mut self, indent: usize, text: String, evidence: Option<String>) {
        let text = match evidence {
            Some(evidence) => format!("{text}  {evidence}"),
            None => text,
        };
        self.lines.push(Line { indent, text });
    }

    fn push_comment(&mut self, indent: usize, text: String) {
        self.lines.push(Line {
            indent,
            text: format!("// {text}"),
        });
    }

    fn push_if(&mut self, indent: usize, cond: &str, negate: bool, evidence: &str) {
        let cond = apply_negation(cond, negate, self.config.pseudocode_style);
        let text = match self.config.pseudocode_style {
            PseudocodeStyle::CLike => format!("if ({cond}) {{  {evidence}"),
            PseudocodeStyle::PythonLike => format!("if {cond}:  {evidence}"),
        };
        self.lines.push(Line { indent, text });
    }

    fn push_else(&mut self, indent: usize) {
        let text = match self.config.pseudocode_style {
            PseudocodeStyle::CLike => "} else {".to_string(),
            PseudocodeStyle::PythonLike => "else:".to_string(),
        };
        self.lines.push(Line { indent, text });
    }

    fn close_if(&mut self, indent: usize) {
        if self.config.pseudocode_style == PseudocodeStyle::CLike {
            self.lines.push(Line {
                indent,
                text: "}".to_string(),
            });
        }
    }

    fn push_while(&mut self, indent: usize, cond: &str, negate: bool, evidence: &str) {
        let cond = apply_negation(cond, negate, self.config.pseudocode_style);
        let text = match self.config.pseudocode_style {
            PseudocodeStyle::CLike => format!("while ({cond}) {{  {evidence}"),
            PseudocodeStyle::PythonLike => format!("while {cond}:  {evidence}"),
        };
        self.lines.push(Line { indent, text });
    }

    fn push_do(&mut self, indent: usize) {
        let text = match self.config.pseudocode_style {
            PseudocodeStyle::CLike => "do {".to_string(),
            PseudocodeStyle::PythonLike => "while True:".to_string(),
        };
        self.lines.push(Line { indent, text });
    }

    fn push_do_while(&mut self, indent: usize, cond: &str, negate: bool, evidence: &str) {
        match self.config.pseudocode_style {
            PseudocodeStyle::CLike => {
                let cond = apply_negation(cond, negate, PseudocodeStyle::CLike);
                self.lines.push(Line {
                    indent,
                    text: format!("}} while ({cond});  {evidence}"),
                });
            }
            PseudocodeStyle::PythonLike => {
                // Python has no do/while; exit when the loop condition fails.
                let cond = apply_negation(cond, !negate, PseudocodeStyle::PythonLike);
                self.lines.push(Line {
                    indent: indent + 1,
                    text: format!("if {cond}:  {evidence}"),
                });
                self.lines.push(Line {
                    indent: indent + 2,
                    text: "break".to_string(),
                });
            }
        }
    }
}

fn apply_negation(cond: &str, negate: bool, style: PseudocodeStyle) -> String {
    if !negate {
        return cond.to_string();
    }
    match style {
        PseudocodeStyle::CLike => format!("!{cond}"),
        PseudocodeStyle::PythonLike => format!("not {cond}"),
    }
}

/// Human-readable branch condition of a terminator instruction.
fn branch_condition(instruction: &Instruction) -> String {
    match instruction.mnemonic {
        "BC" | "BCR" | "BRC" | "BRCL" => match instruction.operands.first() {
            Some(Operand::Register(mask)) => {
                ConditionMask::from_bits_truncate(*mask).condition_name()
            }
            _ => "condition".to_string(),
        },
        "BCT" | "BCTR" | "BRCT" | "BRCTG" => "count_nonzero".to_string(),
        "BXH" => "index_high".to_string(),
        "BXLE" => "index_low_or_equal".to_string(),
        _ => "condition".to_string(),
    }
}

/// Pseudocode text for one non-control instruction.
fn statement_text(instruction: &Instruction) -> String {
    let ops = &instruction.operands;
    let op = |i: usize| ops.get(i).map_or_else(String::new, operand_text);

    match instruction.mnemonic {
        "LR" | "LTR" | "LGR" | "LTGR" => format!("{} = {}", op(0), op(1)),
        "L" | "LH" | "LG" | "LGF" | "LLGF" | "LTG" => format!("{} = load({})", op(0), op(1)),
        "LA" | "LARL" => format!("{} = addr({})", op(0), op(1)),
        "LHI" | "LGHI" | "LGFI" => format!("{} = {}", op(0), op(1)),
        "ST" | "STH" | "STC" | "STG" => format!("store({}, {})", op(0), op(1)),
        "STM" | "STMG" => format!("save_registers({}..{}, {})", op(0), op(1), op(2)),
        "LM" | "LMG" => format!("restore_registers({}..{}, {})", op(0), op(1), op(2)),
        "AR" | "A" | "AH" | "AL" | "ALR" | "AGR" | "AHI" | "AGHI" => {
            format!("{} = {} + {}", op(0), op(0), op(1))
        }
        "SR" | "S" | "SH" | "SL" | "SLR" | "SGR" => format!("{} = {} - {}", op(0), op(0), op(1)),
        "MR" | "M" | "MH" | "MHI" => format!("{} = {} * {}", op(0), op(0), op(1)),
        "DR" | "D" => format!("{} = {} / {}", op(0), op(0), op(1)),
        "NR" | "N" | "NGR" => format!("{} = {} & {}", op(0), op(0), op(1)),
        "OR" | "O" | "OGR" => format!("{} = {} | {}", op(0), op(0), op(1)),
        "XR" | "X" | "XGR" => format!("{} = {} ^ {}", op(0), op(0), op(1)),
        "SLL" | "SLLG" | "SLA" => format!("{} = {} << {}", op(0), op(0), op(2)),
        "SRL" | "SRLG" | "SRA" => format!("{} = {} >> {}", op(0), op(0), op(2)),
        "C" | "CR" | "CH" | "CL" | "CLR" | "CLI" | "CLC" | "CHI" | "CGR" | "CLGR" => {
            format!("compare({}, {})", op(0), op(1))
        }
        "TM" | "TMLL" | "TMLH" | "TMHL" | "TMHH" => format!("test({}, {})", op(0), op(1)),
        "MVC" => format!("copy({}, {})", op(0), op(1)),
        "MVI" => format!("store_byte({}, {})", op(1), op(0)),
        _ => {
            let operands = instruction.operand_string();
            if operands.is_empty() {
                format!("asm(\"{}\")", instruction.mnemonic)
            } else {
                format!("asm(\"{} {}\")", instruction.mnemonic, operands)
            }
        }
    }
}

/// Operand rendering in pseudocode: registers as `rN`, storage as-is.
fn operand_text(operand: &Operand) -> String {
    match operand {
        Operand::Register(r) => format!("r{r}"),
        Operand::BaseDisp { base, disp } => format!("{disp}(r{base})"),
        Operand::BaseIndexDisp { base, index, disp } => format!("{disp}(r{index},r{base})"),
        other => other.to_string(),
    }
}

// ---- graph helpers ------------------------------------------------------

fn reverse_postorder(count: usize, entry: usize, succs: &[Vec<usize>]) -> Vec<usize> {
    let mut visited = vec![false; count];
    let mut order = Vec::with_capacity(count);
    let mut stack: Vec<(usize, usize)> = vec![(entry, 0)];
    visited[entry] = true;

    while let Some(&(node, child)) = stack.last() {
        if child < succs[node].len() {
            stack.last_mut().expect("stack is non-empty").1 += 1;
            let next = succs[node][child];
            if !visited[next] {
                visited[next] = true;
                stack.push((next, 0));
            }
        } else {
            order.push(node);
            stack.pop();
        }
    }

    order.reverse();
    order
}

/// Iterative dominator computation (Cooper-Harvey-Kennedy).
fn immediate_dominators(
    count: usize,
    entry: usize,
    preds: &[Vec<usize>],
    rpo: &[usize],
) -> Vec<Option<usize>> {
    let mut rpo_number = vec![usize::MAX; count];
    for (number, &block) in rpo.iter().enumerate() {
        rpo_number[block] = number;
    }

    let mut idom: Vec<Option<usize>> = vec![None; count];
    idom[entry] = Some(entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter().filter(|&&b| b != entry) {
            let mut new_idom: Option<usize> = None;
            for &p in &preds[b] {
                if idom[p].is_none() || rpo_number[p] == usize::MAX {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(current) => intersect(p, current, &idom, &rpo_number),
                });
            }
            if let Some(candidate) = new_idom {
                if idom[b] != Some(candidate) {
                    idom[b] = Some(candidate);
                    changed = true;
                }
            }
        }
    }
    idom
}

fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_number: &[usize]) -> usize {
    while a != b {
        while rpo_number[a] > rpo_number[b] {
            a = idom[a].expect("dominator chain reaches entry");
        }
        while rpo_number[b] > rpo_number[a] {
            b = idom[b].expect("dominator chain reaches entry");
        }
    }
    a
}

fn dominates(a: usize, mut b: usize, idom: &[Option<usize>]) -> bool {
    loop {
        if a == b {
            return true;
        }
        match idom[b] {
            Some(parent) if parent != b => b = parent,
            _ => return false,
        }
    }
}

/// Immediate post-dominators via the dominators of the reversed graph with a
/// virtual exit; `None` means only the virtual exit post-dominates the block.
fn postdominators(
    count: usize,
    succs: &[Vec<usize>],
    preds: &[Vec<usize>],
    exits: &[usize],
) -> Vec<Option<usize>> {
    let virt = count;
    let total = count + 1;

    let mut rsuccs: Vec<Vec<usize>> = vec![Vec::new(); total];
    let mut rpreds: Vec<Vec<usize>> = vec![Vec::new(); total];
    for b in 0..count {
        rsuccs[b] = preds[b].clone();
        rpreds[b] = succs[b].clone();
    }
    rsuccs[virt] = exits.to_vec();
    for &e in exits {
        rpreds[e].push(virt);
    }

    let rpo = reverse_postorder(total, virt, &rsuccs);
    let idom = immediate_dominators(total, virt, &rpreds, &rpo);

    (0..count)
        .map(|b| match idom[b] {
            Some(parent) if parent != virt => Some(parent),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze;

    fn pseudo(bytes: &[u8], style: PseudocodeStyle) -> String {
        let config = AnalysisConfig {
            pseudocode_style: style,
            ..AnalysisConfig::default()
        };
        analyze(bytes, "TEST", &[], &config).render_pseudocode(&config)
    }

    #[test]
    fn simple_return_procedure() {
        let text = pseudo(&[0x07, 0xFE], PseudocodeStyle::CLike);
        assert!(text.contains("PROC_00000000() {"));
        assert!(text.contains("return;  // @0x00000000: 07FE"));
        assert!(text.contains("confidence=LOW"));
        assert!(text.contains("linkage=unknown"));
        assert!(text.ends_with('\n'));
        assert!(!text.contains('\t'));
    }

    #[test]
    fn python_style_signature() {
        let text = pseudo(&[0x07, 0xFE], PseudocodeStyle::PythonLike);
        assert!(text.contains("def PROC_00000000():"));
        assert!(text.contains("return  // @0x00000000: 07FE"));
        assert!(!text.contains("return;"));
    }

    #[test]
    fn if_else_reconverges() {
        // 0x00: LTR 2,2
        // 0x02: BC 8,0x0E(0)    equal -> 0x0E
        // 0x06: LA 2,1
        // 0x0A: BC 15,0x12(0)   -> join
        // 0x0E: LA 2,2
        // 0x12: BCR 15,14
        let bytes = [
            0x12, 0x22, 0x47, 0x80, 0x00, 0x0E, 0x41, 0x20, 0x00, 0x01, 0x47, 0xF0, 0x00, 0x12,
            0x41, 0x20, 0x00, 0x02, 0x07, 0xFE,
        ];
        let text = pseudo(&bytes, PseudocodeStyle::CLike);
        assert!(text.contains("if (equal) {"), "got:\n{text}");
        assert!(text.contains("} else {"), "got:\n{text}");
        assert!(text.contains("r2 = addr(1(r0));"));
        assert!(text.contains("r2 = addr(2(r0));"));
        assert!(text.contains("return;"));
    }

    #[test]
    fn self_loop_becomes_do_while() {
        // 0x00: LHI 3,4
        // 0x04: BRCT 3,*-0  -> taken target is the BRCT itself
        // 0x08: BCR 15,14
        let bytes = [0xA7, 0x38, 0x00, 0x04, 0xA7, 0x36, 0x00, 0x00, 0x07, 0xFE];
        let text = pseudo(&bytes, PseudocodeStyle::CLike);
        assert!(text.contains("do {"), "got:\n{text}");
        assert!(text.contains("} while (count_nonzero);"), "got:\n{text}");
    }

    #[test]
    fn unresolved_branch_marked() {
        // BC 8,32(12) base-relative; fall through to return
        let bytes = [0x47, 0x80, 0xC0, 0x20, 0x07, 0xFE];
        let text = pseudo(&bytes, PseudocodeStyle::CLike);
        assert!(text.contains(UNRESOLVED_TARGET), "got:\n{text}");
    }

    #[test]
    fn call_statement_with_label() {
        // BRAS 14,*+6 / BCR 15,14 / LA 2,1 / BCR 15,14
        let bytes = [
            0xA7, 0xE5, 0x00, 0x03, 0x07, 0xFE, 0x41, 0x20, 0x00, 0x01, 0x07, 0xFE,
        ];
        let text = pseudo(&bytes, PseudocodeStyle::CLike);
        assert!(text.contains("call PROC_00000006();"), "got:\n{text}");
        assert!(text.contains("// PROC_00000006"), "got:\n{text}");
    }

    #[test]
    fn empty_input_renders_empty() {
        assert_eq!(pseudo(&[], PseudocodeStyle::CLike), "");
    }

    #[test]
    fn deterministic_output() {
        let bytes = [
            0x12, 0x22, 0x47, 0x80, 0x00, 0x0E, 0x41, 0x20, 0x00, 0x01, 0x47, 0xF0, 0x00, 0x12,
            0x41, 0x20, 0x00, 0x02, 0x07, 0xFE,
        ];
        let a = pseudo(&bytes, PseudocodeStyle::CLike);
        let b = pseudo(&bytes, PseudocodeStyle::CLike);
        assert_eq!(a, b);
    }
}
