//! The HLASM-style assembler listing renderer.
//!
//! Each instruction line follows the contract
//! `<hex-address> <hex-bytes> <label-or-blank> <mnemonic> <operands>   * <comment>`:
//! the address and raw bytes are the evidence chain, labels are synthetic
//! (`PROC_<hex>`, `LOC_<hex>`, `DATA_<hex>`), resolved branch operands print their
//! target label, and unresolved targets print the literal `UNRESOLVED_TARGET` with
//! the original operand encoding preserved in the comment. Output lines appear in
//! ascending address order across the whole artifact.

use std::fmt::Write;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        classifier::{Region, RegionKind},
        procedures::Procedure,
    },
    assembly::{FlowType, Instruction},
    render::{data_label, hex_bytes, EvidenceLink, Labels, UNRESOLVED_TARGET},
    AnalysisConfig, AnalysisResult,
};

const BANNER: &str = "********************************************************************************";

/// Render the complete assembler listing.
///
/// An artifact with no sections produces an empty listing.
#[must_use]
pub fn render_assembly(result: &AnalysisResult, config: &AnalysisConfig) -> String {
    if result.artifact.sections.is_empty() {
        return String::new();
    }

    let labels = Labels::build(result);
    let mut lines: Vec<String> = Vec::new();

    render_header(result, &mut lines);

    for region in &result.regions {
        match region.kind {
            RegionKind::Code => {
                let Some(cfg) = result
                    .cfgs
                    .iter()
                    .find(|c| c.region_start == region.start)
                else {
                    continue;
                };
                render_code_region(result, cfg, &labels, config, &mut lines);
            }
            RegionKind::Data => {
                lines.push(String::new());
                lines.push(format!(
                    "* Data Region: 0x{:08X}-0x{:08X} ({} bytes) [{}]",
                    region.start,
                    region.end,
                    region.len(),
                    region.rationale
                ));
                render_dump(result, region, Some(data_label(region.start)), config, &mut lines);
            }
            RegionKind::Unknown => {
                lines.push(String::new());
                lines.push(format!(
                    "* Unknown/Undecodable Region: 0x{:08X}-0x{:08X} ({} bytes)",
                    region.start,
                    region.end,
                    region.len()
                ));
                render_dump(result, region, None, config, &mut lines);
            }
        }
    }

    render_statistics(result, &mut lines);

    let mut out = String::new();
    for line in &lines {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn render_header(result: &AnalysisResult, lines: &mut Vec<String>) {
    let artifact = &result.artifact;
    lines.push(BANNER.to_string());
    lines.push("* Reconstructed Assembly Listing".to_string());
    lines.push(format!("* Module: {}", artifact.name));
    lines.push(format!("* Format: {}", artifact.format));
    lines.push(format!("* SHA1: {}", artifact.digest));
    lines.push("* Note: labels are synthetic; addresses and bytes are from the input".to_string());
    lines.push(BANNER.to_string());

    if artifact.entry_points.is_empty() {
        lines.push("* Entry Points: none declared".to_string());
    } else {
        let entries: Vec<String> = artifact
            .entry_points
            .iter()
            .map(|e| format!("0x{e:08X}"))
            .collect();
        lines.push(format!("* Entry Points: {}", entries.join(", ")));
    }
    if let (Some(amode), Some(rmode)) = (artifact.amode, artifact.rmode.as_deref()) {
        lines.push(format!("* AMODE: {amode}  RMODE: {rmode}"));
    }
    if let Some(member) = &artifact.pds_member {
        lines.push(format!("* PDS Member: {member}"));
    }
    if !artifact.external_symbols.is_empty() {
        lines.push(format!(
            "* External Symbols: {}",
            artifact.external_symbols.join(", ")
        ));
    }
}

fn render_code_region(
    result: &AnalysisResult,
    cfg: &ControlFlowGraph,
    labels: &Labels,
    config: &AnalysisConfig,
    lines: &mut Vec<String>,
) {
    // Blocks and in-region decode failures, merged in ascending address order.
    let mut spans = result
        .unknown_spans
        .iter()
        .filter(|s| s.start >= cfg.region_start && s.start < cfg.region_end)
        .peekable();

    for block in cfg.blocks.values() {
        if block.is_external_ref() {
            continue;
        }

        while let Some(span) = spans.peek() {
            if span.start > block.leader {
                break;
            }
            lines.push(format!(
                "* Undecodable bytes: 0x{:08X}-0x{:08X} ({})",
                span.start,
                span.end(),
                span.reason
            ));
            render_span_dump(span, config, lines);
            spans.next();
        }

        if let Some(procedure) = result.procedures.iter().find(|p| p.entry == block.leader) {
            render_procedure_banner(result, procedure, lines);
        }

        for instruction in &result.instructions[block.instructions.clone()] {
            lines.push(render_instruction(instruction, labels, config));
        }
    }

    for span in spans {
        lines.push(format!(
            "* Undecodable bytes: 0x{:08X}-0x{:08X} ({})",
            span.start,
            span.end(),
            span.reason
        ));
        render_span_dump(span, config, lines);
    }
}

/// Hex dump of one unknown span in 16-byte lines.
fn render_span_dump(span: &crate::assembly::UnknownSpan, config: &AnalysisConfig, lines: &mut Vec<String>) {
    for (index, chunk) in span.bytes.chunks(16).enumerate() {
        let address = span.start + (index * 16) as u64;
        let mut line = format!("{address:08X} ");
        if config.emit_hex {
            line.push_str(&format!("{:<32}", hex_bytes(chunk)));
        }
        lines.push(line);
    }
}

fn render_procedure_banner(result: &AnalysisResult, procedure: &Procedure, lines: &mut Vec<String>) {
    lines.push(String::new());
    lines.push(BANNER.to_string());
    lines.push(format!("* Procedure: {}", procedure.name));
    lines.push(format!(
        "* Entry: 0x{:08X}  Confidence: {}  Linkage: {}  Detection: {}",
        procedure.entry, procedure.confidence, procedure.linkage, procedure.reason
    ));

    let mut callees: Vec<String> = Vec::new();
    for edge in result.call_graph.edges.iter().filter(|e| e.caller == procedure.entry) {
        let name = match edge.target {
            crate::analysis::callgraph::CallTarget::Resolved(entry) => result
                .procedures
                .iter()
                .find(|p| p.entry == entry)
                .map_or_else(|| format!("0x{entry:08X}"), |p| p.name.clone()),
            crate::analysis::callgraph::CallTarget::Unresolved => UNRESOLVED_TARGET.to_string(),
        };
        if !callees.contains(&name) {
            callees.push(name);
        }
    }
    if !callees.is_empty() {
        lines.push(format!("* Calls: {}", callees.join(", ")));
    }
    lines.push(BANNER.to_string());
}

/// Render one instruction line per the listing contract.
fn render_instruction(instruction: &Instruction, labels: &Labels, config: &AnalysisConfig) -> String {
    let evidence = EvidenceLink::from_instruction(instruction);
    let label = labels.get(instruction.address).unwrap_or("");

    let mut comments: Vec<String> = Vec::new();
    let operand_text = render_operands(instruction, labels, &mut comments);

    let mut line = String::new();
    write!(line, "{:08X} ", evidence.start).expect("write to string");
    if config.emit_hex {
        write!(line, "{:<12} ", evidence.hex).expect("write to string");
    }
    write!(line, "{label:<8} {:<6} {operand_text}", instruction.mnemonic).expect("write to string");
    if !comments.is_empty() {
        write!(line, "   * {}", comments.join("; ")).expect("write to string");
    }
    line
}

/// Render the operand list, substituting labels for resolved targets and the
/// `UNRESOLVED_TARGET` literal for unresolvable ones.
fn render_operands(instruction: &Instruction, labels: &Labels, comments: &mut Vec<String>) -> String {
    let transfers = matches!(
        instruction.flow,
        FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Call | FlowType::Indirect
    );

    if !transfers || instruction.operands.is_empty() {
        return instruction.operand_string();
    }

    let mut parts: Vec<String> = instruction
        .operands
        .iter()
        .map(ToString::to_string)
        .collect();
    let target_slot = parts.len() - 1;

    match instruction.target {
        Some(target) => {
            if let Some(label) = labels.get(target) {
                comments.push(format!("-> 0x{target:08X}"));
                parts[target_slot] = label.to_string();
            }
        }
        None => {
            let original = instruction.operands[target_slot].to_string();
            parts[target_slot] = UNRESOLVED_TARGET.to_string();
            if instruction.indirect {
                comments.push(format!("target in R{original}"));
            } else {
                comments.push(format!("was {original}"));
            }
        }
    }

    parts.join(",")
}

/// Hex dump of a non-code region in 16-byte lines, each carrying its address.
fn render_dump(
    result: &AnalysisResult,
    region: &Region,
    label: Option<String>,
    config: &AnalysisConfig,
    lines: &mut Vec<String>,
) {
    let Some(section) = result.artifact.section_at(region.start) else {
        return;
    };

    let mut address = region.start;
    let mut first = true;
    while address < region.end {
        let chunk_end = (address + 16).min(region.end);
        let lo = (address - section.base) as usize;
        let hi = (chunk_end - section.base) as usize;
        let hex = hex_bytes(&section.bytes[lo..hi]);

        let mut line = format!("{address:08X} ");
        if config.emit_hex {
            line.push_str(&format!("{hex:<32} "));
        }
        if first {
            if let Some(label) = &label {
                line.push_str(label);
            }
            first = false;
        }
        lines.push(line);
        address = chunk_end;
    }
}

fn render_statistics(result: &AnalysisResult, lines: &mut Vec<String>) {
    let stats = &result.statistics;
    lines.push(String::new());
    lines.push(BANNER.to_string());
    lines.push("* Statistics".to_string());
    lines.push(format!(
        "* Instructions decoded: {}",
        stats.decoded_instruction_count
    ));
    lines.push(format!("* Bytes decoded: {}", stats.decoded_byte_count));
    lines.push(format!("* Unknown bytes: {}", stats.unknown_byte_count));
    lines.push(format!("* Decode rate: {:.1}%", stats.decode_rate * 100.0));
    lines.push(format!(
        "* Branches: {}  Calls: {}  Returns: {}",
        stats.branch_count, stats.call_count, stats.return_count
    ));

    if !stats.mnemonic_histogram.is_empty() {
        lines.push("* Top mnemonics:".to_string());
        let mut entries: Vec<(&str, usize)> = stats
            .mnemonic_histogram
            .iter()
            .map(|(m, c)| (*m, *c))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        for (mnemonic, count) in entries.into_iter().take(10) {
            lines.push(format!("*   {mnemonic:<6} : {count}"));
        }
    }
    lines.push(format!("* Status: {}", result.status));
    lines.push(BANNER.to_string());
}
