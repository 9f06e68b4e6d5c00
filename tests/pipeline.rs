//! End-to-end pipeline tests: scenarios over complete artifacts plus the
//! universal invariants (byte accounting, region tiling, block integrity,
//! determinism, unresolved marking).

use std::io::Write;

use zoscope::prelude::*;

/// A register-increment routine: base establishment, save, load/add/store, restore, return.
fn simple_program() -> Vec<u8> {
    let mut program = Vec::new();
    program.extend_from_slice(&[0x05, 0xCF]); // BALR 12,15
    program.extend_from_slice(&[0x90, 0xEC, 0xD0, 0x0C]); // STM 14,12,12(13)
    program.extend_from_slice(&[0x41, 0x30, 0xC1, 0x00]); // LA 3,256(12)
    program.extend_from_slice(&[0x58, 0x40, 0x30, 0x00]); // L 4,0(3)
    program.extend_from_slice(&[0x5A, 0x40, 0xC2, 0x00]); // A 4,512(12)
    program.extend_from_slice(&[0x50, 0x40, 0x30, 0x00]); // ST 4,0(3)
    program.extend_from_slice(&[0x98, 0xEC, 0xD0, 0x0C]); // LM 14,12,12(13)
    program.extend_from_slice(&[0x07, 0xFE]); // BCR 15,14
    program
}

/// Compare, branch on equal, two arms, common exit.
fn branching_program() -> Vec<u8> {
    let mut program = Vec::new();
    program.extend_from_slice(&[0x05, 0xCF]); // BALR 12,15
    program.extend_from_slice(&[0x90, 0xEC, 0xD0, 0x0C]); // STM 14,12,12(13)
    program.extend_from_slice(&[0x58, 0x20, 0xC1, 0x00]); // L 2,256(12)
    program.extend_from_slice(&[0x59, 0x20, 0xC1, 0x04]); // C 2,260(12)
    program.extend_from_slice(&[0x47, 0x80, 0xC0, 0x20]); // BC 8,32(12)
    program.extend_from_slice(&[0x41, 0x20, 0x00, 0x01]); // LA 2,1
    program.extend_from_slice(&[0x47, 0xF0, 0xC0, 0x28]); // BC 15,40(12)
    program.extend_from_slice(&[0x41, 0x20, 0x00, 0x02]); // LA 2,2
    program.extend_from_slice(&[0x50, 0x20, 0xC1, 0x08]); // ST 2,264(12)
    program.extend_from_slice(&[0x98, 0xEC, 0xD0, 0x0C]); // LM 14,12,12(13)
    program.extend_from_slice(&[0x07, 0xFE]); // BCR 15,14
    program
}

fn assert_byte_accounting(result: &AnalysisResult) {
    let decoded: usize = result.instructions.iter().map(Instruction::size).sum();
    let unknown: usize = result.unknown_spans.iter().map(UnknownSpan::len).sum();
    assert_eq!(
        decoded + unknown,
        result.artifact.byte_count(),
        "every input byte must be an instruction or an unknown span"
    );
}

fn assert_region_tiling(result: &AnalysisResult) {
    for section in &result.artifact.sections {
        let regions: Vec<&Region> = result
            .regions
            .iter()
            .filter(|r| r.start >= section.base && r.end <= section.end())
            .collect();
        assert!(!regions.is_empty());
        assert_eq!(regions.first().unwrap().start, section.base);
        assert_eq!(regions.last().unwrap().end, section.end());
        for pair in regions.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "regions must tile without gaps");
        }
    }
}

fn assert_block_integrity(result: &AnalysisResult) {
    for cfg in &result.cfgs {
        for block in cfg.blocks.values() {
            if block.is_external_ref() {
                continue;
            }
            let instrs = &result.instructions[block.instructions.clone()];
            for inner in &instrs[..instrs.len() - 1] {
                assert!(
                    !inner.is_terminal(),
                    "only the last instruction of a block may transfer control"
                );
            }
            for pair in instrs.windows(2) {
                assert_eq!(pair[0].end_address(), pair[1].address);
            }
        }
    }
}

// --- degenerate and minimal artifacts -------------------------------------

#[test]
fn empty_input() {
    let config = AnalysisConfig::default();
    let result = analyze(&[], "EMPTY", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Failure);
    assert!(result.instructions.is_empty());
    assert!(result.regions.is_empty());
    assert!(result.procedures.is_empty());
    assert_eq!(result.render_assembly(&config), "");
    assert_eq!(result.render_pseudocode(&config), "");
}

#[test]
fn two_byte_return() {
    let config = AnalysisConfig::default();
    let result = analyze(&[0x07, 0xFE], "RET", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.statistics.decoded_instruction_count, 1);
    assert!((result.statistics.decode_rate - 1.0).abs() < f64::EPSILON);

    let instr = &result.instructions[0];
    assert_eq!(instr.address, 0);
    assert_eq!(instr.mnemonic, "BCR");
    assert_eq!(instr.flow, FlowType::Return);

    assert_eq!(result.regions.len(), 1);
    assert_eq!(result.regions[0].kind, RegionKind::Code);

    assert_eq!(result.cfgs.len(), 1);
    assert_eq!(result.cfgs[0].blocks.len(), 1);

    assert_eq!(result.procedures.len(), 1);
    assert_eq!(result.procedures[0].name, "PROC_00000000");
    assert_eq!(result.procedures[0].linkage, Linkage::Unknown);

    let listing = result.render_assembly(&config);
    assert!(listing.contains("07FE"));
    assert!(listing.contains("BCR"));

    assert_byte_accounting(&result);
    assert_region_tiling(&result);
}

#[test]
fn branch_and_link_plus_return() {
    let config = AnalysisConfig::default();
    let result = analyze(&[0x05, 0xEF, 0x07, 0xFE], "CALLRET", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.statistics.decoded_instruction_count, 2);

    let balr = &result.instructions[0];
    assert_eq!(balr.mnemonic, "BALR");
    assert_eq!(balr.flow, FlowType::Call);
    assert!(balr.indirect, "register target makes the call indirect");
    assert_eq!(balr.target, None);

    let bcr = &result.instructions[1];
    assert_eq!(bcr.address, 2);
    assert_eq!(bcr.flow, FlowType::Return);

    assert_eq!(result.procedures.len(), 1);
    assert_eq!(result.call_graph.edges.len(), 1);
    assert_eq!(result.call_graph.edges[0].target, CallTarget::Unresolved);

    assert_byte_accounting(&result);
    assert_block_integrity(&result);
}

#[test]
fn conditional_forward_branch_sample() {
    let config = AnalysisConfig::default();
    let program = branching_program();
    let result = analyze(&program, "BRANCHING", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.statistics.decoded_instruction_count, 11);
    assert!((result.statistics.decode_rate - 1.0).abs() < f64::EPSILON);

    assert_eq!(result.cfgs.len(), 1);
    let cfg = &result.cfgs[0];
    // Call, conditional, unconditional, and return terminators each end a block.
    assert_eq!(cfg.block_count(), 4);

    // The BC targets are base(12)-relative: both stay unresolved, and the
    // conditional's fall-through edge resolves to 0x12.
    let cond_block = cfg.blocks.get(&0x02).expect("prologue block");
    assert_eq!(cond_block.terminator, 0x0E);
    assert_eq!(cond_block.edges[0].kind, EdgeKind::BranchNotTaken);
    assert_eq!(cond_block.edges[0].target, Some(0x12));
    assert_eq!(cond_block.edges[1].kind, EdgeKind::Unresolved);

    // The tail after the unresolved unconditional branch is unreachable from the
    // entry and lands in the orphan container.
    assert_eq!(result.procedures.len(), 2);
    assert_eq!(result.procedures[1].reason, DetectionReason::Orphan);
    assert_eq!(result.procedures[1].entry, 0x1A);
    assert_eq!(cfg.unresolved_sites, vec![0x00, 0x0E, 0x16]);

    assert_byte_accounting(&result);
    assert_region_tiling(&result);
    assert_block_integrity(&result);
}

#[test]
fn mixed_code_and_zero_data() {
    let config = AnalysisConfig::default();
    let mut bytes = Vec::new();
    for _ in 0..16 {
        bytes.extend_from_slice(&[0x41, 0x30, 0xC1, 0x00]); // LA 3,256(12)
    }
    bytes.extend_from_slice(&[0x00; 64]);
    let result = analyze(&bytes, "MIXED", &[], &config);

    assert_eq!(result.regions.len(), 2);
    assert_eq!(result.regions[0].kind, RegionKind::Code);
    assert_eq!(result.regions[0].confidence, Confidence::High);
    assert_eq!(result.regions[1].kind, RegionKind::Data);
    assert_eq!(result.regions[1].confidence, Confidence::Medium);

    assert_byte_accounting(&result);
    assert_region_tiling(&result);
}

#[test]
fn unknown_single_byte_resync() {
    let config = AnalysisConfig::default();
    let result = analyze(&[0xFF, 0x07, 0xFE], "RESYNC", &[], &config);

    assert_eq!(result.unknown_spans.len(), 1);
    let span = &result.unknown_spans[0];
    assert_eq!(span.start, 0);
    assert_eq!(span.len(), 1);
    assert_eq!(span.reason, UnknownReason::DecodeFailed);

    assert_eq!(result.instructions.len(), 1);
    assert_eq!(result.instructions[0].address, 1);
    assert_eq!(result.instructions[0].mnemonic, "BCR");

    // 2 of 3 bytes decoded: squarely in the partial band.
    assert_eq!(result.status, AnalysisStatus::Partial);
    assert_byte_accounting(&result);
}

// --- sample programs ------------------------------------------------------

#[test]
fn simple_program_analysis() {
    let config = AnalysisConfig::default();
    let result = analyze(&simple_program(), "SIMPLE", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.statistics.decoded_instruction_count, 8);
    assert_eq!(result.statistics.return_count, 1);
    // BALR 12,15 is an indirect call; nothing else transfers control.
    assert_eq!(result.statistics.call_count, 1);

    assert_eq!(result.procedures.len(), 1);
    let listing = result.render_assembly(&config);
    assert!(listing.contains("STM"));
    assert!(listing.contains("90ECD00C"));

    assert_byte_accounting(&result);
    assert_block_integrity(&result);
}

#[test]
fn subroutine_call_graph() {
    // main: BRAS around a doubling subroutine, then return.
    let mut program = Vec::new();
    program.extend_from_slice(&[0x90, 0xEC, 0xD0, 0x0C]); // 0x00 STM 14,12,12(13)
    program.extend_from_slice(&[0x41, 0x10, 0xC1, 0x00]); // 0x04 LA 1,256(12)
    program.extend_from_slice(&[0xA7, 0xE5, 0x00, 0x06]); // 0x08 BRAS 14,*+12 -> 0x14
    program.extend_from_slice(&[0x98, 0xEC, 0xD0, 0x0C]); // 0x0C LM 14,12,12(13)
    program.extend_from_slice(&[0x07, 0xFE]); //             0x10 BCR 15,14
    program.extend_from_slice(&[0x18, 0x21]); //             0x12 LR 2,1 (dead gap filler)
    program.extend_from_slice(&[0x1A, 0x22]); //             0x14 AR 2,2 (subroutine)
    program.extend_from_slice(&[0x50, 0x20, 0x10, 0x00]); // 0x16 ST 2,0(1)
    program.extend_from_slice(&[0x07, 0xFE]); //             0x1A BCR 15,14

    let config = AnalysisConfig::default();
    let result = analyze(&program, "SUBCALL", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Success);
    let callee = result
        .procedures
        .iter()
        .find(|p| p.entry == 0x14)
        .expect("subroutine detected");
    assert_eq!(callee.reason, DetectionReason::CallTarget);
    assert_eq!(callee.confidence, Confidence::High);

    let main = &result.procedures[0];
    assert_eq!(main.entry, 0);
    assert_eq!(result.call_graph.callees(main.entry), vec![0x14]);
    assert_eq!(result.call_graph.callers(0x14), vec![main.entry]);

    assert_byte_accounting(&result);
    assert_block_integrity(&result);
}

#[test]
fn relative_loop_recovered() {
    // LHI 3,4 / AR 2,3 / BRCT 3,*-2 / BCR 15,14
    let program = vec![
        0xA7, 0x38, 0x00, 0x04, // 0x00 LHI 3,4
        0x1A, 0x23, //             0x04 AR 2,3
        0xA7, 0x36, 0xFF, 0xFF, // 0x06 BRCT 3,*-2 -> 0x04
        0x07, 0xFE, //             0x0A BCR 15,14
    ];
    let config = AnalysisConfig::default();
    let result = analyze(&program, "LOOP", &[], &config);

    assert_eq!(result.status, AnalysisStatus::Success);
    let cfg = &result.cfgs[0];

    let loop_block = cfg.blocks.get(&0x04).expect("loop body block");
    assert_eq!(loop_block.terminator_kind, TerminatorKind::Conditional);
    assert_eq!(loop_block.edges[0].kind, EdgeKind::BranchTaken);
    assert_eq!(loop_block.edges[0].target, Some(0x04), "back edge to itself");

    let pseudo = result.render_pseudocode(&config);
    assert!(pseudo.contains("do {"), "got:\n{pseudo}");
    assert!(pseudo.contains("} while (count_nonzero);"), "got:\n{pseudo}");
}

// --- universal invariants -------------------------------------------------

#[test]
fn determinism_across_runs() {
    let config = AnalysisConfig::default();
    for bytes in [simple_program(), branching_program(), vec![0xFF, 0x07, 0xFE]] {
        let a = analyze(&bytes, "MOD", &[], &config);
        let b = analyze(&bytes, "MOD", &[], &config);
        assert_eq!(a, b, "result trees must be identical across runs");
        assert_eq!(a.render_assembly(&config), b.render_assembly(&config));
        assert_eq!(a.render_pseudocode(&config), b.render_pseudocode(&config));
    }
}

#[test]
fn no_speculative_targets() {
    let config = AnalysisConfig::default();
    let result = analyze(&branching_program(), "BRANCHING", &[], &config);

    // Indirect and base-relative sites must render as the literal marker.
    let listing = result.render_assembly(&config);
    let unresolved_lines: Vec<&str> = listing
        .lines()
        .filter(|l| !l.starts_with('*') && l.contains("UNRESOLVED_TARGET"))
        .collect();
    assert_eq!(unresolved_lines.len(), 3, "BALR and both BCs:\n{listing}");
}

#[test]
fn evidence_bytes_match_input() {
    let config = AnalysisConfig::default();
    let program = branching_program();
    let result = analyze(&program, "EVIDENCE", &[], &config);

    for instr in &result.instructions {
        let lo = instr.address as usize;
        let hi = lo + instr.size();
        assert_eq!(instr.bytes, &program[lo..hi], "instruction bytes must alias the input");
    }
    for span in &result.unknown_spans {
        let lo = span.start as usize;
        let hi = lo + span.len();
        assert_eq!(span.bytes, &program[lo..hi]);
    }
}

#[test]
fn statistics_histogram_is_ordered() {
    let config = AnalysisConfig::default();
    let result = analyze(&simple_program(), "SIMPLE", &[], &config);

    let keys: Vec<&str> = result.statistics.mnemonic_histogram.keys().copied().collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(keys, sorted);
    assert_eq!(result.statistics.mnemonic_histogram["BCR"], 1);
    assert_eq!(result.statistics.mnemonic_histogram["STM"], 1);
}

#[test]
fn analyze_file_roundtrip() {
    let config = AnalysisConfig::default();
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(&simple_program()).unwrap();
    tmp.flush().unwrap();

    let result = analyze_file(tmp.path(), &config).unwrap();
    assert_eq!(result.status, AnalysisStatus::Success);
    assert_eq!(result.statistics.decoded_instruction_count, 8);
}

#[test]
fn analyze_file_missing() {
    let config = AnalysisConfig::default();
    assert!(matches!(
        analyze_file("/nonexistent/zoscope-input", &config),
        Err(Error::FileError(_))
    ));
}

#[test]
fn entry_hints_raise_confidence() {
    let config = AnalysisConfig::default();
    let result = analyze(&[0x07, 0xFE], "RET", &[0], &config);

    assert_eq!(result.procedures.len(), 1);
    assert_eq!(result.procedures[0].reason, DetectionReason::Declared);
    assert_eq!(result.procedures[0].confidence, Confidence::High);
}
