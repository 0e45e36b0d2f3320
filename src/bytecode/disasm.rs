use std::collections::HashMap;

use crate::bytecode::{
    image::ProgramImage,
    op::{Instr, Reg},
};

/// Print a full listing of an image: header, text and data.
pub fn print_image(image: &ProgramImage) {
    print!("{}", image_listing(image));
}

pub fn image_listing(image: &ProgramImage) -> String {
    let h = image.header();
    let mut out = String::new();

    out.push_str("════════════════════════════════════════\n");
    out.push_str(" header\n");
    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!("  text   {:>8}  {:>6} bytes\n", h.text_start, h.text_length));
    out.push_str(&format!("  data   {:>8}  {:>6} bytes\n", h.data_start, h.data_length));
    out.push_str(&format!("  stack  {:>8}\n", h.stack_bottom));
    out.push('\n');

    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!(" text  {} instructions\n", image.text().len()));
    out.push_str("════════════════════════════════════════\n");
    out.push_str(&disassemble_to_string(image.text()));
    out.push('\n');

    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!(" data  {} words\n", image.data().len()));
    out.push_str("════════════════════════════════════════\n");
    out.push_str(&data_listing(image.data()));
    out
}

/// One line per instruction, with a `►` marker on every branch target.
pub fn disassemble_to_string(text: &[Instr]) -> String {
    let mut output = String::new();
    let jump_targets = collect_jump_targets(text);

    for (ip, instr) in text.iter().enumerate() {
        if jump_targets.contains(&ip) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        output.push_str(&format!("{:04} ", ip));

        if jump_targets.contains(&ip) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_instr(instr, ip));
        output.push('\n');
    }

    output
}

/// Pool values with their `GP` offsets.
pub fn data_listing(data: &[i32]) -> String {
    let mut output = String::new();
    for (offset, value) in data.iter().enumerate() {
        output.push_str(&format!("{:04}   {}\n", offset, value));
    }
    output
}

fn collect_jump_targets(text: &[Instr]) -> Vec<usize> {
    let mut targets = Vec::new();

    for (ip, instr) in text.iter().enumerate() {
        // LEA marks procedure entry points
        if let Some(offset) = instr.relative_target() {
            let target = ip as i64 + offset;
            if target >= 0 && !targets.contains(&(target as usize)) {
                targets.push(target as usize);
            }
        }
    }

    targets
}

fn mem(reg: Reg, offset: i16) -> String {
    format!("{}({})", offset, reg.name())
}

fn relative(offset: i64, ip: usize) -> String {
    let target = ip as i64 + offset;
    let direction = if offset < 0 { "↑" } else { "↓" };
    format!("{:+} {} (→ {:04})", offset, direction, target)
}

fn format_instr(instr: &Instr, ip: usize) -> String {
    let name = op_name(instr);
    match *instr {
        Instr::Sri { reg, imm } | Instr::Ari { reg, imm } => {
            format!("{:<11} {}, {}", name, reg.name(), imm)
        }
        Instr::Cpr { t, s } => format!("{:<11} {}, {}", name, t.name(), s.name()),
        Instr::Lwr { t, s, os } => format!("{:<11} {}, {}", name, t.name(), mem(s, os)),
        Instr::Swr { t, ot, s } => format!("{:<11} {}, {}", name, mem(t, ot), s.name()),
        Instr::Cpw { t, ot, s, os }
        | Instr::Arith { t, ot, s, os, .. }
        | Instr::Neg { t, ot, s, os } => {
            format!("{:<11} {}, {}", name, mem(t, ot), mem(s, os))
        }
        Instr::Lit { t, ot, imm } => format!("{:<11} {}, {}", name, mem(t, ot), imm),
        Instr::Lea { t, ot, off } => {
            format!("{:<11} {}, {}", name, mem(t, ot), relative(off as i64, ip))
        }
        Instr::Branch { s, os, off, .. } => {
            format!("{:<11} {}, {}", name, mem(s, os), relative(off as i64, ip))
        }
        Instr::Jrel { off } => format!("{:<11} {}", name, relative(off as i64, ip)),
        Instr::Call { s, os } | Instr::Pint { s, os } => format!("{:<11} {}", name, mem(s, os)),
        Instr::Rint { t, ot } => format!("{:<11} {}", name, mem(t, ot)),
        Instr::Exit { code } => format!("{:<11} {}", name, code),
        Instr::Rtn => name.to_string(),
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Print instruction statistics
pub fn print_stats(image: &ProgramImage) {
    print!("{}", stats_to_string(image.text()));
}

pub fn stats_to_string(text: &[Instr]) -> String {
    let mut out = String::new();
    out.push_str("=== INSTRUCTION STATISTICS ===\n\n");
    out.push_str(&format!("Instructions: {}\n", text.len()));

    let counts = count_ops(text);
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    out.push_str("Op frequency:\n");
    for (op, count) in counts.iter().take(10) {
        let pct = (*count as f64 / text.len() as f64) * 100.0;
        out.push_str(&format!("  {:<14} {:>4} ({:>5.1}%)\n", op, count, pct));
    }
    out
}

fn count_ops(text: &[Instr]) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for instr in text {
        *counts.entry(op_name(instr)).or_insert(0) += 1;
    }
    counts
}

fn op_name(instr: &Instr) -> &'static str {
    match instr {
        Instr::Sri { .. } => "SRI",
        Instr::Ari { .. } => "ARI",
        Instr::Cpr { .. } => "CPR",
        Instr::Lwr { .. } => "LWR",
        Instr::Swr { .. } => "SWR",
        Instr::Cpw { .. } => "CPW",
        Instr::Lit { .. } => "LIT",
        Instr::Lea { .. } => "LEA",
        Instr::Arith { op, .. } => op.mnemonic(),
        Instr::Neg { .. } => "NEG",
        Instr::Branch { test, .. } => test.mnemonic(),
        Instr::Jrel { .. } => "JREL",
        Instr::Call { .. } => "CALL",
        Instr::Rtn => "RTN",
        Instr::Exit { .. } => "EXIT",
        Instr::Pint { .. } => "PINT",
        Instr::Rint { .. } => "RINT",
    }
}
