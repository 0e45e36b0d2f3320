use thiserror::Error;

use crate::bytecode::op::Instr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("verify error: {instr:?} at {index} targets {target}, outside 0..{len}")]
pub struct VerifyError {
    pub index: usize,
    pub instr: Instr,
    pub target: i64,
    pub len: usize,
}

/// Check that every relative branch, jump and address computation in `text`
/// lands on an instruction of `text`.
///
/// Only static targets are checked. `CALL` and `RTN` go through memory and
/// registers and are checked by the machine when they execute.
pub fn verify_targets(text: &[Instr]) -> Result<(), VerifyError> {
    let len = text.len();
    for (index, instr) in text.iter().enumerate() {
        if let Some(off) = instr.relative_target() {
            let target = index as i64 + off;
            if target < 0 || target >= len as i64 {
                return Err(VerifyError {
                    index,
                    instr: *instr,
                    target,
                    len,
                });
            }
        }
    }
    Ok(())
}
