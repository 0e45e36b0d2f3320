use std::io::{self, BufRead, Write};

use tracing::{debug, trace};

use crate::bytecode::{
    image::ProgramImage,
    op::{Alu, Instr, Reg, WORD_WIDTH},
    verify::verify_targets,
};
use crate::runtime::runtime_error::RuntimeError;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub max_steps: Option<u64>,
    /// Largest memory, in words, an image may ask for.
    pub max_memory_words: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            max_steps: None,
            max_memory_words: 1 << 24,
        }
    }
}

enum Flow {
    Next(usize),
    Exit(i32),
}

/// Interpreter for program images.
///
/// Memory is one flat array of words: the data segment starts at `GP` and the
/// stack grows down from the stack bottom towards it.
pub struct VmBc {
    config: VmConfig,
    mem: Vec<i32>,
    regs: [i32; Reg::ALL.len()],
    data_end: i64,
    steps: u64,
}

impl Default for VmBc {
    fn default() -> Self {
        Self::new()
    }
}

impl VmBc {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            config,
            mem: Vec::new(),
            regs: [0; Reg::ALL.len()],
            data_end: 0,
            steps: 0,
        }
    }

    pub fn reg(&self, reg: Reg) -> i32 {
        self.regs[reg.index()]
    }

    /// Instructions executed by the last run.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn run_stdio(&mut self, image: &ProgramImage) -> Result<i32, RuntimeError> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.run(image, &mut stdin.lock(), &mut stdout.lock())
    }

    /// Execute `image` until it exits, returning the exit code.
    pub fn run<R: BufRead, W: Write>(
        &mut self,
        image: &ProgramImage,
        input: &mut R,
        output: &mut W,
    ) -> Result<i32, RuntimeError> {
        self.load(image)?;

        let text = image.text();
        let mut pc = 0usize;

        loop {
            let instr = *text
                .get(pc)
                .ok_or(RuntimeError::PcOutOfRange { target: pc as i64 })?;

            self.check_limits()?;
            trace!(pc, ?instr, "step");

            match self.exec(instr, pc, input, output)? {
                Flow::Next(next) => pc = next,
                Flow::Exit(code) => {
                    output.flush()?;
                    debug!(code, steps = self.steps, "program exited");
                    return Ok(code);
                }
            }
        }
    }

    fn load(&mut self, image: &ProgramImage) -> Result<(), RuntimeError> {
        verify_targets(image.text()).map_err(|e| RuntimeError::Load(e.to_string()))?;

        let header = image.header();
        let words = header.stack_bottom as usize / WORD_WIDTH;
        if words > self.config.max_memory_words {
            return Err(RuntimeError::Load(format!(
                "image needs {} words of memory, limit is {}",
                words, self.config.max_memory_words
            )));
        }

        let gp = header.data_start as usize / WORD_WIDTH;
        let data = image.data();
        self.mem = vec![0; words];
        self.mem
            .get_mut(gp..gp + data.len())
            .ok_or_else(|| RuntimeError::Load("data segment outside memory".to_string()))?
            .copy_from_slice(data);

        self.regs = [0; Reg::ALL.len()];
        self.regs[Reg::Gp.index()] = gp as i32;
        self.regs[Reg::Sp.index()] = words as i32;
        self.regs[Reg::Fp.index()] = words as i32;
        self.data_end = (gp + data.len()) as i64;
        self.steps = 0;

        debug!(
            instructions = image.text().len(),
            words,
            gp,
            "image loaded"
        );
        Ok(())
    }

    fn check_limits(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;

        if let Some(max) = self.config.max_steps {
            if self.steps > max {
                return Err(RuntimeError::StepLimit(max));
            }
        }

        Ok(())
    }

    // Execution

    fn set(&mut self, reg: Reg, value: i32) {
        self.regs[reg.index()] = value;
    }

    fn addr(&self, pc: usize, reg: Reg, offset: i16) -> Result<usize, RuntimeError> {
        let addr = self.reg(reg) as i64 + offset as i64;
        if addr < 0 || addr >= self.mem.len() as i64 {
            return Err(RuntimeError::AddressOutOfRange { pc, addr });
        }
        Ok(addr as usize)
    }

    fn read(&self, pc: usize, reg: Reg, offset: i16) -> Result<i32, RuntimeError> {
        Ok(self.mem[self.addr(pc, reg, offset)?])
    }

    fn write(&mut self, pc: usize, reg: Reg, offset: i16, value: i32) -> Result<(), RuntimeError> {
        let addr = self.addr(pc, reg, offset)?;
        self.mem[addr] = value;
        Ok(())
    }

    fn check_sp(&self, pc: usize) -> Result<(), RuntimeError> {
        let sp = self.reg(Reg::Sp) as i64;
        if sp < self.data_end {
            return Err(RuntimeError::StackOverflow { pc, sp });
        }
        Ok(())
    }

    fn exec<R: BufRead, W: Write>(
        &mut self,
        instr: Instr,
        pc: usize,
        input: &mut R,
        output: &mut W,
    ) -> Result<Flow, RuntimeError> {
        match instr {
            // Registers
            Instr::Sri { reg, imm } => {
                self.set(reg, self.reg(reg).wrapping_sub(imm as i32));
                if reg == Reg::Sp {
                    self.check_sp(pc)?;
                }
            }
            Instr::Ari { reg, imm } => self.set(reg, self.reg(reg).wrapping_add(imm as i32)),
            Instr::Cpr { t, s } => {
                self.set(t, self.reg(s));
                if t == Reg::Sp {
                    self.check_sp(pc)?;
                }
            }
            Instr::Lwr { t, s, os } => {
                let v = self.read(pc, s, os)?;
                self.set(t, v);
            }
            Instr::Swr { t, ot, s } => self.write(pc, t, ot, self.reg(s))?,

            // Memory
            Instr::Cpw { t, ot, s, os } => {
                let v = self.read(pc, s, os)?;
                self.write(pc, t, ot, v)?;
            }
            Instr::Lit { t, ot, imm } => self.write(pc, t, ot, imm as i32)?,
            Instr::Lea { t, ot, off } => self.write(pc, t, ot, (pc as i64 + off as i64) as i32)?,

            // Arithmetic
            Instr::Arith { op, t, ot, s, os } => {
                let a = self.read(pc, Reg::Sp, 0)?;
                let b = self.read(pc, s, os)?;
                let v = match op {
                    Alu::Add => a.wrapping_add(b),
                    Alu::Sub => a.wrapping_sub(b),
                    Alu::Mul => a.wrapping_mul(b),
                    Alu::Div | Alu::Mod if b == 0 => {
                        return Err(RuntimeError::DivisionByZero { pc });
                    }
                    Alu::Div => a.wrapping_div(b),
                    Alu::Mod => a.wrapping_rem(b),
                };
                self.write(pc, t, ot, v)?;
            }
            Instr::Neg { t, ot, s, os } => {
                let v = self.read(pc, s, os)?;
                self.write(pc, t, ot, v.wrapping_neg())?;
            }

            // Control flow
            Instr::Branch { test, s, os, off } => {
                if test.holds(self.read(pc, s, os)?) {
                    return jump(pc as i64 + off as i64);
                }
            }
            Instr::Jrel { off } => return jump(pc as i64 + off as i64),
            Instr::Call { s, os } => {
                let target = self.read(pc, s, os)?;
                self.set(Reg::Ra, (pc + 1) as i32);
                return jump(target as i64);
            }
            Instr::Rtn => return jump(self.reg(Reg::Ra) as i64),
            Instr::Exit { code } => return Ok(Flow::Exit(code as i32)),

            // I/O
            Instr::Pint { s, os } => {
                let v = self.read(pc, s, os)?;
                writeln!(output, "{}", v)?;
            }
            Instr::Rint { t, ot } => {
                let v = read_int(pc, input)?;
                self.write(pc, t, ot, v)?;
            }
        }

        Ok(Flow::Next(pc + 1))
    }
}

fn jump(target: i64) -> Result<Flow, RuntimeError> {
    if target < 0 {
        return Err(RuntimeError::PcOutOfRange { target });
    }
    Ok(Flow::Next(target as usize))
}

/// Next non-blank line of `input` as a decimal integer.
fn read_int<R: BufRead>(pc: usize, input: &mut R) -> Result<i32, RuntimeError> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(RuntimeError::EndOfInput { pc });
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        return text.parse().map_err(|_| RuntimeError::BadInput {
            pc,
            input: text.to_string(),
        });
    }
}
