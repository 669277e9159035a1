use std::fmt;

use tracing::trace;

use crate::error::{CodegenError, CodegenResult};

/// A general-purpose register. `Rax` is the return-value register and never
/// belongs to the allocatable pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    R12,
    R13,
    R14,
    R15,
    Rax,
}

const POOL_SIZE: usize = 4;
const POOL: [Reg; POOL_SIZE] = [Reg::R12, Reg::R13, Reg::R14, Reg::R15];

impl Reg {
    /// Register name for an operand of `bytes` width (1, 4 or 8).
    pub fn sized(self, bytes: u32) -> &'static str {
        match (self, bytes) {
            (Reg::R12, 1) => "r12b",
            (Reg::R12, 4) => "r12d",
            (Reg::R12, _) => "r12",
            (Reg::R13, 1) => "r13b",
            (Reg::R13, 4) => "r13d",
            (Reg::R13, _) => "r13",
            (Reg::R14, 1) => "r14b",
            (Reg::R14, 4) => "r14d",
            (Reg::R14, _) => "r14",
            (Reg::R15, 1) => "r15b",
            (Reg::R15, 4) => "r15d",
            (Reg::R15, _) => "r15",
            (Reg::Rax, 1) => "al",
            (Reg::Rax, 4) => "eax",
            (Reg::Rax, _) => "rax",
        }
    }

    pub fn byte(self) -> &'static str { self.sized(1) }

    pub fn name(self) -> &'static str { self.sized(8) }

    fn slot(self) -> Option<usize> { POOL.iter().position(|&r| r == self) }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// Fixed pool of scratch registers. There is no spilling: running out is an error.
#[derive(Debug, Default)]
pub struct RegisterPool {
    used: [bool; POOL_SIZE],
}

impl RegisterPool {
    pub fn new() -> Self { Self::default() }

    pub fn allocate(&mut self) -> CodegenResult<Reg> {
        let slot = self.used.iter().position(|u| !u).ok_or(CodegenError::OutOfRegisters)?;
        self.used[slot] = true;
        trace!(reg = POOL[slot].name(), "allocate");
        Ok(POOL[slot])
    }

    pub fn free(&mut self, reg: Reg) -> CodegenResult<()> {
        let slot = reg.slot().ok_or(CodegenError::ReservedRegister { reg: reg.name() })?;
        if !self.used[slot] {
            return Err(CodegenError::DoubleFree { reg: reg.name() });
        }
        self.used[slot] = false;
        trace!(reg = reg.name(), "free");
        Ok(())
    }

    pub fn in_use(&self) -> usize { self.used.iter().filter(|u| **u).count() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn allocates_in_order_until_exhausted() {
        let mut pool = RegisterPool::new();
        let regs: Vec<Reg> = (0..4).map(|_| pool.allocate().unwrap()).collect();
        assert_eq!(regs, POOL.to_vec());
        assert_eq!(pool.allocate().unwrap_err(), CodegenError::OutOfRegisters);
        pool.free(Reg::R14).unwrap();
        assert_eq!(pool.allocate().unwrap(), Reg::R14);
        assert_eq!(pool.in_use(), 4);
    }

    #[test]
    fn rejects_double_free_and_reserved() {
        let mut pool = RegisterPool::new();
        let r = pool.allocate().unwrap();
        pool.free(r).unwrap();
        assert_eq!(pool.free(r).unwrap_err(), CodegenError::DoubleFree { reg: "r12" });
        assert_eq!(pool.free(Reg::Rax).unwrap_err(), CodegenError::ReservedRegister { reg: "rax" });
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn sized_names() {
        assert_eq!(Reg::R13.sized(4), "r13d");
        assert_eq!(Reg::R15.byte(), "r15b");
        assert_eq!(Reg::Rax.sized(1), "al");
    }
}
