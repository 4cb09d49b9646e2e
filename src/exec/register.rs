//! Register layout of a stage: inputs, outputs and registers to clear.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::{ExecError, Result};

/// Column index inside a block.
pub type RegisterId = usize;

/// Register layout of one stage: what it reads, writes, keeps and clears.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterInfos {
    nr_input: usize,
    nr_output: usize,
    output_registers: SmallVec<[RegisterId; 4]>,
    registers_to_clear: SmallVec<[RegisterId; 4]>,
    registers_to_keep: SmallVec<[RegisterId; 8]>,
}

impl RegisterInfos {
    /// Layout that keeps every input register and writes `output_registers`.
    pub fn new(
        nr_input: usize,
        nr_output: usize,
        output_registers: impl IntoIterator<Item = RegisterId>,
    ) -> Result<Self> {
        Self::with_registers_to_clear(nr_input, nr_output, output_registers, [])
    }

    /// Layout that additionally drops `registers_to_clear` from forwarded
    /// data rows.
    pub fn with_registers_to_clear(
        nr_input: usize,
        nr_output: usize,
        output_registers: impl IntoIterator<Item = RegisterId>,
        registers_to_clear: impl IntoIterator<Item = RegisterId>,
    ) -> Result<Self> {
        if nr_output < nr_input {
            return Err(ExecError::internal(format!(
                "stage narrows {nr_input} input registers to {nr_output}"
            )));
        }
        let output_registers: SmallVec<[RegisterId; 4]> = output_registers.into_iter().collect();
        let registers_to_clear: SmallVec<[RegisterId; 4]> =
            registers_to_clear.into_iter().collect();
        if let Some(reg) = output_registers.iter().find(|reg| **reg >= nr_output) {
            return Err(ExecError::internal(format!(
                "output register {reg} outside of {nr_output} registers"
            )));
        }
        let registers_to_keep = (0..nr_input)
            .filter(|reg| !registers_to_clear.contains(reg) && !output_registers.contains(reg))
            .collect();
        Ok(Self {
            nr_input,
            nr_output,
            output_registers,
            registers_to_clear,
            registers_to_keep,
        })
    }

    /// Layout of a stage that forwards `regs` registers untouched.
    pub fn passthrough(regs: usize) -> Self {
        Self {
            nr_input: regs,
            nr_output: regs,
            output_registers: SmallVec::new(),
            registers_to_clear: SmallVec::new(),
            registers_to_keep: (0..regs).collect(),
        }
    }

    /// Registers per input row.
    pub fn number_of_input_registers(&self) -> usize {
        self.nr_input
    }

    /// Registers per output row.
    pub fn number_of_output_registers(&self) -> usize {
        self.nr_output
    }

    /// Registers the stage writes itself.
    pub fn output_registers(&self) -> &[RegisterId] {
        &self.output_registers
    }

    /// Input registers dropped from forwarded data rows.
    pub fn registers_to_clear(&self) -> &[RegisterId] {
        &self.registers_to_clear
    }

    /// Input registers copied into every output data row.
    pub fn registers_to_keep(&self) -> &[RegisterId] {
        &self.registers_to_keep
    }
}

/// Assignment of query variables to register columns.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterPlan {
    variables: BTreeMap<String, RegisterId>,
    nr_registers: usize,
}

impl RegisterPlan {
    /// Empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next free register to `variable` and returns it. A variable
    /// that is already planned keeps its register.
    pub fn add_variable(&mut self, variable: impl Into<String>) -> RegisterId {
        let next = self.nr_registers;
        let reg = *self.variables.entry(variable.into()).or_insert(next);
        if reg == next {
            self.nr_registers += 1;
        }
        reg
    }

    /// Register of `variable`.
    pub fn register_for(&self, variable: &str) -> Result<RegisterId> {
        self.variables
            .get(variable)
            .copied()
            .ok_or_else(|| ExecError::internal(format!("variable '{variable}' has no register")))
    }

    /// Registers planned so far.
    pub fn nr_registers(&self) -> usize {
        self.nr_registers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_excludes_cleared_and_written_registers() {
        let infos = RegisterInfos::with_registers_to_clear(3, 4, [3], [1]).unwrap();
        assert_eq!(infos.registers_to_keep(), &[0, 2]);
        assert_eq!(infos.output_registers(), &[3]);
        assert!(RegisterInfos::new(3, 2, []).is_err());
        assert!(RegisterInfos::new(1, 2, [2]).is_err());
    }

    #[test]
    fn plan_reuses_known_variables() {
        let mut plan = RegisterPlan::new();
        assert_eq!(plan.add_variable("doc"), 0);
        assert_eq!(plan.add_variable("sum"), 1);
        assert_eq!(plan.add_variable("doc"), 0);
        assert_eq!(plan.nr_registers(), 2);
        assert_eq!(plan.register_for("sum").unwrap(), 1);
        assert!(plan.register_for("missing").is_err());
    }
}
