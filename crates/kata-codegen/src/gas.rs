//! Gas-metering instrumentation.
//!
//! Injects a tick at:
//! - Every loop iteration header
//! - Every function entry
//!
//! When the counter exceeds the limit, the host is told and the module traps.

use kata_types::abi::HostFn;
use wasm_encoder::{BlockType, Function, Instruction};

use crate::types::{GLOBAL_GAS, GLOBAL_GAS_LIMIT};

/// Emit instructions that increment the gas counter and trap if exhausted.
///
/// Equivalent pseudo-code:
/// ```text
/// gas += 1
/// if gas > gas_limit { gas_exhausted(); unreachable }
/// ```
pub fn emit_gas_tick(f: &mut Function) {
    // gas += 1
    f.instruction(&Instruction::GlobalGet(GLOBAL_GAS));
    f.instruction(&Instruction::I32Const(1));
    f.instruction(&Instruction::I32Add);
    f.instruction(&Instruction::GlobalSet(GLOBAL_GAS));

    // if gas > gas_limit → trap
    f.instruction(&Instruction::GlobalGet(GLOBAL_GAS));
    f.instruction(&Instruction::GlobalGet(GLOBAL_GAS_LIMIT));
    f.instruction(&Instruction::I32GtU);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::Call(HostFn::GasExhausted.index()));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);
}
