use chain_core::SvmInstruction;
use tracing::{debug, warn};

use crate::rpc_types::{CompiledInstruction, InnerInstructionSet};

/// Outer instructions interleaved with their CPIs
#[derive(Debug, Clone, Default)]
pub struct FlattenedInstructions {
    pub instructions: Vec<SvmInstruction>,
    /// Some CPIs were deeper than the limit and were dropped
    pub truncated: bool,
}

/// Flatten outer and inner instructions into execution order.
///
/// Each outer instruction is followed by its CPIs. `trace_index` increases
/// strictly across the result; depth is 0 for outer instructions and
/// `stackHeight - 1` for CPIs (1 when the node omits it).
pub fn flatten_instructions(
    account_keys: &[String],
    outer: &[CompiledInstruction],
    inner: &[InnerInstructionSet],
    max_depth: u32,
) -> FlattenedInstructions {
    let mut flattened = FlattenedInstructions::default();
    let mut trace_index = 0u32;

    for (outer_index, instruction) in outer.iter().enumerate() {
        let cpis = inner
            .iter()
            .filter(|set| set.index == outer_index)
            .flat_map(|set| set.instructions.iter());

        let nodes = std::iter::once((instruction, 0u32)).chain(cpis.map(|cpi| {
            let depth = cpi.stack_height.map(|h| h.saturating_sub(1).max(1)).unwrap_or(1);
            (cpi, depth)
        }));

        for (compiled, depth) in nodes {
            if depth > max_depth {
                flattened.truncated = true;
                continue;
            }
            let Some(decoded) = resolve(account_keys, compiled, trace_index, depth, outer_index) else {
                continue;
            };
            flattened.instructions.push(decoded);
            trace_index += 1;
        }
    }

    if flattened.truncated {
        warn!("Instruction depth exceeded {}, deeper CPIs dropped", max_depth);
    }
    flattened
}

fn resolve(
    account_keys: &[String],
    compiled: &CompiledInstruction,
    trace_index: u32,
    depth: u32,
    outer_index: usize,
) -> Option<SvmInstruction> {
    let Some(program_id) = account_keys.get(compiled.program_id_index) else {
        debug!(
            "Instruction references program index {} outside {} account keys",
            compiled.program_id_index,
            account_keys.len()
        );
        return None;
    };

    let accounts = compiled
        .accounts
        .iter()
        .filter_map(|i| account_keys.get(*i).cloned())
        .collect();

    let data = bs58::decode(&compiled.data).into_vec().unwrap_or_else(|e| {
        debug!("Undecodable instruction data for {}: {}", program_id, e);
        Vec::new()
    });

    Some(SvmInstruction {
        trace_index,
        depth,
        outer_index,
        program_id: program_id.clone(),
        accounts,
        data,
    })
}
