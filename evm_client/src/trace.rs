use chain_core::{CallType, EvmInternalCall};
use tracing::warn;

use crate::abi::parse_quantity_big;
use crate::rpc_types::CallFrame;

/// Result of flattening a call tree
#[derive(Debug, Clone, Default)]
pub struct FlattenedTrace {
    pub calls: Vec<EvmInternalCall>,
    /// Frames deeper than the limit were dropped
    pub truncated: bool,
}

/// Flatten a `callTracer` tree depth-first into execution order.
///
/// Uses an explicit stack, so hostile nesting cannot exhaust the call stack.
/// Frames deeper than `max_depth` (and their children) are dropped.
pub fn flatten_call_trace(root: &CallFrame, max_depth: u32) -> FlattenedTrace {
    let mut flattened = FlattenedTrace::default();
    let mut stack: Vec<(&CallFrame, u32)> = vec![(root, 0)];
    let mut trace_index = 0u32;

    while let Some((frame, depth)) = stack.pop() {
        if depth > max_depth {
            flattened.truncated = true;
            continue;
        }

        let value = frame
            .value
            .as_deref()
            .and_then(|v| parse_quantity_big(v).ok())
            .unwrap_or_default();

        flattened.calls.push(EvmInternalCall {
            trace_index,
            depth,
            call_type: CallType::from_trace_type(&frame.call_type),
            from: frame.from.to_lowercase(),
            to: frame.to.as_ref().map(|t| t.to_lowercase()),
            value,
            input: frame.input.clone().unwrap_or_default(),
            error: frame.error.clone(),
        });
        trace_index += 1;

        // Reverse so the first child is popped next
        for child in frame.calls.iter().rev() {
            stack.push((child, depth + 1));
        }
    }

    if flattened.truncated {
        warn!(
            "Call trace exceeded max depth {}, kept {} frames",
            max_depth,
            flattened.calls.len()
        );
    }
    flattened
}
