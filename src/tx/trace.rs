use crate::rpc::types::CallFrame;

use super::types::{InternalTransfer, TransferKind};

/// Flatten a callTracer tree into value transfers.
///
/// Pre-order walk over the root's nested `calls`; the root frame itself is the
/// transaction and is not recorded. A frame becomes a transfer only if it has a
/// destination and a nonzero value.
pub fn flatten_call_trace(root: &CallFrame) -> Vec<InternalTransfer> {
    let mut transfers = Vec::new();
    for call in &root.calls {
        walk(call, 1, &mut transfers);
    }
    transfers
}

fn walk(frame: &CallFrame, depth: u32, out: &mut Vec<InternalTransfer>) {
    if let (Some(to), Some(value)) = (frame.to, frame.value) {
        if !value.is_zero() {
            out.push(InternalTransfer {
                from: frame.from,
                to,
                value_wei: value,
                kind: TransferKind::from_trace_type(&frame.call_type),
                depth,
            });
        }
    }

    for child in &frame.calls {
        walk(child, depth + 1, out);
    }
}
