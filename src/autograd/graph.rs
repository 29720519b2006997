//! Computation graph for automatic differentiation.
//!
//! This module implements the tape-based recording of operations,
//! the backward pass, and checkpoint/rollback used by [`super::GradScope`].

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::grad_fn::GradFn;
use super::tensor::{Tensor, TensorId};

/// Entry in the computation tape.
#[derive(Clone)]
pub(crate) struct TapeEntry {
    pub output_id: TensorId,
    pub grad_fn: Arc<dyn GradFn>,
    pub input_ids: Vec<TensorId>,
}

/// Position in the graph that a later [`ComputationGraph::rollback`] returns to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphCheckpoint {
    tape_len: usize,
    registered: usize,
}

/// Snapshot of what the graph currently retains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryInfo {
    /// Registered tensors
    pub num_tensors: usize,
    /// Bytes held by registered tensors and their gradients
    pub num_bytes: usize,
    /// Recorded operations
    pub tape_len: usize,
}

/// Computation graph that records operations for backward pass.
///
/// Operations are appended to the tape during the forward pass and
/// replayed in reverse order during the backward pass.
///
/// Each thread has its own computation graph (via `thread_local` storage
/// in the parent module).
#[allow(missing_debug_implementations)]
pub struct ComputationGraph {
    tape: Vec<TapeEntry>,
    tensors: HashMap<TensorId, Tensor>,
    /// Registration order, so a rollback knows which tensors are newer.
    order: Vec<TensorId>,
    requires_grad: HashSet<TensorId>,
}

impl ComputationGraph {
    /// Create a new empty computation graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tape: Vec::new(),
            tensors: HashMap::new(),
            order: Vec::new(),
            requires_grad: HashSet::new(),
        }
    }

    /// Clear all recorded operations and tensors.
    pub fn clear(&mut self) {
        self.tape.clear();
        self.tensors.clear();
        self.order.clear();
        self.requires_grad.clear();
    }

    /// Register a tensor with the graph.
    ///
    /// Re-registering an id keeps the stored copy, gradient included, and
    /// its original registration position.
    pub fn register_tensor(&mut self, tensor: Tensor) {
        let id = tensor.id();
        if tensor.requires_grad_enabled() {
            self.requires_grad.insert(id);
        }
        match self.tensors.entry(id) {
            Entry::Occupied(mut stored) => {
                if tensor.requires_grad_enabled() {
                    stored.get_mut().requires_grad_(true);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(tensor);
                self.order.push(id);
            }
        }
    }

    /// Record an operation to the tape.
    pub fn record(
        &mut self,
        output_id: TensorId,
        grad_fn: Arc<dyn GradFn>,
        input_ids: Vec<TensorId>,
    ) {
        self.tape.push(TapeEntry {
            output_id,
            grad_fn,
            input_ids,
        });
    }

    /// Get a tensor by ID.
    #[must_use]
    pub fn get_tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.get(&id)
    }

    /// Compute gradients via backpropagation.
    ///
    /// 1. Seed `grad_output` for the output tensor
    /// 2. Walk the tape in reverse
    /// 3. Ask each operation for the gradients of its inputs
    /// 4. Sum gradients for tensors used more than once
    /// 5. Store the totals on registered leaves that require gradients
    pub fn backward(&mut self, output_id: TensorId, grad_output: Tensor) {
        self.propagate(output_id, grad_output, None);
    }

    /// Backpropagate like [`ComputationGraph::backward`], but store
    /// gradients only on the listed leaves.
    ///
    /// Every other leaf keeps whatever gradient it had before the call.
    pub fn backward_for(&mut self, output_id: TensorId, grad_output: Tensor, leaves: &[TensorId]) {
        self.propagate(output_id, grad_output, Some(leaves));
    }

    fn propagate(&mut self, output_id: TensorId, grad_output: Tensor, only: Option<&[TensorId]>) {
        let mut grads: HashMap<TensorId, Tensor> = HashMap::new();
        grads.insert(output_id, grad_output);

        for entry in self.tape.iter().rev() {
            let Some(grad_out) = grads.get(&entry.output_id).cloned() else {
                continue;
            };

            let input_grads = entry.grad_fn.backward(&grad_out);

            for (input_id, input_grad) in entry.input_ids.iter().zip(input_grads) {
                grads
                    .entry(*input_id)
                    .and_modify(|existing| {
                        for (acc, g) in existing.data_mut().iter_mut().zip(input_grad.data()) {
                            *acc += g;
                        }
                    })
                    .or_insert(input_grad);
            }
        }

        for (id, grad) in grads {
            if only.is_some_and(|leaves| !leaves.contains(&id)) {
                continue;
            }
            if let Some(tensor) = self.tensors.get_mut(&id) {
                if tensor.requires_grad_enabled() && tensor.is_leaf() {
                    tensor.accumulate_grad(grad);
                }
            }
        }
    }

    /// Get the number of recorded operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    /// Check if the tape is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    /// Get gradient for a tensor by ID (after backward).
    #[must_use]
    pub fn get_grad(&self, id: TensorId) -> Option<Tensor> {
        self.tensors.get(&id).and_then(|t| t.grad().cloned())
    }

    /// Clear gradient for a specific tensor.
    pub fn clear_grad(&mut self, id: TensorId) {
        if let Some(tensor) = self.tensors.get_mut(&id) {
            tensor.clear_grad();
        }
    }

    /// Mark the current end of the tape and tensor registry.
    #[must_use]
    pub fn checkpoint(&self) -> GraphCheckpoint {
        GraphCheckpoint {
            tape_len: self.tape.len(),
            registered: self.order.len(),
        }
    }

    /// Drop every operation and tensor recorded after `checkpoint`.
    ///
    /// A checkpoint taken before a [`ComputationGraph::clear`] is clamped
    /// to the current (smaller) graph.
    pub fn rollback(&mut self, checkpoint: GraphCheckpoint) {
        self.tape.truncate(checkpoint.tape_len);
        let keep = checkpoint.registered.min(self.order.len());
        for id in self.order.drain(keep..) {
            self.tensors.remove(&id);
            self.requires_grad.remove(&id);
        }
    }

    /// Report retained tensors, bytes, and tape length.
    #[must_use]
    pub fn memory(&self) -> MemoryInfo {
        MemoryInfo {
            num_tensors: self.tensors.len(),
            num_bytes: self.tensors.values().map(Tensor::num_bytes).sum(),
            tape_len: self.tape.len(),
        }
    }
}

impl Default for ComputationGraph {
    fn default() -> Self {
        Self::new()
    }
}
