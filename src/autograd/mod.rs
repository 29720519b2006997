//! Reverse-mode automatic differentiation.
//!
//! This module implements tape-based automatic differentiation following the
//! methodology described in Baydin et al. (2018) and Griewank & Walther (2008).
//!
//! # Architecture
//!
//! The autograd engine uses a define-by-run (dynamic) computational graph:
//! - Operations are recorded to a thread-local tape during the forward pass
//! - Gradients are computed in reverse order during the backward pass
//! - Gradients of tensors used more than once are summed
//! - [`GradScope`] releases everything recorded inside a block
//!
//! # Example
//!
//! ```
//! use enganar::autograd::{clear_graph, get_grad, Tensor};
//!
//! clear_graph();
//! let x = Tensor::from_slice(&[1.0, 2.0, 3.0]).requires_grad();
//! let w = Tensor::from_slice(&[0.5, 0.5, 0.5]);
//!
//! let y = x.mul(&w).sum();
//! y.backward();
//!
//! let grad = get_grad(x.id()).unwrap();
//! assert_eq!(grad.data(), &[0.5, 0.5, 0.5]);
//! clear_graph();
//! ```
//!
//! # References
//!
//! - Baydin, A. G., et al. (2018). Automatic differentiation in machine learning: a survey. JMLR.
//! - Goodfellow, I. J., et al. (2015). Explaining and harnessing adversarial examples. ICLR.
//! - Griewank, A., & Walther, A. (2008). Evaluating derivatives. SIAM.

pub(crate) mod grad_fn;
mod graph;
mod ops;
mod scope;
mod tensor;

pub mod functional;

pub use functional::{GradientOracle, ScalarObjective, TapeGradient};
pub use grad_fn::GradFn;
pub use graph::{ComputationGraph, GraphCheckpoint, MemoryInfo};
pub(crate) use ops::{log_softmax_rows, softmax_rows, track};
pub use scope::GradScope;
pub use tensor::{Tensor, TensorId};

use std::cell::{Cell, RefCell};

thread_local! {
    /// Computation graph for the current thread.
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());

    /// Whether operations are currently recorded.
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Restores the previous recording mode when dropped, including on unwind.
struct ModeGuard {
    prev: bool,
}

impl ModeGuard {
    fn set(enabled: bool) -> Self {
        let prev = GRAD_ENABLED.with(|flag| flag.replace(enabled));
        Self { prev }
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|flag| flag.set(self.prev));
    }
}

/// Execute a closure without gradient tracking.
///
/// Useful for inference or when gradients are not needed.
///
/// # Example
///
/// ```
/// use enganar::autograd::{no_grad, Tensor};
///
/// let x = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
/// let y = no_grad(|| x.mul(&x).sum());
///
/// assert!(!y.requires_grad_enabled());
/// ```
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ModeGuard::set(false);
    f()
}

/// Execute a closure with gradient tracking forced on, even inside [`no_grad`].
pub fn enable_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ModeGuard::set(true);
    f()
}

/// Check if gradient tracking is currently enabled.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Run `f` against the thread-local computation graph.
pub(crate) fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&mut ComputationGraph) -> R,
{
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Clear the computation graph.
pub fn clear_graph() {
    with_graph(ComputationGraph::clear);
}

/// Get gradient for a tensor by ID from the graph.
#[must_use]
pub fn get_grad(id: TensorId) -> Option<Tensor> {
    with_graph(|graph| graph.get_grad(id))
}

/// Clear gradient for a specific tensor by ID.
pub fn clear_grad(id: TensorId) {
    with_graph(|graph| graph.clear_grad(id));
}

/// What the current thread's graph retains.
///
/// Comparable to `tf.memory()`: compare two snapshots to detect leaked
/// intermediates.
#[must_use]
pub fn memory() -> MemoryInfo {
    with_graph(|graph| graph.memory())
}
