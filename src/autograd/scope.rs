//! Scoped release of graph recordings.

use super::graph::GraphCheckpoint;
use super::with_graph;

/// Guard that releases every tape entry and tensor recorded while it lives.
///
/// Entering checkpoints the thread-local graph; dropping the guard rolls it
/// back, whether the scope ends normally, through `?`, or by unwinding.
/// Recordings made before the scope was entered are left intact.
///
/// # Example
///
/// ```
/// use enganar::autograd::{memory, GradScope, Tensor};
///
/// let before = memory();
/// {
///     let _scope = GradScope::enter();
///     let x = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
///     x.mul(&x).sum().backward();
/// }
/// assert_eq!(memory(), before);
/// ```
#[derive(Debug)]
#[must_use = "the scope is released as soon as the guard is dropped"]
pub struct GradScope {
    checkpoint: GraphCheckpoint,
}

impl GradScope {
    /// Checkpoint the current thread's graph.
    pub fn enter() -> Self {
        Self {
            checkpoint: with_graph(|graph| graph.checkpoint()),
        }
    }

    /// Run `f` inside a scope and release its recordings afterwards.
    pub fn run<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _scope = Self::enter();
        f()
    }
}

impl Drop for GradScope {
    fn drop(&mut self) {
        with_graph(|graph| graph.rollback(self.checkpoint));
    }
}
