//! Generation orchestration.
//!
//! - [`WindowedGenerationController`](window::WindowedGenerationController):
//!   the chunked generation loop around the bounded-context decoder
//! - [`GenerationSession`](session::GenerationSession): the user-facing facade
//! - [`ProgressObserver`]: injectable progress reporting

pub mod session;
pub mod window;

// Re-export commonly used items
pub use session::GenerationSession;
pub use window::{GenerationState, WindowedGenerationController};

/// Observer for generation progress.
///
/// Receives `(tokens_generated_so_far, total_tokens)` zero or more times per
/// generation call. Counts include tokens committed by earlier chunks, so a
/// long multi-chunk generation reports monotonically against one total.
/// Console printing is a caller concern; the default observer does nothing.
pub trait ProgressObserver {
    /// Called as generation advances.
    fn on_progress(&mut self, generated: usize, total: usize);
}

/// The default observer: ignores all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressObserver for NoopProgress {
    fn on_progress(&mut self, _generated: usize, _total: usize) {}
}

/// Adapts a closure into a [`ProgressObserver`].
pub struct FnObserver<F>(pub F);

impl<F: FnMut(usize, usize)> ProgressObserver for FnObserver<F> {
    fn on_progress(&mut self, generated: usize, total: usize) {
        (self.0)(generated, total)
    }
}
