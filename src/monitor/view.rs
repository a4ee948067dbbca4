use crate::state::ExecutionSnapshot;

/// A display surface that re-renders when the execution history changes.
///
/// Called after every committed transition, reset and restore, with the
/// full history; the last entry is the live state.
pub trait View {
    fn update(&mut self, history: &[ExecutionSnapshot]);
}

impl<F> View for F
where
    F: FnMut(&[ExecutionSnapshot]),
{
    fn update(&mut self, history: &[ExecutionSnapshot]) {
        self(history);
    }
}
