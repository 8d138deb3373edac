/// Represents an action that should be run when this object runs out of scope,
/// unless it's explicitly deactivated.
///
/// This helps with implementing functions that have transactional semantics:
///
/// ```text
/// do_x()?;
/// let mut guard_x = OnScopeExit::new(|| undo_x());
///
/// // If this fails, undo_x() is called
/// do_y()?;
/// let mut guard_y = OnScopeExit::new(|| undo_y());
///
/// // If this fails, both undo_x and undo_y are called.
/// let goods = get_goods()?;
///
/// // The transaction is complete, deactivate the undo actions.
/// guard_x.deactivate();
/// guard_y.deactivate();
///
/// return goods;
/// ```
pub struct OnScopeExit<F>
where
    F: FnOnce(),
{
    action: Option<F>,
}

impl<F> OnScopeExit<F>
where
    F: FnOnce(),
{
    pub fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }

    pub fn deactivate(&mut self) {
        self.action = None
    }
}

impl<F> Drop for OnScopeExit<F>
where
    F: FnOnce(),
{
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action()
        }
    }
}
