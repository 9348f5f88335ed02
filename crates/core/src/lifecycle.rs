//! Lifecycle contract for components that own background work.

/// A component that can be asked to stop its background activity.
///
/// `stop` is cooperative: it signals threads owned by the component and returns
/// without waiting for them. Work in flight at the time of the call may be lost.
/// Calling `stop` more than once is harmless.
pub trait Stoppable {
    fn stop(&self);
}

impl<S> Stoppable for std::sync::Arc<S>
where
    S: Stoppable + ?Sized,
{
    fn stop(&self) {
        (**self).stop()
    }
}
