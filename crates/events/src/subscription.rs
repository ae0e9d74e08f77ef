//! Unsubscribe capability returned by [`DispatchBus::subscribe`](crate::DispatchBus::subscribe).

/// Handle to exactly one registered handler.
///
/// Dropping the handle removes the handler, so a page that keeps its
/// subscriptions in a scope releases them all when the scope is torn down.
/// Calling [`Subscription::unsubscribe`] does the same explicitly.
#[must_use = "dropping a Subscription immediately unsubscribes its handler"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Remove the handler from the bus.
    ///
    /// Removing a handler that the bus no longer holds (or whose bus has been
    /// dropped) is a no-op.
    pub fn unsubscribe(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}
