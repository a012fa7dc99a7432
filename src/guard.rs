//! RAII handle to a borrowed pooled instance.

use crate::factory::Factory;
use crate::pool::Pool;

/// A borrowed instance, returned to its pool on drop.
///
/// Dropping a `Guard` schedules an async return to the pool (validation,
/// `passivate`, and parking or destruction happen on a spawned task, since
/// `Drop` cannot itself be `async`). Call [`Guard::invalidate`] instead of
/// dropping if the object is known to be broken and should be destroyed
/// rather than reused.
pub struct Guard<F: Factory> {
    id: u64,
    value: Option<F::Instance>,
    pool: Pool<F>,
}

impl<F: Factory> Guard<F> {
    pub(crate) fn new(id: u64, value: F::Instance, pool: Pool<F>) -> Self {
        Self { id, value: Some(value), pool }
    }

    /// The bookkeeping id this guard's member is tracked under. Exposed
    /// `pub(crate)` only so `pool.rs`'s white-box tests can drive
    /// `return_object`/`invalidate_object` directly without going through
    /// `Drop`'s spawned task.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Borrows the wrapped instance.
    pub fn get(&self) -> &F::Instance {
        self.value.as_ref().expect("guard used after invalidate")
    }

    /// Mutably borrows the wrapped instance.
    pub fn get_mut(&mut self) -> &mut F::Instance {
        self.value.as_mut().expect("guard used after invalidate")
    }

    /// Consumes the guard and destroys the instance instead of returning
    /// it to the pool, propagating any `Factory::destroy` failure.
    pub async fn invalidate(mut self) -> crate::error::Result<()> {
        let value = self.value.take().expect("guard used after invalidate");
        self.pool.invalidate_object(self.id, value).await
    }
}

impl<F: Factory> std::ops::Deref for Guard<F> {
    type Target = F::Instance;

    fn deref(&self) -> &Self::Target {
        self.get()
    }
}

impl<F: Factory> std::ops::DerefMut for Guard<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.get_mut()
    }
}

impl<F: Factory> Drop for Guard<F> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            let id = self.id;
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.return_object(id, value).await;
            });
        }
    }
}

impl<F> std::fmt::Debug for Guard<F>
where
    F: Factory,
    F::Instance: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").field("id", &self.id).field("value", &self.value).finish()
    }
}
