//! The user-supplied object lifecycle.

use crate::error::Result;

/// Creates, validates and destroys the instances a [`crate::Pool`] manages.
///
/// Mirrors the `create`/`is_valid`/`recycle`/`cleanup` hooks a bb8- or
/// r2d2-style manager trait exposes, split into the finer-grained
/// `activate`/`passivate`/`validate` steps Commons Pool2 uses so a factory
/// can distinguish "prepare for use" from "prepare for idling" from "is
/// this still good".
pub trait Factory: Send + Sync + 'static {
    /// The pooled value.
    type Instance: Send + 'static;

    /// Creates a brand-new instance.
    fn make(&self) -> impl Future<Output = Result<Self::Instance>> + Send;

    /// Destroys an instance permanently. Errors here are swallowed by the
    /// pool everywhere except [`crate::Guard::invalidate`], which
    /// propagates them.
    fn destroy(&self, instance: Self::Instance) -> impl Future<Output = Result<()>> + Send {
        async move {
            drop(instance);
            Ok(())
        }
    }

    /// Returns `true` if `instance` is still usable. Called before handing
    /// an idle object to a borrower (`test_on_borrow`), before accepting a
    /// returned object back into the idle set (`test_on_return`), and by
    /// the evictor (`test_while_idle`).
    fn validate(&self, instance: &Self::Instance) -> impl Future<Output = bool> + Send {
        async move {
            let _ = instance;
            true
        }
    }

    /// Prepares an instance for use by a borrower.
    fn activate(&self, instance: &mut Self::Instance) -> impl Future<Output = Result<()>> + Send {
        async move {
            let _ = instance;
            Ok(())
        }
    }

    /// Prepares an instance to sit idle (e.g. resetting transient state).
    fn passivate(&self, instance: &mut Self::Instance) -> impl Future<Output = Result<()>> + Send {
        async move {
            let _ = instance;
            Ok(())
        }
    }
}
