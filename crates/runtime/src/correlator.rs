//! Ambient correlation scopes.
//!
//! A correlation id tags every event produced by one logical turn. Scopes
//! are task-local: entering one wraps a future, nested scopes compose as
//! `parent::child`, and the binding is released on every exit path because
//! it lives exactly as long as the wrapped future. Spawned tasks do not
//! inherit the ambient scope — callers hand the composed id across the
//! spawn boundary and re-enter it with [`ContextualCorrelator::enter`].

use std::future::Future;

tokio::task_local! {
    static CORRELATION_SCOPE: String;
}

/// The id reported outside any scope.
pub const MAIN_SCOPE: &str = "<main>";

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextualCorrelator;

impl ContextualCorrelator {
    /// The effective correlation id of the current task.
    pub fn current() -> String {
        CORRELATION_SCOPE
            .try_with(Clone::clone)
            .unwrap_or_else(|_| MAIN_SCOPE.to_owned())
    }

    /// Compose `value` onto the ambient scope without entering it — the id
    /// a child scope entered here would carry.
    pub fn compose(value: &str) -> String {
        match CORRELATION_SCOPE.try_with(Clone::clone) {
            Ok(parent) => format!("{parent}::{value}"),
            Err(_) => value.to_owned(),
        }
    }

    /// Run `fut` inside a child scope of the ambient one.
    pub async fn scope<F: Future>(value: impl Into<String>, fut: F) -> F::Output {
        let effective = Self::compose(&value.into());
        CORRELATION_SCOPE.scope(effective, fut).await
    }

    /// Run `fut` under an already-composed correlation id, ignoring any
    /// ambient scope. Used when crossing a spawn boundary.
    pub async fn enter<F: Future>(correlation_id: impl Into<String>, fut: F) -> F::Output {
        CORRELATION_SCOPE.scope(correlation_id.into(), fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_is_main() {
        assert_eq!(ContextualCorrelator::current(), MAIN_SCOPE);
    }

    #[tokio::test]
    async fn scope_binds_and_releases() {
        ContextualCorrelator::scope("RID(abc)", async {
            assert_eq!(ContextualCorrelator::current(), "RID(abc)");
        })
        .await;
        assert_eq!(ContextualCorrelator::current(), MAIN_SCOPE);
    }

    #[tokio::test]
    async fn nested_scopes_compose() {
        ContextualCorrelator::scope("RID(abc)", async {
            ContextualCorrelator::scope("u9ysV1pbcd", async {
                assert_eq!(ContextualCorrelator::current(), "RID(abc)::u9ysV1pbcd");
            })
            .await;
            // Inner binding released, outer restored.
            assert_eq!(ContextualCorrelator::current(), "RID(abc)");
        })
        .await;
    }

    #[tokio::test]
    async fn compose_without_entering() {
        assert_eq!(ContextualCorrelator::compose("x"), "x");
        ContextualCorrelator::scope("parent", async {
            assert_eq!(ContextualCorrelator::compose("child"), "parent::child");
            // Composing does not change the ambient scope.
            assert_eq!(ContextualCorrelator::current(), "parent");
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_tasks_have_independent_scopes() {
        let a = tokio::spawn(ContextualCorrelator::scope("task-a", async {
            tokio::task::yield_now().await;
            ContextualCorrelator::current()
        }));
        let b = tokio::spawn(ContextualCorrelator::scope("task-b", async {
            tokio::task::yield_now().await;
            ContextualCorrelator::current()
        }));

        assert_eq!(a.await.unwrap(), "task-a");
        assert_eq!(b.await.unwrap(), "task-b");
    }

    #[tokio::test]
    async fn spawned_tasks_do_not_inherit() {
        let observed = ContextualCorrelator::scope("outer", async {
            tokio::spawn(async { ContextualCorrelator::current() })
                .await
                .unwrap()
        })
        .await;
        assert_eq!(observed, MAIN_SCOPE);
    }

    #[tokio::test]
    async fn enter_uses_the_exact_id() {
        ContextualCorrelator::scope("ambient", async {
            ContextualCorrelator::enter("RID(x)::y", async {
                assert_eq!(ContextualCorrelator::current(), "RID(x)::y");
            })
            .await;
        })
        .await;
    }
}
