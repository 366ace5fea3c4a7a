//! The handler contract the Router fans out to.

use async_trait::async_trait;

/// One in-process subscriber to a channel. Handlers are independent: a
/// handler that returns `Err` is logged and does not affect its siblings
/// (§4.2's "collecting exceptions without unwinding others").
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, payload: &str) -> anyhow::Result<()>;

    /// Name used in dispatch logs.
    fn name(&self) -> &str;
}

/// Adapts a plain async closure into a [`Handler`], for tests and small
/// inline registrations.
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self { name: name.into(), func }
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: &str) -> anyhow::Result<()> {
        (self.func)(payload.to_string()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
