//! Core LlmClient trait

use async_trait::async_trait;

use crate::Result;
use crate::providers::traits::ResponseText;

/// The client surface the agent runtime talks to.
///
/// Same shape as a raw model call plus an optional `caller` tag naming the
/// pipeline stage that issued it. The tag is for observability only and is
/// never sent to the model. Implemented by
/// [`TimingClient`](crate::providers::TimingClient) and
/// [`CachingClient`](crate::providers::CachingClient), which stack freely.
#[async_trait]
pub trait LlmClient: Send + Sync {
    type Output: ResponseText;

    /// Model identifier of the underlying client.
    fn model(&self) -> &str;

    /// Sampling temperature of the underlying client.
    fn temperature(&self) -> f64;

    /// Invoke the model.
    async fn call(&self, prompt: &str, caller: Option<&str>) -> Result<Self::Output>;

    /// Generate-style invocation. Same semantics as [`call`](Self::call).
    async fn generate(&self, prompt: &str, caller: Option<&str>) -> Result<Self::Output>;
}
