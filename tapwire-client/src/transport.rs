use async_trait::async_trait;
use tapwire_core::{RunAgentInput, SessionUpdate, StateHandle};

use crate::error::ClientError;
use crate::report::RunReport;

/// A way of sending one run request and reading its events.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run `input`, applying state events to `state` and reporting each
    /// session update to `on_update` as it arrives.
    async fn run_with(
        &self,
        input: RunAgentInput,
        state: StateHandle,
        on_update: &mut (dyn for<'u> FnMut(&'u SessionUpdate) + Send),
    ) -> Result<RunReport, ClientError>;

    /// Run `input` without observing updates.
    async fn run(
        &self,
        input: RunAgentInput,
        state: StateHandle,
    ) -> Result<RunReport, ClientError> {
        self.run_with(input, state, &mut |_: &SessionUpdate| {}).await
    }
}
