use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use agent_provider::{
    CancelSignal, MessageRecord, ModelCall, ModelProvider, ProviderError, RequestPart,
};
use session_store::{SessionLogger, SessionStoreError, TurnReport};
use thiserror::Error;
use tracing::{info, warn};

use crate::tools::ShellTool;

/// Upper bound on model calls within one turn.
pub const DEFAULT_MAX_MODEL_CALLS: usize = 16;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] SessionStoreError),

    #[error("turn exceeded {0} model calls without a final answer")]
    TooManyModelCalls(usize),
}

/// What one completed turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Assistant text parts in order, across every model call of the turn.
    pub texts: Vec<String>,
    /// Slots the logger emitted; `None` when the logger rejected the history.
    pub report: Option<TurnReport>,
}

/// Minimal turn loop: request, response, tool returns, until the model stops calling tools.
///
/// The runtime owns the message history and resupplies it in full to the
/// logger after every turn. A turn that fails leaves the history as it was
/// before the turn, so no half-finished model call ever reaches the logger.
pub struct AgentRuntime {
    provider: Arc<dyn ModelProvider>,
    shell: ShellTool,
    logger: SessionLogger,
    history: Vec<MessageRecord>,
    model: String,
    system_prompt: String,
    cancel: CancelSignal,
    max_model_calls: usize,
}

impl AgentRuntime {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        shell: ShellTool,
        logger: SessionLogger,
        system_prompt: impl Into<String>,
    ) -> Self {
        let model = provider.profile().model_id;
        Self {
            provider,
            shell,
            logger,
            history: Vec::new(),
            model,
            system_prompt: system_prompt.into(),
            cancel: Arc::new(AtomicBool::new(false)),
            max_model_calls: DEFAULT_MAX_MODEL_CALLS,
        }
    }

    pub fn with_max_model_calls(mut self, max_model_calls: usize) -> Self {
        self.max_model_calls = max_model_calls.max(1);
        self
    }

    pub fn history(&self) -> &[MessageRecord] {
        &self.history
    }

    pub fn logger(&self) -> &SessionLogger {
        &self.logger
    }

    /// Flag checked by the provider before each model call.
    pub fn cancel_signal(&self) -> CancelSignal {
        Arc::clone(&self.cancel)
    }

    pub fn run_turn(&mut self, prompt: &str) -> Result<TurnOutcome, RuntimeError> {
        self.logger.log_user_input(prompt)?;

        let turn_start = self.history.len();
        let mut parts = Vec::with_capacity(2);
        if self.history.is_empty() {
            parts.push(RequestPart::SystemPrompt {
                content: self.system_prompt.clone(),
            });
        }
        parts.push(RequestPart::UserPrompt {
            content: prompt.to_string(),
        });
        self.history.push(MessageRecord::request(parts));

        if let Err(error) = self.drive_model_calls() {
            warn!(%error, "turn failed; discarding its history");
            self.history.truncate(turn_start);
            return Err(error);
        }

        let report = match self
            .logger
            .log_turn(&self.history, &self.model, &self.system_prompt)
        {
            Ok(report) => Some(report),
            Err(error @ SessionStoreError::HistoryRewritten { .. }) => {
                warn!(%error, "history anomaly; turn not logged");
                None
            }
            Err(error) => return Err(error.into()),
        };

        let texts = self.history[turn_start..]
            .iter()
            .filter_map(MessageRecord::as_response)
            .flat_map(|response| response.texts().map(str::to_string))
            .collect();

        info!(
            history_len = self.history.len(),
            records = self.history.len() - turn_start,
            "turn complete"
        );
        Ok(TurnOutcome { texts, report })
    }

    /// Drops the conversation; the next turn opens with the system prompt again.
    pub fn new_conversation(&mut self) {
        self.history.clear();
        self.logger.reset_history();
    }

    fn drive_model_calls(&mut self) -> Result<(), RuntimeError> {
        for _ in 0..self.max_model_calls {
            let response = self.provider.complete(
                ModelCall {
                    model: &self.model,
                    system_prompt: &self.system_prompt,
                    history: &self.history,
                },
                &self.cancel,
            )?;

            let returns = response
                .tool_calls()
                .map(|call| RequestPart::ToolReturn {
                    tool_call_id: call.tool_call_id.to_string(),
                    tool_name: call.tool_name.to_string(),
                    content: self.shell.execute(call),
                })
                .collect::<Vec<_>>();

            self.history.push(MessageRecord::Response(response));
            if returns.is_empty() {
                return Ok(());
            }
            self.history.push(MessageRecord::request(returns));
        }

        Err(RuntimeError::TooManyModelCalls(self.max_model_calls))
    }
}
