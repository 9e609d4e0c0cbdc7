use std::sync::Arc;

use serde_json::{Value, json};
use tracing::Instrument;
use turnstile_model::{
    AssistantMessage, ModelMessage, ToolCallKind, ToolCallRequest,
};

use super::{Agent, TranscriptSource};
use crate::Error;
use crate::tool::Error as ToolError;

/// The stages of the tool-calling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopStage {
    /// Waiting for the model to answer.
    AwaitingModel,
    /// Running the tool calls of the last assistant turn.
    DispatchingTools,
    /// The model gave its final answer.
    Done,
    /// The iteration budget ran out.
    Exhausted,
}

/// The result of running the loop for one user input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    /// The final answer, possibly empty.
    pub answer: String,
    /// The terminal stage, either [`LoopStage::Done`] or
    /// [`LoopStage::Exhausted`].
    pub stage: LoopStage,
    /// How many model calls were made.
    pub iterations: usize,
}

impl Agent {
    /// Runs the tool-calling loop for one user input.
    ///
    /// The input goes through augmentation first and is appended as a user
    /// turn. Blank input ends the run right away with an empty answer and
    /// no model call. Each iteration makes one model call; tool calls of
    /// the answer are executed in order and answered with exactly one tool
    /// turn each before the next call.
    ///
    /// A failed model call ends the run with an error. Tool failures never
    /// do, they are reported to the model instead.
    pub async fn run(&mut self, input: &str) -> Result<TurnOutcome, Error> {
        if input.trim().is_empty() {
            debug!("ignoring blank input");
            return Ok(TurnOutcome {
                answer: String::new(),
                stage: LoopStage::Done,
                iterations: 0,
            });
        }

        let mut pending_input = Some(self.augmenter.augment(input).await);
        let mut stage = LoopStage::AwaitingModel;
        let mut iterations = 0;
        let mut last_text = String::new();
        let mut tool_calls = vec![];

        loop {
            trace!("loop stage: {stage:?}, iteration: {iterations}");
            match stage {
                LoopStage::AwaitingModel => {
                    iterations += 1;
                    if let Some(text) = pending_input.take() {
                        if !text.is_empty() {
                            self.emit_transcript(input, TranscriptSource::User);
                            self.conversation.push(ModelMessage::user(text));
                        }
                    }

                    let msg = self.call_model().await?;
                    let text = msg.content_or_empty().to_owned();
                    if !text.is_empty() {
                        last_text.clone_from(&text);
                    }
                    tool_calls.clone_from(&msg.tool_calls);
                    self.conversation.push(ModelMessage::Assistant(msg));

                    if !tool_calls.is_empty() {
                        stage = LoopStage::DispatchingTools;
                    } else {
                        if text.is_empty() {
                            warn!("the model returned neither text nor tools");
                        }
                        last_text = text;
                        stage = LoopStage::Done;
                    }
                }
                LoopStage::DispatchingTools => {
                    for call in tool_calls.drain(..) {
                        self.dispatch_tool_call(call).await;
                    }
                    if iterations < self.max_iterations {
                        stage = LoopStage::AwaitingModel;
                    } else {
                        stage = LoopStage::Exhausted;
                    }
                }
                LoopStage::Done => break,
                LoopStage::Exhausted => {
                    let max_iterations = self.max_iterations;
                    warn!("iteration budget of {max_iterations} exhausted");
                    break;
                }
            }
        }

        Ok(TurnOutcome {
            answer: last_text,
            stage,
            iterations,
        })
    }

    async fn call_model(&self) -> Result<AssistantMessage, Error> {
        let req = self.conversation.to_request(self.registry.definitions());
        let on_transcript = self.on_transcript.as_ref().map(Arc::clone);
        self.model_client
            .send_request(req, move |delta| {
                if let Some(on_transcript) = &on_transcript {
                    on_transcript(delta, TranscriptSource::Assistant);
                }
            })
            .await
    }

    /// Executes one tool call and appends its tool turn. Every path ends
    /// with exactly one tool turn carrying the call id.
    async fn dispatch_tool_call(&mut self, call: ToolCallRequest) {
        let content = match &call.kind {
            ToolCallKind::Function => {
                self.emit_transcript(
                    &format!("{}({})", call.name, call.arguments),
                    TranscriptSource::Tool,
                );
                match self.invoke_tool(&call).await {
                    Ok(value) => serde_json::to_string(&value)
                        .unwrap_or_else(|err| error_payload(&err.to_string())),
                    Err(err) => {
                        debug!("tool call {} failed: {err}", call.id);
                        error_payload(&err.to_string())
                    }
                }
            }
            ToolCallKind::Unrecognized(kind) => {
                let id = &call.id;
                warn!("skipping tool call {id} of unsupported type {kind}");
                error_payload(&format!("unsupported tool call type: {kind}"))
            }
        };
        self.emit_transcript(&content, TranscriptSource::Tool);
        self.conversation.push(ModelMessage::tool(call.id, content));
    }

    async fn invoke_tool(
        &self,
        call: &ToolCallRequest,
    ) -> Result<Value, ToolError> {
        let arguments = parse_arguments(&call.arguments)?;
        self.registry
            .invoke(&call.name, arguments)
            .instrument(debug_span!("tool call", id = %call.id))
            .await
    }
}

/// Parses the raw arguments of a tool call. Blank arguments stand for an
/// empty object.
fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(raw).map_err(|err| {
        ToolError::malformed_arguments().with_reason(format!("{err}"))
    })
}

#[inline]
fn error_payload(message: &str) -> String {
    json!({ "error": message }).to_string()
}
