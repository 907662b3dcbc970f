use poll_promise::Promise;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llmclient::Completer;
use crate::message::{Message, SendOutcome, SendRequest, Sender, Transcript};

/// Callbacks the controller drives. Implemented by the window.
pub trait ChatView {
    fn append_message(&mut self, message: &Message);
    fn set_busy(&mut self, busy: bool);
    fn set_retry_affordance(&mut self, retry: bool);
    fn clear_input(&mut self);
    fn read_input_trimmed(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    Sending,
    /// Ready to resend; otherwise behaves like `Idle`.
    Failed,
}

struct InFlight {
    request: SendRequest,
    outcome: Promise<SendOutcome>,
}

/// Owns the send lifecycle: at most one request in flight, every outcome
/// turned into a transcript entry and view updates.
///
/// All methods run on the thread that owns the view. The network call runs
/// on a dedicated worker thread per submit; its result only comes back
/// through [`SendController::poll`].
pub struct SendController {
    completer: Arc<dyn Completer>,
    state: ControllerState,
    transcript: Transcript,
    in_flight: Option<InFlight>,
}

impl SendController {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self {
            completer,
            state: ControllerState::Idle,
            transcript: Transcript::default(),
            in_flight: None,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_sending(&self) -> bool {
        self.state == ControllerState::Sending
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn submit_from_view(&mut self, view: &mut dyn ChatView) -> bool {
        let text = view.read_input_trimmed();
        self.submit(&text, view)
    }

    /// Starts a send. Returns `false` without touching anything when the text
    /// is blank or a send is already outstanding.
    pub fn submit(&mut self, text: &str, view: &mut dyn ChatView) -> bool {
        let prompt = text.trim();
        if prompt.is_empty() {
            debug!("ignoring blank submit");
            return false;
        }
        if self.is_sending() {
            debug!("ignoring submit while a request is outstanding");
            return false;
        }

        let request = SendRequest::new(prompt);
        let message = self.transcript.push(Message::new(Sender::User, prompt));
        view.append_message(message);
        view.set_busy(true);
        view.set_retry_affordance(false);

        let completer = Arc::clone(&self.completer);
        let worker_prompt = request.prompt.clone();
        let outcome = Promise::spawn_thread("completion", move || {
            run_completion(completer.as_ref(), &worker_prompt)
        });

        debug!(chars = prompt.len(), "dispatched completion request");
        self.in_flight = Some(InFlight { request, outcome });
        self.state = ControllerState::Sending;
        true
    }

    /// Applies the worker's outcome if it has arrived. Never blocks.
    pub fn poll(&mut self, view: &mut dyn ChatView) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };

        match in_flight.outcome.try_take() {
            Ok(outcome) => {
                info!(
                    elapsed_ms = in_flight.request.submitted_at.elapsed().as_millis() as u64,
                    success = outcome.is_success(),
                    "completion resolved"
                );
                self.apply_outcome(outcome, view);
                true
            }
            Err(outcome) => {
                self.in_flight = Some(InFlight {
                    request: in_flight.request,
                    outcome,
                });
                false
            }
        }
    }

    fn apply_outcome(&mut self, outcome: SendOutcome, view: &mut dyn ChatView) {
        match outcome {
            SendOutcome::Success { rendered_html } => {
                let message = self
                    .transcript
                    .push(Message::new(Sender::Assistant, rendered_html));
                view.append_message(message);
                view.set_busy(false);
                view.clear_input();
                view.set_retry_affordance(false);
                self.state = ControllerState::Idle;
            }
            SendOutcome::Failure {
                error_message,
                retryable,
            } => {
                let message = self
                    .transcript
                    .push(Message::new(Sender::System, format!("Error: {error_message}")));
                view.append_message(message);
                view.set_busy(false);
                view.set_retry_affordance(true);
                self.state = ControllerState::Failed;
                debug!(retryable, "send failed; input kept for retry");
            }
        }
    }
}

/// Worker body. Panics and runtime setup errors become failures so the
/// promise always resolves.
fn run_completion(completer: &dyn Completer, prompt: &str) -> SendOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        match runtime {
            Ok(rt) => rt.block_on(completer.complete(prompt)),
            Err(e) => SendOutcome::Failure {
                error_message: format!("Failed to start network worker: {e}"),
                retryable: true,
            },
        }
    }));

    result.unwrap_or_else(|payload| {
        let reason = panic_message(payload.as_ref());
        warn!("completion worker panicked: {reason}");
        SendOutcome::Failure {
            error_message: format!("Internal error: {reason}"),
            retryable: true,
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
