use eframe::egui;
use std::sync::Arc;

use crate::config::API_KEY_VAR;
use crate::controller::{ChatView, SendController};
use crate::llmclient::CompletionClient;
use crate::message::{Message, Sender};

/// Window-side state the controller drives through [`ChatView`]. The messages
/// themselves are read from the controller's transcript.
#[derive(Default)]
pub struct ChatPanel {
    pub input: String,
    pub busy: bool,
    pub retry: bool,
    pub config_warning: Option<String>,
    pub scroll_to_bottom: bool,
}

impl ChatPanel {
    pub fn send_label(&self) -> &'static str {
        if self.busy {
            "Sending..."
        } else if self.retry {
            "Try Again"
        } else {
            "Send"
        }
    }
}

impl ChatView for ChatPanel {
    fn append_message(&mut self, _message: &Message) {
        self.scroll_to_bottom = true;
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    fn set_retry_affordance(&mut self, retry: bool) {
        self.retry = retry;
    }

    fn clear_input(&mut self) {
        self.input.clear();
    }

    fn read_input_trimmed(&self) -> String {
        self.input.trim().to_string()
    }
}

pub struct ChatApp {
    pub controller: SendController,
    pub panel: ChatPanel,
}

impl ChatApp {
    pub fn new(cc: &eframe::CreationContext<'_>, client: CompletionClient) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::light());
        Self::with_client(client)
    }

    fn with_client(client: CompletionClient) -> Self {
        let config_warning = (!client.has_credential())
            .then(|| format!("{API_KEY_VAR} is not set; messages cannot be sent."));

        Self {
            controller: SendController::new(Arc::new(client)),
            panel: ChatPanel {
                config_warning,
                ..Default::default()
            },
        }
    }

    pub fn send_message(&mut self) {
        self.controller.submit_from_view(&mut self.panel);
    }

    pub fn process_outcome(&mut self, ctx: &egui::Context) {
        if self.controller.poll(&mut self.panel) {
            ctx.request_repaint();
        }
    }

    /// Index of the transcript row that gets the "Try Again" hint: the
    /// latest failure, and only while a retry is on offer.
    pub fn retry_hint_row(&self) -> Option<usize> {
        if !self.panel.retry {
            return None;
        }
        let transcript = self.controller.transcript();
        let last = transcript.len().checked_sub(1)?;
        (transcript.last()?.sender() == Sender::System).then_some(last)
    }
}
