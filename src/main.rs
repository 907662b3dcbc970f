#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

use anyhow::Result;
use eframe::egui;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod chatapp;
mod chatapp_ui;
mod config;
mod controller;
mod error;
mod llmclient;
mod message;
mod render;

use chatapp::ChatApp;
use config::CompletionConfig;
use llmclient::CompletionClient;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let config = CompletionConfig::from_env();
    let api_key = config::api_key_from_env();
    if api_key.is_none() {
        warn!("{} is not set; every send will fail until it is", config::API_KEY_VAR);
    }
    info!(endpoint = %config.endpoint, model = %config.model, "starting chat window");

    let client = CompletionClient::new(config, api_key);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 640.0])
            .with_title("OpenAI GPT Chat"),
        ..Default::default()
    };

    eframe::run_native(
        "OpenAI GPT Chat",
        options,
        Box::new(move |cc| Box::new(ChatApp::new(cc, client))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))
}
