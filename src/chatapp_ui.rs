use eframe::egui;
use eframe::egui::text::LayoutJob;
use eframe::egui::{Color32, FontId, TextFormat};
use std::time::Duration;

use crate::chatapp::ChatApp;
use crate::controller::ControllerState;
use crate::message::{Message, Sender};

const USER_COLOR: Color32 = Color32::from_rgb(0x00, 0x78, 0xD7);
const ERROR_COLOR: Color32 = Color32::from_rgb(0xC0, 0x20, 0x20);

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Keep polling the worker while a send is outstanding
        if self.controller.state() == ControllerState::Sending {
            ctx.request_repaint_after(Duration::from_millis(16));
        }

        self.process_outcome(ctx);

        egui::TopBottomPanel::top("header").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("OpenAI GPT Chat");
            });
            if let Some(warning) = &self.panel.config_warning {
                ui.colored_label(ERROR_COLOR, warning);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.render_chat(ui);
        });
    }
}

impl ChatApp {
    fn render_chat(&mut self, ui: &mut egui::Ui) {
        let available_height = ui.available_height();
        let input_area_height = 110.0;

        ui.vertical(|ui| {
            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .max_height(available_height - input_area_height)
                .show(ui, |ui| {
                    let transcript = self.controller.transcript();
                    if transcript.is_empty() {
                        ui.label(egui::RichText::new("No messages yet.").weak());
                    }
                    let hint_row = self.retry_hint_row();
                    for (row, message) in transcript.iter().enumerate() {
                        render_message(ui, message, hint_row == Some(row));
                        ui.add_space(6.0);
                    }
                    if std::mem::take(&mut self.panel.scroll_to_bottom) {
                        ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                    }
                });

            ui.add_space(8.0);

            ui.group(|ui| {
                ui.set_min_height(input_area_height - 20.0);
                ui.vertical(|ui| {
                    let input = ui.add_sized(
                        [ui.available_width(), 60.0],
                        egui::TextEdit::multiline(&mut self.panel.input)
                            .interactive(!self.panel.busy)
                            .hint_text("Type a message (Enter to send, Shift+Enter for new line)")
                            .desired_rows(3),
                    );

                    let enter_pressed = input.has_focus()
                        && ui.input(|i| i.key_pressed(egui::Key::Enter) && !i.modifiers.shift);

                    let button = egui::Button::new(self.panel.send_label());
                    let clicked = ui.add_enabled(!self.panel.busy, button).clicked();

                    if clicked || enter_pressed {
                        self.send_message();
                    }
                });
            });
        });
    }
}

fn render_message(ui: &mut egui::Ui, message: &Message, retry_hint: bool) {
    let stamp = message.timestamp().format("%H:%M");
    let header = format!("{} · {}", message.sender().label(), stamp);

    match message.sender() {
        Sender::User => {
            ui.colored_label(USER_COLOR, egui::RichText::new(header).small());
            ui.colored_label(USER_COLOR, message.content());
        }
        Sender::Assistant => {
            ui.label(egui::RichText::new(header).small().weak());
            let job = html_layout_job(message.content(), ui.visuals(), ui.available_width());
            ui.label(job);
        }
        Sender::System => {
            ui.colored_label(ERROR_COLOR, egui::RichText::new(header).small());
            ui.colored_label(ERROR_COLOR, message.content());
            if retry_hint {
                ui.colored_label(ERROR_COLOR, "Click 'Try Again' to resend the message.");
            }
        }
    }
}

#[derive(Default)]
struct InlineStyle {
    bold: usize,
    italic: usize,
    code: usize,
    heading: usize,
    paragraph: usize,
    pre: bool,
}

/// Lays out the subset of HTML the markdown renderer emits.
fn html_layout_job(html: &str, visuals: &egui::Visuals, wrap_width: f32) -> LayoutJob {
    let mut job = LayoutJob::default();
    job.wrap.max_width = wrap_width;

    let mut style = InlineStyle::default();
    let mut rest = html;
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('<') {
            let Some(end) = after.find('>') else {
                append_text(&mut job, &unescape(rest), &style, visuals);
                break;
            };
            apply_tag(&mut job, &after[..end], &mut style, visuals);
            rest = &after[end + 1..];
        } else {
            let end = rest.find('<').unwrap_or(rest.len());
            let text = &rest[..end];
            if style.pre || !text.trim().is_empty() {
                append_text(&mut job, &unescape(text), &style, visuals);
            } else if !text.contains('\n') {
                append_text(&mut job, text, &style, visuals);
            } else if style.paragraph > 0 || style.heading > 0 {
                // Soft line break inside running text
                append_text(&mut job, " ", &style, visuals);
            }
            // Anything else is the newline between two block elements
            rest = &rest[end..];
        }
    }
    job
}

fn apply_tag(job: &mut LayoutJob, tag: &str, style: &mut InlineStyle, visuals: &egui::Visuals) {
    let closing = tag.starts_with('/');
    let name = tag
        .trim_start_matches('/')
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    let adjust = |depth: &mut usize| {
        if closing {
            *depth = depth.saturating_sub(1);
        } else {
            *depth += 1;
        }
    };

    match name.as_str() {
        "strong" | "b" => adjust(&mut style.bold),
        "em" | "i" => adjust(&mut style.italic),
        "code" => adjust(&mut style.code),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            ensure_newline(job, visuals);
            adjust(&mut style.heading);
        }
        "p" => {
            if closing {
                ensure_newline(job, visuals);
            }
            adjust(&mut style.paragraph);
        }
        "pre" => {
            ensure_newline(job, visuals);
            style.pre = !closing;
        }
        "br" => append_text(job, "\n", style, visuals),
        "li" if !closing => {
            ensure_newline(job, visuals);
            append_text(job, "• ", style, visuals);
        }
        "th" => {
            adjust(&mut style.bold);
            if closing {
                append_text(job, "   ", style, visuals);
            }
        }
        "td" if closing => append_text(job, "   ", style, visuals),
        "li" | "tr" | "ul" | "ol" | "table" | "blockquote" if closing => {
            ensure_newline(job, visuals)
        }
        _ => {}
    }
}

fn ensure_newline(job: &mut LayoutJob, visuals: &egui::Visuals) {
    if !job.text.is_empty() && !job.text.ends_with('\n') {
        append_text(job, "\n", &InlineStyle::default(), visuals);
    }
}

fn append_text(job: &mut LayoutJob, text: &str, style: &InlineStyle, visuals: &egui::Visuals) {
    let monospace = style.code > 0 || style.pre;
    let font_id = if monospace {
        FontId::monospace(13.0)
    } else if style.heading > 0 {
        FontId::proportional(18.0)
    } else {
        FontId::proportional(14.0)
    };
    let color = if style.bold > 0 || style.heading > 0 {
        visuals.strong_text_color()
    } else {
        visuals.text_color()
    };
    let background = if monospace {
        visuals.code_bg_color
    } else {
        Color32::TRANSPARENT
    };

    job.append(
        text,
        0.0,
        TextFormat {
            font_id,
            color,
            background,
            italics: style.italic > 0,
            ..Default::default()
        },
    );
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
