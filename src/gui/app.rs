use eframe::egui;
use log::warn;
use rfd::FileDialog;
use std::path::PathBuf;
use std::time::Duration;

use seqgif::analysis::collect_frame_paths;
use seqgif::encoder::install_hint;
use seqgif::job::{FRAMERATE_RANGE, WIDTH_RANGE};
use seqgif::{
    ConversionError, ConversionParams, EncoderInfo, FfmpegEncoder, JobSnapshot, JobState,
    RunningConversion, SequenceAnalysis, Session, Settings,
};

const GUI_WIDTH_MAX: u32 = 2048;

enum Message {
    Success(String),
    Error(String),
}

pub struct SeqGifApp {
    runtime: tokio::runtime::Runtime,
    settings: Settings,
    session: Session<FfmpegEncoder>,
    encoder: EncoderInfo,
    analysis: Option<SequenceAnalysis>,
    framerate: u32,
    width: u32,
    loop_forever: bool,
    output_path: String,
    running: Option<RunningConversion>,
    snapshot: Option<JobSnapshot>,
    message: Option<Message>,
}

impl SeqGifApp {
    pub fn new(runtime: tokio::runtime::Runtime, settings: Settings) -> Self {
        let session = Session::from_settings(&settings);
        let encoder = session.encoder_info();
        if !encoder.installed {
            warn!("ffmpeg not found: {}", install_hint());
        }
        let defaults = settings.defaults.clone();
        Self {
            runtime,
            session,
            encoder,
            analysis: None,
            framerate: defaults
                .framerate
                .clamp(*FRAMERATE_RANGE.start(), *FRAMERATE_RANGE.end()),
            width: defaults.width.clamp(*WIDTH_RANGE.start(), GUI_WIDTH_MAX),
            loop_forever: defaults.loop_forever,
            output_path: String::new(),
            running: None,
            snapshot: None,
            message: None,
            settings,
        }
    }

    fn load_paths(&mut self, inputs: Vec<PathBuf>) {
        if self.running.is_some() {
            return;
        }
        self.message = None;
        self.snapshot = None;
        let paths = match collect_frame_paths(self.session.matcher(), inputs) {
            Ok(paths) => paths,
            Err(e) => {
                self.message = Some(Message::Error(format!("Cannot read dropped files: {}", e)));
                return;
            }
        };

        let analysis = self.session.analyze(paths);
        match self.session.descriptor() {
            Some(descriptor) => {
                self.output_path = descriptor
                    .default_output_path(&self.settings.output_extension)
                    .display()
                    .to_string();
            }
            None => {
                if let Some(error) = analysis.error() {
                    self.message = Some(Message::Error(error.to_string()));
                }
            }
        }
        self.analysis = Some(analysis);
    }

    fn reset(&mut self) {
        self.session.reset();
        self.analysis = None;
        self.snapshot = None;
        self.message = None;
        self.output_path.clear();
    }

    fn start_conversion(&mut self) {
        let params = ConversionParams {
            framerate: self.framerate,
            width: self.width,
            loop_forever: self.loop_forever,
            output_path: PathBuf::from(self.output_path.trim()),
        };

        self.settings.defaults.framerate = self.framerate;
        self.settings.defaults.width = self.width;
        self.settings.defaults.loop_forever = self.loop_forever;
        if let Err(e) = self.settings.save() {
            warn!("Could not save settings: {}", e);
        }

        let _enter = self.runtime.enter();
        match self.session.start_conversion(params) {
            Ok(running) => {
                self.message = None;
                self.snapshot = Some(running.handle().snapshot());
                self.running = Some(running);
            }
            Err(e) => self.message = Some(Message::Error(e.to_string())),
        }
    }

    /// Pull the latest snapshot and collect the result once the job is done.
    fn poll_job(&mut self, ctx: &egui::Context) {
        let Some(running) = &self.running else {
            return;
        };
        self.snapshot = Some(running.handle().snapshot());

        if !running.is_finished() {
            ctx.request_repaint_after(Duration::from_millis(100));
            return;
        }
        let Some(running) = self.running.take() else {
            return;
        };
        let snapshot = self.runtime.block_on(running.wait());
        self.message = match &snapshot.outcome {
            Some(Ok(path)) => Some(Message::Success(format!("GIF created: {}", path.display()))),
            Some(Err(ConversionError::Cancelled)) => Some(Message::Error("Conversion cancelled".to_string())),
            Some(Err(e)) => Some(Message::Error(e.to_string())),
            None => None,
        };
        self.snapshot = Some(snapshot);
    }

    fn show_encoder_banner(&self, ui: &mut egui::Ui) {
        if self.encoder.installed {
            let version = self.encoder.version.as_deref().unwrap_or("ffmpeg");
            ui.label(egui::RichText::new(format!("✔ {}", version)).color(egui::Color32::GREEN));
        } else {
            ui.colored_label(egui::Color32::RED, "ffmpeg not found");
            ui.label(install_hint());
        }
    }

    fn show_drop_zone(&mut self, ui: &mut egui::Ui) {
        let enabled = self.encoder.installed && self.running.is_none();
        ui.group(|ui| {
            ui.set_min_height(90.0);
            ui.vertical_centered(|ui| {
                ui.add_space(12.0);
                if enabled {
                    ui.heading("Drop PNG frames here");
                } else {
                    ui.heading(egui::RichText::new("Drop PNG frames here").weak());
                }
                ui.horizontal(|ui| {
                    if ui.add_enabled(enabled, egui::Button::new("📂 Choose Files...")).clicked() {
                        if let Some(files) = FileDialog::new()
                            .add_filter("PNG images", &[self.session.matcher().extension()])
                            .pick_files()
                        {
                            self.load_paths(files);
                        }
                    }
                    if ui.add_enabled(enabled, egui::Button::new("📁 Choose Folder...")).clicked() {
                        if let Some(folder) = FileDialog::new().pick_folder() {
                            self.load_paths(vec![folder]);
                        }
                    }
                });
            });
        });
    }

    fn show_sequence(&mut self, ui: &mut egui::Ui) {
        let Some(SequenceAnalysis::Valid {
            pattern,
            frame_count,
            start_number,
            directory,
            ..
        }) = &self.analysis
        else {
            return;
        };

        ui.heading("Sequence");
        egui::Grid::new("sequence_info").num_columns(2).show(ui, |ui| {
            ui.label("Pattern:");
            ui.label(pattern.as_str());
            ui.end_row();
            ui.label("Frames:");
            ui.label(frame_count.to_string());
            ui.end_row();
            ui.label("Starts at:");
            ui.label(start_number.to_string());
            ui.end_row();
            ui.label("Folder:");
            ui.label(directory.as_str());
            ui.end_row();
        });

        if let Some(descriptor) = self.session.descriptor() {
            let skipped = descriptor.skipped_count();
            if skipped > 0 {
                ui.label(
                    egui::RichText::new(format!("{} frame number(s) missing, frames play in order", skipped))
                        .color(egui::Color32::YELLOW),
                );
            }
        }

        if ui.add_enabled(self.running.is_none(), egui::Button::new("Clear")).clicked() {
            self.reset();
        }
    }

    fn show_settings(&mut self, ui: &mut egui::Ui) {
        let idle = self.running.is_none();
        ui.heading("Settings");
        ui.add_enabled(
            idle,
            egui::Slider::new(&mut self.framerate, FRAMERATE_RANGE).text("fps"),
        );
        ui.add_enabled(
            idle,
            egui::Slider::new(&mut self.width, *WIDTH_RANGE.start()..=GUI_WIDTH_MAX).text("px wide"),
        );
        ui.add_enabled(idle, egui::Checkbox::new(&mut self.loop_forever, "Loop forever"));

        ui.horizontal(|ui| {
            ui.label("Output:");
            ui.add_enabled(idle, egui::TextEdit::singleline(&mut self.output_path));
            if ui.add_enabled(idle, egui::Button::new("Browse...")).clicked() {
                let mut dialog = FileDialog::new().add_filter("GIF", &[self.settings.output_extension.as_str()]);
                let current = PathBuf::from(self.output_path.trim());
                if let Some(dir) = current.parent().filter(|dir| dir.is_dir()) {
                    dialog = dialog.set_directory(dir);
                }
                if let Some(name) = current.file_name() {
                    dialog = dialog.set_file_name(name.to_string_lossy());
                }
                if let Some(path) = dialog.save_file() {
                    self.output_path = path.display().to_string();
                }
            }
        });
    }

    fn show_actions(&mut self, ui: &mut egui::Ui) {
        let can_convert = self.encoder.installed
            && self.running.is_none()
            && self.session.descriptor().is_some()
            && !self.output_path.trim().is_empty();

        ui.horizontal(|ui| {
            if ui.add_enabled(can_convert, egui::Button::new("Convert to GIF")).clicked() {
                self.start_conversion();
            }
            if let Some(running) = &self.running {
                let cancelling = running.handle().is_cancel_requested();
                if ui.add_enabled(!cancelling, egui::Button::new("Cancel")).clicked() {
                    running.cancel();
                }
            }
        });

        if let Some(snapshot) = &self.snapshot {
            let total = self.session.descriptor().map_or(0, |d| d.frame_count());
            match snapshot.state {
                JobState::Validating | JobState::Running => {
                    let frame = snapshot.progress.map_or(0, |p| p.frame_index);
                    let percent = snapshot.percent();
                    ui.add(
                        egui::ProgressBar::new(percent / 100.0)
                            .text(format!("Frame {} / {} ({:.0}%)", frame, total, percent)),
                    );
                }
                JobState::Idle | JobState::Succeeded | JobState::Failed => {}
            }
        }

        match &self.message {
            Some(Message::Success(text)) => {
                ui.colored_label(egui::Color32::GREEN, text);
            }
            Some(Message::Error(text)) => {
                ui.colored_label(egui::Color32::RED, text);
            }
            None => {}
        }
    }
}

impl eframe::App for SeqGifApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_job(ctx);

        let dropped: Vec<PathBuf> = ctx.input(|i| {
            i.raw
                .dropped_files
                .iter()
                .filter_map(|file| file.path.clone())
                .collect()
        });
        if !dropped.is_empty() && self.encoder.installed {
            self.load_paths(dropped);
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("PNG Sequence to GIF");
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    self.show_encoder_banner(ui);
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_drop_zone(ui);
            ui.separator();
            self.show_sequence(ui);
            ui.separator();
            self.show_settings(ui);
            ui.separator();
            self.show_actions(ui);
        });
    }
}
