//! Desktop front-end for inspecting and downloading video formats with yt-dlp

// Startup settings
mod config;
// Background fetch/download tasks
mod controller;
// yt-dlp boundary
mod downloader;
// User-facing failure kinds
mod error;
// Candidate format filtering
mod formats;
// Finished downloads and the thumbnail cache
mod history;
// Shared data types and UI messages
mod model;
// Progress parsing and relaying
mod progress;
// Window state and its transitions
mod state;
// Thumbnail decoding for display
mod thumbnail;

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context as _};
use eframe::{egui, App, Frame};
use egui::{Color32, RichText, TextureHandle, TextureOptions, Visuals};
use once_cell::sync::OnceCell;
use rfd::FileDialog;
use tokio::{
    runtime::{Handle, Runtime},
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};
use tracing_subscriber::EnvFilter;

use config::Config;
use controller::Controller;
use downloader::YtDlp;
use history::{format_size, HistoryStore, HttpThumbnailFetcher};
use model::{AppMessage, HistoryRecord};
use state::{AppState, NoticeKind};

// Process-wide Tokio runtime, alive for the whole session
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn main() -> anyhow::Result<()> {
    let config = Config::load();
    init_logging(&config);

    let runtime = RUNTIME
        .get_or_try_init(Runtime::new)
        .context("starting tokio runtime")?
        .handle()
        .clone();

    let (tx, rx) = unbounded_channel();
    let fetcher = HttpThumbnailFetcher::new()?;
    let history = HistoryStore::new(config.thumbnail_dir(), Arc::new(fetcher));
    let extractor = YtDlp::locate(config.ytdlp_path.clone())?;
    tracing::info!(bin = %extractor.bin().display(), "using yt-dlp");

    let app = VidGrabApp {
        state: AppState::new(config.download_folder(), history.clone()),
        controller: Controller::new(runtime.clone(), extractor, history, tx.clone()),
        runtime,
        tx,
        rx,
        thumbnails: HashMap::new(),
        thumbnail_requests: HashSet::new(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 560.0])
            .with_min_inner_size([650.0, 520.0]),
        ..Default::default()
    };
    eframe::run_native(
        "YouTube Downloader",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(app)
        }),
    )
    .map_err(|e| anyhow!("window error: {}", e))
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Window wiring: owns the state and drains background messages each frame.
struct VidGrabApp {
    state: AppState,
    controller: Controller<YtDlp>,
    runtime: Handle,
    /// Used for thumbnail decode results
    tx: UnboundedSender<AppMessage>,
    rx: UnboundedReceiver<AppMessage>,
    /// Textures for cached thumbnails, keyed by file path
    thumbnails: HashMap<PathBuf, TextureHandle>,
    /// Thumbnails already handed to a decode task
    thumbnail_requests: HashSet<PathBuf>,
}

impl App for VidGrabApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_messages(ctx);

        let history = self.state.history.snapshot();
        self.request_thumbnails(ctx, &history);

        // Side panels must be laid out before the central one.
        self.menu_bar(ctx);
        self.history_panel(ctx, &history);
        self.main_panel(ctx);
        self.notice_window(ctx);

        ctx.request_repaint_after(Duration::from_millis(100));
    }
}

impl VidGrabApp {
    fn drain_messages(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                AppMessage::ThumbnailLoaded { path, image } => {
                    let tex = ctx.load_texture(path.to_string_lossy(), image, TextureOptions::default());
                    self.thumbnails.insert(path, tex);
                }
                other => self.state.apply(other),
            }
        }
    }

    fn request_thumbnails(&mut self, ctx: &egui::Context, history: &[HistoryRecord]) {
        for path in history.iter().filter_map(|r| r.thumbnail_path.as_ref()) {
            if self.thumbnails.contains_key(path) || !self.thumbnail_requests.insert(path.clone()) {
                continue;
            }
            let path = path.clone();
            let tx = self.tx.clone();
            let ctx = ctx.clone();
            self.runtime.spawn_blocking(move || {
                if let Some(image) = thumbnail::load_thumbnail(&path) {
                    let _ = tx.send(AppMessage::ThumbnailLoaded { path, image });
                    ctx.request_repaint();
                }
            });
        }
    }

    fn menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Choose Destination Folder").clicked() {
                        ui.close_menu();
                        if let Some(folder) = FileDialog::new()
                            .set_directory(&self.state.download_folder)
                            .pick_folder()
                        {
                            self.state.set_download_folder(folder);
                        }
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
            });
        });
    }

    fn history_panel(&self, ctx: &egui::Context, history: &[HistoryRecord]) {
        egui::SidePanel::right("history_panel")
            .min_width(260.0)
            .show(ctx, |ui| {
                ui.heading("History");
                ui.separator();


                // Oldest first, in the order downloads finished
                egui::ScrollArea::vertical()
                    .auto_shrink([false; 2])
                    .show(ui, |ui| {
                        if history.is_empty() {
                            ui.label(RichText::new("No downloads yet.").weak());
                        }
                        for record in history {
                            // One framed card per finished download
                            ui.group(|ui| {
                                ui.horizontal(|ui| {
                                    // Texture appears once the decode task posts it
                                    let tex = record
                                        .thumbnail_path
                                        .as_ref()
                                        .and_then(|p| self.thumbnails.get(p));
                                    if let Some(tex) = tex {
                                        ui.add(egui::Image::new(tex).max_width(96.0));
                                    }
                                    // Title, size and source next to the thumbnail
                                    ui.vertical(|ui| {
                                        ui.label(RichText::new(&record.title).strong());
                                        ui.label(format_size(record.filesize));
                                        ui.label(RichText::new(&record.url).small().weak());
                                        if ui.button("Open Folder").clicked() {
                                            open_folder(self.state.download_folder.clone());
                                        }
                                    });
                                });
                            });
                        }
                    });
            });
    }

    fn main_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("YouTube Downloader");
            ui.add_space(8.0);

            // Every input is disabled while a fetch or download runs
            let enabled = self.state.controls_enabled();

            // URL input field
            ui.horizontal(|ui| {
                ui.label("YouTube URL:");
                ui.add_enabled(
                    enabled,
                    egui::TextEdit::singleline(&mut self.state.url_input)
                        .desired_width(f32::INFINITY),
                );
            });
            // Current destination, changed through the File menu
            ui.label(
                RichText::new(format!("Saving to {}", self.state.download_folder.display()))
                    .small()
                    .weak(),
            );

            ui.add_space(8.0);
            // Format fetch trigger, with a spinner while it runs
            ui.vertical_centered(|ui| {
                if ui
                    .add_enabled(enabled, egui::Button::new("Get Video Formats"))
                    .clicked()
                {
                    if let Some(url) = self.state.start_fetch() {
                        self.controller.begin_fetch(url);
                    }
                }
                if self.state.fetching {
                    ui.spinner();
                }
            });

            // One button per usable quality
            if !self.state.formats.is_empty() {
                ui.add_space(12.0);
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new("Select quality to download:").strong());
                    ui.add_space(6.0);

                    // Start after the loop; starting borrows the state mutably
                    let mut chosen = None;
                    for (i, format) in self.state.formats.iter().enumerate() {
                        let button = egui::Button::new(format.label()).min_size(egui::vec2(240.0, 0.0));
                        if ui.add_enabled(enabled, button).clicked() {
                            chosen = Some(i);
                        }
                    }
                    if let Some((url, format, folder)) = chosen.and_then(|i| self.state.start_download(i)) {
                        self.controller.begin_download(url, format, folder);
                    }
                });
            }

            // Progress bar only while a download is active
            if let Some(pct) = self.state.progress {
                ui.add_space(12.0);
                ui.add(egui::ProgressBar::new(pct / 100.0).show_percentage());
            }
        });
    }

    fn notice_window(&mut self, ctx: &egui::Context) {
        let Some(notice) = self.state.notice.clone() else {
            return;
        };
        let color = match notice.kind {
            NoticeKind::Info => Color32::LIGHT_BLUE,
            NoticeKind::Success => Color32::LIGHT_GREEN,
            NoticeKind::Error => Color32::LIGHT_RED,
        };

        let mut dismissed = false;
        egui::Window::new(notice.title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(RichText::new(&notice.body).color(color));
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    dismissed = true;
                }
            });
        if dismissed {
            self.state.notice = None;
        }
    }
}

fn open_folder(folder: PathBuf) {
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let opener = "explorer";
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(all(unix, not(target_os = "macos")))]
        let opener = "xdg-open";

        if let Err(e) = std::process::Command::new(opener).arg(&folder).spawn() {
            tracing::warn!(folder = %folder.display(), "cannot open folder: {}", e);
        }
    });
}
