use eframe::egui;
use std::error::Error;

mod app;

use app::SeqGifApp;

fn main() -> Result<(), Box<dyn Error>> {
    // Log to stderr (raise with `RUST_LOG=debug`).
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let runtime = tokio::runtime::Runtime::new()?;
    let app = SeqGifApp::new(runtime, seqgif::Settings::load());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([560.0, 720.0])
            .with_min_inner_size([420.0, 520.0])
            .with_drag_and_drop(true),
        ..Default::default()
    };

    eframe::run_native(
        "PNG Sequence to GIF",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
    .map_err(|e| e.to_string())?;
    Ok(())
}
