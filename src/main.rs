// src/main.rs

//! `kms-display [CONFIG.json]`
//!
//! Opens the configured DRM card, resolves its output and, when built with
//! libgbm, creates the scan-out surface. Useful for checking which connector,
//! mode and controller a machine would be driven with.

use anyhow::Context;
use kms_display::config::Config;
use log::info;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting kms-display...");

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;
    info!("Display settings: {:?}", config.display);

    report_output(&config)
}

#[cfg(has_gbm)]
fn report_output(config: &Config) -> anyhow::Result<()> {
    use kms_display::display::DrmDisplay;

    let settings = &config.display;
    let mut display = DrmDisplay::open_gbm(settings)
        .with_context(|| format!("Failed to open card {}", settings.card_index))?;
    info!(
        "Output: connector {} at {} on controller {}",
        display.connector_id(),
        display.mode(),
        display.crtc_id()
    );

    let surface = display
        .create_framebuffer_surface(settings.pixel_format, settings.usage)
        .context("Failed to create framebuffer surface")?;
    info!(
        "Scan-out surface ready at {:p} ({}, vsync {})",
        surface.as_ptr(),
        settings.pixel_format,
        if settings.vsync { "on" } else { "off" }
    );

    info!("kms-display finished.");
    Ok(())
}

#[cfg(not(has_gbm))]
fn report_output(config: &Config) -> anyhow::Result<()> {
    use kms_display::display::Topology;
    use kms_display::os::card::Card;
    use log::warn;

    warn!("Built without libgbm; reporting output topology only");
    let settings = &config.display;
    let card = Card::open(settings.card_index)
        .with_context(|| format!("Failed to open card {}", settings.card_index))?;
    let topology = Topology::resolve(&card)
        .with_context(|| format!("No usable output on {}", card.path().display()))?;
    info!(
        "Output: connector {} at {} on controller {}",
        topology.connector_id(),
        topology.mode(),
        topology.crtc()
    );

    info!("kms-display finished.");
    Ok(())
}
