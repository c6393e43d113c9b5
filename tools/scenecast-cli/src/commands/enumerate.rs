//! Window and display enumeration.

use scenecast_capture_engine::CaptureSource;
use scenecast_common::config::AppConfig;

pub fn windows(config: &AppConfig) -> anyhow::Result<()> {
    let titles = CaptureSource::x11(&config.capture).get_available_windows();
    if titles.is_empty() {
        println!("No capturable windows found.");
        return Ok(());
    }
    println!("Capturable windows ({}):", titles.len());
    for title in titles {
        println!("  {title}");
    }
    Ok(())
}

pub fn displays(config: &AppConfig) -> anyhow::Result<()> {
    let displays = CaptureSource::x11(&config.capture).get_available_displays();
    if displays.is_empty() {
        println!("No displays detected.");
        return Ok(());
    }
    println!("Displays ({}):", displays.len());
    for d in &displays {
        println!(
            "  [{}] {} {}x{}+{}+{} {}",
            d.id,
            d.name,
            d.width,
            d.height,
            d.x,
            d.y,
            if d.primary { "(primary)" } else { "" }
        );
    }
    Ok(())
}
