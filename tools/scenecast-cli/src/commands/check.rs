//! Check system capabilities.

use scenecast_platform_linux::{detect_display_server, DisplayServer};

pub fn run() -> anyhow::Result<()> {
    println!("SceneCast System Check");
    println!("{}", "=".repeat(50));

    // Display server
    match detect_display_server() {
        DisplayServer::X11 => println!("[OK] Display server: X11"),
        DisplayServer::Wayland => {
            println!("[WARN] Display server: Wayland (capture goes through XWayland)")
        }
        DisplayServer::Unknown => println!("[WARN] Display server: Unknown"),
    }

    // Check monitors
    match scenecast_platform_linux::detect_monitors() {
        Ok(monitors) => {
            println!("[OK] Monitors detected: {}", monitors.len());
            for m in &monitors {
                println!(
                    "     {} {}x{}+{}+{} {}",
                    m.name,
                    m.width,
                    m.height,
                    m.x,
                    m.y,
                    if m.primary { "(primary)" } else { "" }
                );
            }
        }
        Err(e) => println!("[WARN] Monitor detection failed: {e}"),
    }

    let capabilities = scenecast_platform_linux::permissions::check_capabilities();
    println!();
    scenecast_platform_linux::permissions::print_capability_report(&capabilities);

    println!();
    if scenecast_platform_linux::permissions::all_required_available(&capabilities) {
        println!("All required capabilities are available. SceneCast is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }

    Ok(())
}
