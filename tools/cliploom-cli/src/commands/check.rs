//! Check the media host for the elements rendering needs.

#[cfg(feature = "gstreamer")]
pub fn run() -> anyhow::Result<()> {
    use cliploom_capture_engine::backend::gst::REQUIRED_ELEMENTS as ENCODE_ELEMENTS;
    use cliploom_capture_engine::pipeline::{init_gstreamer, missing_elements};
    use cliploom_render_engine::source::gst::REQUIRED_ELEMENTS as DECODE_ELEMENTS;

    println!("Cliploom System Check");
    println!("{}", "=".repeat(50));

    if let Err(e) = init_gstreamer() {
        println!("[FAIL] GStreamer: {e}");
        println!();
        println!("Install GStreamer 1.x to render real media, or use --dry-run.");
        return Ok(());
    }
    println!("[OK] GStreamer initialized");

    let mut all_ok = true;
    for (label, elements) in [("Decode", DECODE_ELEMENTS), ("Capture", ENCODE_ELEMENTS)] {
        let missing = missing_elements(elements);
        if missing.is_empty() {
            println!("[OK] {label}: {} elements available", elements.len());
        } else {
            all_ok = false;
            println!("[MISSING] {label}: {}", missing.join(", "));
        }
    }

    println!();
    if all_ok {
        println!("All required elements are available. Cliploom is ready.");
    } else {
        println!("Some elements are missing. Install the gst-plugins-base/good packages.");
    }
    Ok(())
}

#[cfg(not(feature = "gstreamer"))]
pub fn run() -> anyhow::Result<()> {
    println!("Cliploom System Check");
    println!("{}", "=".repeat(50));
    println!("[WARN] Built without GStreamer: renders use synthetic sources and raw dumps.");
    Ok(())
}
