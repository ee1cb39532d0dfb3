// src/bin/clipboard_probe.rs
//! Reads the clipboard once and reports whether it holds an image

use anyhow::Result;
use clipboard_image_saver::{ClipboardSource, SystemClipboard};

fn main() -> Result<()> {
    println!("🔎 CLIPBOARD IMAGE PROBE");
    println!("=======================");

    match SystemClipboard::new().read_image()? {
        Some(image) => {
            println!("✅ Clipboard holds a {}", image);
            println!("   RGBA bytes: {}", image.bytes.len());
        }
        None => println!("📋 Clipboard does not contain an image"),
    }

    Ok(())
}
