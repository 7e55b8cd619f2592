use base64::Engine as _;
use image::{DynamicImage, GenericImageView};

use crate::error::{Error, Result};
use crate::printer::Printer;

/// How images are drawn on this terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProtocol {
    /// Kitty graphics protocol (chunked base64 PNG).
    Kitty,
    /// iTerm2 inline images (OSC 1337).
    Iterm2,
    /// Unicode half-block cells with 24-bit color.
    HalfBlock,
}

/// Pick the protocol from the environment: Kitty and iTerm2 advertise
/// themselves; everything else gets the half-block fallback.
pub fn detect_protocol() -> ImageProtocol {
    let env = |name: &str| std::env::var(name).unwrap_or_default();
    if !env("KITTY_WINDOW_ID").is_empty() || env("TERM").contains("kitty") {
        ImageProtocol::Kitty
    } else if env("TERM_PROGRAM") == "iTerm.app" || env("LC_TERMINAL") == "iTerm2" {
        ImageProtocol::Iterm2
    } else {
        ImageProtocol::HalfBlock
    }
}

/// Render an image payload to the terminal.
///
/// The full body must be buffered first; image formats are not streamable.
/// With color off the cell fallback would be unreadable, so a one-line
/// summary stands in for the pixels.
pub fn render(bytes: &[u8], p: &mut Printer) -> Result<()> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::Format(format!("decoding image: {e}")))?;

    match detect_protocol() {
        ImageProtocol::Kitty => render_kitty(&img, p),
        ImageProtocol::Iterm2 => render_iterm2(bytes, p),
        ImageProtocol::HalfBlock => {
            if !p.color_enabled() {
                let (w, h) = img.dimensions();
                p.write_str(&format!("[image {w}x{h}]\n"));
                return Ok(());
            }
            render_half_block(&img, p)
        }
    }
}

// -- Kitty --------------------------------------------------------------------

/// Kitty chunk size: the protocol caps each escape payload at 4096 bytes of
/// base64 data.
const KITTY_CHUNK: usize = 4096;

fn render_kitty(img: &DynamicImage, p: &mut Printer) -> Result<()> {
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| Error::Format(format!("re-encoding image: {e}")))?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let chunks: Vec<&str> = encoded
        .as_bytes()
        .chunks(KITTY_CHUNK)
        .map(|c| std::str::from_utf8(c).expect("base64 is ASCII"))
        .collect();
    for (i, chunk) in chunks.iter().enumerate() {
        let last = i + 1 == chunks.len();
        if i == 0 {
            p.write_str(&format!(
                "\x1b_Ga=T,f=100,m={};{chunk}\x1b\\",
                u8::from(!last)
            ));
        } else {
            p.write_str(&format!("\x1b_Gm={};{chunk}\x1b\\", u8::from(!last)));
        }
    }
    p.write_str("\n");
    Ok(())
}

// -- iTerm2 -------------------------------------------------------------------

fn render_iterm2(original: &[u8], p: &mut Printer) -> Result<()> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(original);
    p.write_str(&format!(
        "\x1b]1337;File=inline=1;size={}:{encoded}\x07\n",
        original.len()
    ));
    Ok(())
}

// -- Half-block fallback ------------------------------------------------------

fn render_half_block(img: &DynamicImage, p: &mut Printer) -> Result<()> {
    let (cols, rows) = terminal_grid();
    let (img_w, img_h) = img.dimensions();

    // Fit into the cell grid. A cell is about twice as tall as wide, and a
    // half block is one pixel wide by one pixel tall, so the drawable area
    // is cols x rows*2 roughly-square pixels.
    let max_w = u32::from(cols);
    let max_h = u32::from(rows.saturating_sub(2)) * 2;
    let scale = f64::min(
        f64::from(max_w) / f64::from(img_w),
        f64::from(max_h) / f64::from(img_h),
    )
    .min(1.0);
    let target_w = ((f64::from(img_w) * scale).round() as u32).max(1);
    let target_h = ((f64::from(img_h) * scale).round() as u32).max(2);

    let resized = img
        .resize_exact(target_w, target_h, image::imageops::FilterType::Triangle)
        .to_rgba8();

    for y in (0..resized.height().saturating_sub(1)).step_by(2) {
        for x in 0..resized.width() {
            let top = resized.get_pixel(x, y);
            let bottom = resized.get_pixel(x, y + 1);
            // Upper half block: foreground = top pixel, background = bottom.
            p.write_str(&format!(
                "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m\u{2580}",
                top[0], top[1], top[2], bottom[0], bottom[1], bottom[2]
            ));
        }
        p.write_str("\x1b[0m\n");
    }
    Ok(())
}

fn terminal_grid() -> (u16, u16) {
    crossterm::terminal::size().unwrap_or((80, 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(4, 4, |x, y| {
            image::Rgba([(x * 60) as u8, (y * 60) as u8, 128, 255])
        });
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        png
    }

    #[test]
    fn invalid_image_is_a_format_error() {
        let mut p = Printer::sink(Box::new(Vec::new()), false);
        assert!(render(b"not an image", &mut p).is_err());
    }

    #[test]
    fn color_off_renders_summary_line() {
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), false);
        // The test environment has no Kitty/iTerm2 markers, so the
        // half-block path with color off produces the summary.
        std::env::remove_var("KITTY_WINDOW_ID");
        std::env::remove_var("TERM_PROGRAM");
        if detect_protocol() == ImageProtocol::HalfBlock {
            render(&tiny_png(), &mut p).unwrap();
            p.flush().unwrap();
            let out = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
            assert_eq!(out, "[image 4x4]\n");
        }
    }

    #[test]
    fn half_block_emits_true_color_cells() {
        std::env::remove_var("KITTY_WINDOW_ID");
        std::env::remove_var("TERM_PROGRAM");
        if detect_protocol() != ImageProtocol::HalfBlock {
            return;
        }
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), true);
        render(&tiny_png(), &mut p).unwrap();
        p.flush().unwrap();
        let out = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("\u{2580}"));
        assert!(out.contains("\x1b[38;2;"));
        assert!(out.ends_with("\x1b[0m\n"));
    }

    #[test]
    fn kitty_payload_is_chunked_png() {
        let img = image::load_from_memory(&tiny_png()).unwrap();
        let cap = Capture::default();
        let mut p = Printer::sink(Box::new(cap.clone()), true);
        render_kitty(&img, &mut p).unwrap();
        p.flush().unwrap();
        let out = String::from_utf8(cap.0.lock().unwrap().clone()).unwrap();
        assert!(out.starts_with("\x1b_Ga=T,f=100,m=0;"));
        assert!(out.contains("\x1b\\"));
    }
}
