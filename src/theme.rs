//! Terminal colours and progress bar helpers for the CLI.
//!
//! Respects the `NO_COLOR` env-var and the `--no-color` flag.
//!
//! | Token   | Hex       | Usage                      |
//! |---------|-----------|----------------------------|
//! | accent  | `#3DA5FF` | headings, labels           |
//! | info    | `#7CC4FF` | informational values       |
//! | success | `#2FBF71` | completed runs             |
//! | warn    | `#FFB020` | cancellations              |
//! | error   | `#E23D2D` | failures                   |
//! | muted   | `#8B8F99` | metadata                   |

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};

// ── Global color toggle ─────────────────────────────────────────────────────

static COLOR_DISABLED: AtomicBool = AtomicBool::new(false);

pub fn disable_color() {
    COLOR_DISABLED.store(true, Ordering::Relaxed);
    colored::control::set_override(false);
}

/// Call once after CLI parsing.
pub fn init_color(no_color_flag: bool) {
    if no_color_flag
        || std::env::var("NO_COLOR")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    {
        disable_color();
    }
}

fn is_color() -> bool {
    !COLOR_DISABLED.load(Ordering::Relaxed)
}

pub mod palette {
    pub const ACCENT: (u8, u8, u8) = (0x3D, 0xA5, 0xFF);
    pub const INFO: (u8, u8, u8) = (0x7C, 0xC4, 0xFF);
    pub const SUCCESS: (u8, u8, u8) = (0x2F, 0xBF, 0x71);
    pub const WARN: (u8, u8, u8) = (0xFF, 0xB0, 0x20);
    pub const ERROR: (u8, u8, u8) = (0xE2, 0x3D, 0x2D);
    pub const MUTED: (u8, u8, u8) = (0x8B, 0x8F, 0x99);
}

fn apply(text: &str, rgb: (u8, u8, u8)) -> String {
    if is_color() {
        text.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        text.to_string()
    }
}

pub fn accent(text: &str) -> String {
    apply(text, palette::ACCENT)
}

pub fn info(text: &str) -> String {
    apply(text, palette::INFO)
}

pub fn success(text: &str) -> String {
    apply(text, palette::SUCCESS)
}

pub fn warn(text: &str) -> String {
    apply(text, palette::WARN)
}

pub fn error(text: &str) -> String {
    apply(text, palette::ERROR)
}

pub fn muted(text: &str) -> String {
    apply(text, palette::MUTED)
}

pub fn icon_ok(label: &str) -> String {
    format!("{} {}", success("✓"), label)
}

pub fn icon_fail(label: &str) -> String {
    format!("{} {}", error("✗"), label)
}

pub fn icon_warn(label: &str) -> String {
    format!("{} {}", warn("⚠"), label)
}

/// Format "  Label : value" with the label muted and the value highlighted.
pub fn label_value(label: &str, value: &str) -> String {
    format!("  {} : {}", muted(label), info(value))
}

// ── Progress bar ────────────────────────────────────────────────────────────

/// A 0–100 bar whose message carries the current phase.
pub fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let template = if is_color() {
        "{msg:>12.cyan} [{bar:40.cyan/blue}] {pos:>3}%"
    } else {
        "{msg:>12} [{bar:40}] {pos:>3}%"
    };
    let style = ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    pb.set_style(style);
    pb
}
