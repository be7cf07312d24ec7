use crate::cli::ColorMode;
use nu_ansi_term::Color;
use std::sync::atomic::{AtomicBool, Ordering};

pub(crate) const DEFAULT_EXIT_CODE: i32 = 1;

static USE_COLOR: AtomicBool = AtomicBool::new(true);

pub(crate) fn configure_color(cmode: ColorMode) {
    USE_COLOR.store(matches!(cmode, ColorMode::On), Ordering::Relaxed);
}

fn color_enabled() -> bool {
    USE_COLOR.load(Ordering::Relaxed)
}

pub(crate) fn error_internal(text: &str) {
    if color_enabled() {
        let style = Color::Red.bold();
        let text_style = Color::Default.bold();

        eprintln!("{} {}", style.paint("error:"), text_style.paint(text));
    } else {
        eprintln!("error: {}", text);
    }
}

pub(crate) fn warn_internal(text: &str) {
    if color_enabled() {
        let style = Color::Yellow.bold();
        let text_style = Color::Default.bold();

        eprintln!("{} {}", style.paint("warning:"), text_style.paint(text));
    } else {
        eprintln!("warning: {}", text);
    }
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::warn_internal(&formatted);
    })
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
    })
}

// evaluates to `!` so it fits any expression position
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => ({
        let formatted = format!($($arg)*);
        $crate::utils::errors::error_internal(&formatted);
        ::std::process::exit($crate::utils::errors::DEFAULT_EXIT_CODE)
    })
}
