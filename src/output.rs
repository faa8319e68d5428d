//! User-facing console messages for the `storage-ops` binary.

use owo_colors::OwoColorize;

/// Small wrapper around stdout/stderr printing to provide consistent, colored
/// user-facing messages. Colors are enabled only when output is a TTY.
fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {}", msg);
    }
}

pub fn print_warn(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {}", msg);
    }
}

pub fn print_error(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {}", msg);
    }
}

/// Print a plain user-facing line (no prefix). Use this for primary outputs
/// such as the destination path of a copy, which users may script against.
pub fn print_user(msg: &str) {
    println!("{}", msg);
}

/// Render a byte count with a binary unit, e.g. `1.5 MiB`.
pub fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Overwrite the current stderr line with a progress summary.
pub fn print_progress(transferred: u64, total: u64, bytes_per_second: f64) {
    let pct = if total == 0 { 100.0 } else { transferred as f64 * 100.0 / total as f64 };
    let rate = human_bytes(bytes_per_second as u64);
    let line = format!(
        "{} / {} ({pct:.0}%) {rate}/s",
        human_bytes(transferred),
        human_bytes(total)
    );
    if atty::is(atty::Stream::Stderr) {
        eprint!("\r{}", line.dimmed());
        if transferred >= total {
            eprintln!();
        }
    } else if transferred >= total {
        eprintln!("{line}");
    }
}
