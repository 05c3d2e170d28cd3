//! Toasts rendered as terminal lines.

use std::io::{self, Write};

use mileage_client::mutation::{Notifier, Toast, ToastLevel};

/// Success toasts go to stdout, error toasts to stderr.
#[derive(Debug, Default)]
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn notify(&self, toast: Toast) {
        let _ = match toast.level {
            ToastLevel::Success => write_toast(&mut io::stdout(), &toast),
            ToastLevel::Error => write_toast(&mut io::stderr(), &toast),
        };
    }
}

pub fn write_toast(w: &mut impl Write, toast: &Toast) -> io::Result<()> {
    let mark = match toast.level {
        ToastLevel::Success => "✓",
        ToastLevel::Error => "✗",
    };
    writeln!(w, "{mark} {}", toast.message)
}
