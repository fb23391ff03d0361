//! Helpers for console output.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Text,
    Escape,
    Csi,
}

/// Remove ANSI escape sequences so a line can go to a non-terminal.
///
/// CSI sequences (`ESC [` ... final byte in `@`..=`~`) are dropped whole;
/// any other escape drops `ESC` and the byte after it.
pub(super) fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut state = Scan::Text;
    for c in s.chars() {
        state = match (state, c) {
            (Scan::Text, '\x1b') => Scan::Escape,
            (Scan::Text, _) => {
                out.push(c);
                Scan::Text
            }
            (Scan::Escape, '[') => Scan::Csi,
            (Scan::Csi, '@'..='~') | (Scan::Escape, _) => Scan::Text,
            (Scan::Csi, _) => Scan::Csi,
        };
    }
    out
}

/// Whether stderr should receive coloured output.
///
/// `NO_COLOR` wins; otherwise colour is used only on a terminal.
pub(super) fn stderr_supports_color() -> bool {
    use std::io::IsTerminal as _;
    std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_untouched() {
        assert_eq!(strip_ansi("wrote 2048 bytes to out.tar"), "wrote 2048 bytes to out.tar");
        assert_eq!(strip_ansi(""), "");
    }

    #[test]
    fn colour_codes_are_removed() {
        assert_eq!(
            strip_ansi("\x1b[33mWARN\x1b[0m  override at /etc/motd"),
            "WARN  override at /etc/motd"
        );
        assert_eq!(strip_ansi("\x1b[1;34m==>\x1b[0m Compiling"), "==> Compiling");
    }

    #[test]
    fn cursor_and_erase_sequences_are_removed() {
        assert_eq!(strip_ansi("\x1b[2K\x1b[1Gsha256 ab12"), "sha256 ab12");
    }

    #[test]
    fn two_byte_escapes_are_removed() {
        assert_eq!(strip_ansi("\x1bcreset"), "reset");
    }

    #[test]
    fn unterminated_sequence_drops_the_tail() {
        assert_eq!(strip_ansi("done\x1b[12"), "done");
    }
}
