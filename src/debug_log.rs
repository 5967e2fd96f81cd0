use std::fmt::{self, Write};

/// Human-readable trace of a single measurement.
///
/// Returned alongside every probe outcome so that callers can show what was
/// sent and received. Each line is mirrored to the `log` facade at debug level.
#[derive(Debug, Default, Clone)]
pub struct DebugLog {
    buf: String,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one line.
    pub fn line(&mut self, msg: impl fmt::Display) {
        log::debug!("{}", msg);
        let _ = writeln!(self.buf, "{}", msg);
    }

    /// Appends a hex dump of `data`, four bytes per line.
    pub fn hex_dump(&mut self, data: &[u8]) {
        for chunk in data.chunks(4) {
            let row = chunk
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(" ");
            self.line(row);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn into_string(self) -> String {
        self.buf
    }
}

impl fmt::Display for DebugLog {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_newline_terminated() {
        let mut log = DebugLog::new();
        log.line("connected to 127.0.0.1:123");
        log.line(format_args!("Packet {} size sent: {} bytes", "ntpv4", 48));
        assert_eq!(
            log.as_str(),
            "connected to 127.0.0.1:123\nPacket ntpv4 size sent: 48 bytes\n"
        );
    }

    #[test]
    fn test_hex_dump_four_bytes_per_line() {
        let mut log = DebugLog::new();
        log.hex_dump(&[0x24, 0x02, 0x03, 0xE8, 0x00, 0x0A]);
        assert_eq!(log.into_string(), "24 02 03 E8\n00 0A\n");
    }

    #[test]
    fn test_hex_dump_empty() {
        let mut log = DebugLog::new();
        log.hex_dump(&[]);
        assert!(log.as_str().is_empty());
    }
}
