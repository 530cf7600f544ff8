use tokio::io::{self, AsyncWrite, AsyncWriteExt};

/// The codec used for transparency
///
/// Lines of the message body starting with a dot get an extra dot, so the
/// server never mistakes them for the end of the DATA section.
#[derive(Clone, Copy, Debug)]
pub struct ClientCodec {
    escape_count: u8,
}

impl Default for ClientCodec {
    fn default() -> Self {
        // DATA content starts at the beginning of a line.
        ClientCodec { escape_count: 2 }
    }
}

impl ClientCodec {
    /// Creates a new client codec
    pub fn new() -> Self {
        ClientCodec::default()
    }

    /// Adds transparency
    #[allow(clippy::bool_to_int_with_if)]
    pub async fn encode<W: AsyncWrite + Unpin>(
        &mut self,
        frame: &[u8],
        mut buf: W,
    ) -> io::Result<()> {
        if frame.is_empty() {
            match self.escape_count {
                0 => buf.write_all(b"\r\n.\r\n").await?,
                1 => buf.write_all(b"\n.\r\n").await?,
                _ => buf.write_all(b".\r\n").await?,
            }
            self.escape_count = 0;
            return Ok(());
        }

        let mut start = 0;
        for (idx, byte) in frame.iter().enumerate() {
            match self.escape_count {
                0 => self.escape_count = if *byte == b'\r' { 1 } else { 0 },
                1 => self.escape_count = if *byte == b'\n' { 2 } else { 0 },
                _ => {
                    self.escape_count = if *byte == b'.' {
                        3
                    } else if *byte == b'\r' {
                        1
                    } else {
                        0
                    }
                }
            }
            if self.escape_count == 3 {
                self.escape_count = 0;
                buf.write_all(&frame[start..idx]).await?;
                buf.write_all(b".").await?;
                start = idx;
            }
        }
        buf.write_all(&frame[start..]).await?;
        Ok(())
    }

    /// Whether the bytes encoded so far end with CRLF
    pub fn at_line_start(&self) -> bool {
        self.escape_count == 2
    }
}
