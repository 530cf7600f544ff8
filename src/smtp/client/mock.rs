#![allow(missing_docs)]

use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::{self, AsyncRead, AsyncWrite, ReadBuf};

pub type MockCursor = Cursor<Vec<u8>>;

/// In-memory stream: reads come from a scripted buffer, writes are captured.
///
/// Clones share the captured output, so a test can keep a handle while a
/// transport owns the stream.
#[pin_project]
#[derive(Clone, Debug)]
pub struct MockStream {
    #[pin]
    reader: MockCursor,
    writer: Arc<Mutex<Vec<u8>>>,
    shutdowns: Arc<Mutex<usize>>,
}

impl Default for MockStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream::with_vec(Vec::new())
    }

    pub fn with_vec(vec: Vec<u8>) -> MockStream {
        MockStream {
            reader: MockCursor::new(vec),
            writer: Arc::new(Mutex::new(Vec::new())),
            shutdowns: Arc::new(Mutex::new(0)),
        }
    }

    /// Stream whose peer answers with `replies`, in order
    pub fn with_replies(replies: &str) -> MockStream {
        MockStream::with_vec(replies.as_bytes().to_vec())
    }

    pub fn take_vec(&self) -> Vec<u8> {
        self.writer
            .lock()
            .map(|mut written| std::mem::take(&mut *written))
            .unwrap_or_default()
    }

    /// Everything written so far, lossily decoded
    pub fn written(&self) -> String {
        self.writer
            .lock()
            .map(|written| String::from_utf8_lossy(&written).into_owned())
            .unwrap_or_default()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.lock().map(|count| *count).unwrap_or_default()
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        this.reader.poll_read(cx, buf)
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        match this.writer.lock() {
            Ok(mut written) => {
                written.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            Err(_) => Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "poisoned"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<io::Result<()>> {
        let this = self.project();
        if let Ok(mut count) = this.shutdowns.lock() {
            *count += 1;
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn write_take_test() {
        let mut mock = MockStream::new();
        // write to mock stream
        mock.write_all(&[1, 2, 3]).await.unwrap();
        assert_eq!(mock.take_vec(), vec![1, 2, 3]);
        assert!(mock.take_vec().is_empty());
    }

    #[tokio::test]
    async fn read_with_vec_test() {
        let mut mock = MockStream::with_vec(vec![4, 5]);
        let mut vec = Vec::new();
        mock.read_to_end(&mut vec).await.unwrap();
        assert_eq!(vec, vec![4, 5]);
    }

    #[tokio::test]
    async fn clones_share_output() {
        let mock = MockStream::new();
        let mut handle = mock.clone();
        handle.write_all(b"QUIT\r\n").await.unwrap();
        handle.shutdown().await.unwrap();
        assert_eq!(mock.written(), "QUIT\r\n");
        assert_eq!(mock.shutdowns(), 1);
    }
}
