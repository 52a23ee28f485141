//! Client response transport.
//!
//! Every reply is a single line `<code> <message>` followed by a
//! delimiter. The framework socket protocol uses NUL; the stdin/stdout
//! daemon mode uses newline.

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{NetdError, NetdResult};

/// Upper bound on one response line, code and delimiter included.
pub const MAX_RESPONSE_LEN: usize = 4096;

/// Numeric response codes.
pub mod codes {
    /// One line of a multi-line tether stats listing.
    pub const TETHERING_STATS_LIST_RESULT: u16 = 114;
    /// Command completed.
    pub const COMMAND_OKAY: u16 = 200;
    /// Remaining quota counter value.
    pub const QUOTA_COUNTER_RESULT: u16 = 220;
    /// Single tether stats result.
    pub const TETHERING_STATS_RESULT: u16 = 221;
    /// Command understood but the operation failed.
    pub const OPERATION_FAILED: u16 = 400;
    /// Unrecognized command or wrong argument count.
    pub const COMMAND_SYNTAX_ERROR: u16 = 500;
    /// Bad argument value.
    pub const COMMAND_PARAMETER_ERROR: u16 = 501;
}

/// Formats one response line without the delimiter.
pub fn format_response(code: u16, msg: &str) -> String {
    format!("{} {}", code, msg)
}

/// Receives response lines for the client that issued a command.
#[async_trait]
pub trait ResponseSink: Send {
    /// Sends one `<code> <msg>` line.
    async fn send_msg(&mut self, code: u16, msg: &str) -> NetdResult<()>;
}

/// [`ResponseSink`] that writes delimited lines to an async writer.
#[derive(Debug)]
pub struct SocketClient<W> {
    writer: W,
    delimiter: u8,
}

impl<W> SocketClient<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a client using the NUL delimiter.
    pub fn new(writer: W) -> Self {
        Self::with_delimiter(writer, b'\0')
    }

    /// Creates a client with a custom delimiter.
    pub fn with_delimiter(writer: W, delimiter: u8) -> Self {
        Self { writer, delimiter }
    }

    /// Consumes the client, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> ResponseSink for SocketClient<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_msg(&mut self, code: u16, msg: &str) -> NetdResult<()> {
        let mut line = format_response(code, msg).into_bytes();
        line.push(self.delimiter);
        if line.len() > MAX_RESPONSE_LEN {
            return Err(NetdError::invalid_argument(
                "response",
                format!("{} bytes exceeds {}", line.len(), MAX_RESPONSE_LEN),
            ));
        }

        self.writer
            .write_all(&line)
            .await
            .map_err(|source| NetdError::Response { source })?;
        self.writer
            .flush()
            .await
            .map_err(|source| NetdError::Response { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nul_delimited() {
        let mut client = SocketClient::new(Vec::new());
        client.send_msg(codes::COMMAND_OKAY, "Bandwidth command succeeded").await.unwrap();
        client.send_msg(codes::OPERATION_FAILED, "failed").await.unwrap();
        assert_eq!(
            client.into_inner(),
            b"200 Bandwidth command succeeded\0400 failed\0".to_vec()
        );
    }

    #[tokio::test]
    async fn test_newline_delimited() {
        let mut client = SocketClient::with_delimiter(Vec::new(), b'\n');
        client
            .send_msg(codes::TETHERING_STATS_LIST_RESULT, "wlan0 rmnet0 1 2 3 4")
            .await
            .unwrap();
        assert_eq!(client.into_inner(), b"114 wlan0 rmnet0 1 2 3 4\n".to_vec());
    }

    #[tokio::test]
    async fn test_oversized_line_rejected() {
        let mut client = SocketClient::new(Vec::new());
        let msg = "x".repeat(MAX_RESPONSE_LEN);
        let err = client.send_msg(codes::COMMAND_OKAY, &msg).await.unwrap_err();
        assert!(err.is_parameter_error());
        assert!(client.into_inner().is_empty());
    }

    #[test]
    fn test_format_response() {
        assert_eq!(format_response(501, "Invalid bytes"), "501 Invalid bytes");
    }
}
