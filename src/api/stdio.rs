use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

use super::protocol::Dispatcher;

/// Serve newline-delimited messages on stdin/stdout until stdin closes.
pub async fn serve(dispatcher: Dispatcher) -> std::io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_io(dispatcher, stdin, stdout).await
}

pub async fn serve_io<R, W>(dispatcher: Dispatcher, mut reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    info!(message = "Serving on stdio");

    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        // Raw bytes: invalid UTF-8 becomes a parse error reply, not an I/O error.
        if let Some(reply) = dispatcher.handle_bytes(&line).await {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    info!(message = "Input closed, shutting down");
    Ok(())
}
