//! Control client used by the CLI subcommands

use anyhow::{Context, Result, bail};
use protocol::{MAX_RESPONSE_LEN, Request, Response, read_line_async_limited, write_line_async};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

pub struct ControlClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("Failed to connect to portal at {}", addr))?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Send one request and wait for its response
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_line_async(&mut self.writer, request)
            .await
            .context("Failed to send request")?;
        let response = read_line_async_limited(&mut self.reader, MAX_RESPONSE_LEN)
            .await
            .context("Failed to read response")?;
        Ok(response)
    }

    /// Like [`request`](Self::request) but turns error responses into errors
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        match self.request(request).await? {
            Response::Error { error } => bail!("portal rejected request: {}", error),
            response => Ok(response),
        }
    }
}
