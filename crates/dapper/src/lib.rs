//! Dapper: a language-agnostic Debug Adapter Protocol engine.
//!
//! This crate implements the session-facing half of DAP (§3): framing,
//! request dispatch, breakpoint/variable/stack bookkeeping, and the
//! polymorphic [`backend::Backend`] seam a debuggee-specific integration
//! plugs into. It does not itself know how to debug any particular
//! language — an embedder either spawns an external launcher process that
//! speaks the IPC framing in [`framing::ipc`], or registers an
//! [`backend::in_process::InProcessExecutor`] and runs in the same process
//! as its debuggee.
//!
//! # Module map
//!
//! - [`protocol`]: DAP wire types.
//! - [`framing`]: the client-facing `Content-Length` codec and the IPC
//!   binary codec.
//! - [`transport`]: TCP/Unix-socket/named-pipe connections.
//! - [`ipc`]: the launcher-facing connection manager built on `framing::ipc`.
//! - [`router`]: response/event routing for IPC messages.
//! - [`lifecycle`]: the session state machine.
//! - [`scheduler`]: the cooperative single-threaded task queue.
//! - [`config`]: `launch`/`attach` argument resolution.
//! - [`platform`]: executable resolution and environment construction.
//! - [`logpoint`]: log-message hole parsing for logpoint breakpoints.
//! - [`backend`]: the polymorphic debuggee-facing seam.
//! - [`session`]: mutable session-wide state (threads, breakpoints, variable
//!   arena).
//! - [`dispatcher`]: the request handler, table-driven command dispatch.
//! - [`hot_reload`]: `dapper/hotReload` orchestration.
//! - [`error`]: the error taxonomy shared by every module above.

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod hot_reload;
pub mod ipc;
pub mod lifecycle;
pub mod logpoint;
pub mod platform;
pub mod protocol;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod transport;

use dispatcher::RequestHandler;
use error::DapperError;
use framing::dap::{encode, Decoder};
use protocol::{Event, Request, Response};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

/// The top-level aggregate (§3): owns the [`RequestHandler`] (itself the
/// owner of the backend, session state, and lifecycle) and the client-facing
/// transport loop. One `Session` serves exactly one client connection for
/// its lifetime; a new client means a new process or a new `Session`.
pub struct Session {
    pub handler: Arc<RequestHandler>,
    out_seq: Arc<AtomicI64>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self { handler: Arc::new(RequestHandler::new()), out_seq: Arc::new(AtomicI64::new(1)) }
    }

    #[must_use]
    pub fn with_handler(handler: Arc<RequestHandler>) -> Self {
        Self { handler, out_seq: Arc::new(AtomicI64::new(1)) }
    }

    fn next_seq(&self) -> i64 {
        self.out_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Drives the client-facing DAP transport: decodes `Content-Length`
    /// framed requests from `reader`, dispatches each one through the
    /// request handler, and writes its response plus any events back out on
    /// `writer`, serializing writes so a response and its events never
    /// interleave with another request's output.
    ///
    /// Returns once `reader` reaches EOF or a framing error occurs; a
    /// framing error on the client connection is unrecoverable, since the
    /// byte stream itself may now be desynchronized.
    pub async fn run<R, W>(&self, mut reader: R, writer: W) -> Result<(), DapperError>
    where
        R: AsyncReadExt + Unpin,
        W: AsyncWriteExt + Unpin + Send + 'static,
    {
        let writer = Arc::new(Mutex::new(writer));
        self.spawn_event_forwarder(writer.clone());

        let mut decoder = Decoder::new();
        let mut chunk = [0u8; 8192];

        loop {
            let n = reader
                .read(&mut chunk)
                .await
                .map_err(|e| DapperError::Transport(format!("client read failed: {e}")))?;
            if n == 0 {
                return Ok(());
            }
            decoder.feed(&chunk[..n]);

            while let Some(payload) = decoder.try_decode()? {
                let request: Request = serde_json::from_slice(&payload)
                    .map_err(|e| DapperError::Protocol(format!("malformed request: {e}")))?;
                self.handle_one(request, writer.clone()).await;
            }
        }
    }

    /// Spawns the background task that drains the handler's event stream —
    /// `stopped`, `output`, `terminated`, and the like, forwarded from
    /// whichever backend is live — and writes each one out on the same
    /// framed connection as request responses, under the same write lock so
    /// a forwarded event never tears a response in half.
    fn spawn_event_forwarder<W>(&self, writer: Arc<Mutex<W>>)
    where
        W: AsyncWriteExt + Unpin + Send + 'static,
    {
        let handler = self.handler.clone();
        let out_seq = self.out_seq.clone();
        tokio::spawn(async move {
            let Some(mut events) = handler.take_event_stream().await else { return };
            while let Some(mut event) = events.recv().await {
                event.seq = out_seq.fetch_add(1, Ordering::SeqCst);
                let mut out = writer.lock().await;
                if let Err(e) = write_message(&mut *out, &event).await {
                    tracing::warn!(error = %e, "failed writing forwarded event");
                    return;
                }
            }
        });
    }

    /// Dispatches a single request on the scheduler-less fast path used by
    /// `run`, writing the response and its events out as soon as they're
    /// ready. Each request runs to completion before the next is read off
    /// the wire, matching the single-cooperative-worker model §4.6 assumes.
    async fn handle_one<W>(&self, request: Request, writer: Arc<Mutex<W>>)
    where
        W: AsyncWriteExt + Unpin,
    {
        let is_disconnect = request.command == "disconnect";
        let outcome = self.handler.dispatch(request).await;

        let mut response = outcome.response;
        response.seq = self.next_seq();

        let mut out = writer.lock().await;
        if let Err(e) = write_message(&mut *out, &response).await {
            tracing::warn!(error = %e, "failed writing response");
            return;
        }
        for mut event in outcome.events {
            event.seq = self.next_seq();
            if let Err(e) = write_message(&mut *out, &event).await {
                tracing::warn!(error = %e, "failed writing event");
                return;
            }
        }
        drop(out);

        if is_disconnect {
            tracing::info!("session disconnected");
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

async fn write_message<W, M>(writer: &mut W, message: &M) -> Result<(), DapperError>
where
    W: AsyncWriteExt + Unpin,
    M: serde::Serialize,
{
    let payload = serde_json::to_vec(message).map_err(|e| DapperError::Protocol(e.to_string()))?;
    let framed = encode(&payload);
    writer.write_all(&framed).await.map_err(|e| DapperError::Transport(format!("client write failed: {e}")))?;
    writer.flush().await.map_err(|e| DapperError::Transport(format!("client flush failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_dispatches_one_request_and_writes_a_framed_response() {
        let session = Session::new();
        let request = Request {
            seq: 1,
            msg_type: "request".to_string(),
            command: "initialize".to_string(),
            arguments: Some(serde_json::json!({"adapterId": "dapper"})),
        };

        let (mut client, server) = tokio::io::duplex(8192);
        session.handle_one(request, Arc::new(Mutex::new(server))).await;

        let mut buf = [0u8; 8192];
        let n = client.read(&mut buf).await.unwrap();

        let mut decoder = Decoder::new();
        decoder.feed(&buf[..n]);
        let response_bytes = decoder.try_decode().unwrap().unwrap();
        let response: Response = serde_json::from_slice(&response_bytes).unwrap();
        assert!(response.success);

        let event_bytes = decoder.try_decode().unwrap().unwrap();
        let event: Event = serde_json::from_slice(&event_bytes).unwrap();
        assert_eq!(event.event, "initialized");
    }
}
