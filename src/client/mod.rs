//! Interactive terminal client.
//!
//! Three units run concurrently and share only the [`SharedBuffer`]:
//!
//! - the transport task receives frames and appends display lines,
//! - the renderer task redraws on a fixed interval,
//! - the input loop runs on a blocking thread and queues outgoing frames.
//!
//! Typing `:q` cancels a process-wide stop token; every other unit polls it
//! and exits on its own. The terminal is restored by RAII guards on every
//! exit path.

pub mod buffer;
pub mod input;
pub mod outbox;
pub mod transport;
pub mod view;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use buffer::SharedBuffer;
pub use input::{InputExit, InputLine, InputLoop, LineSource, ReaderLines, TerminalLines};
pub use outbox::{Outbox, Submit};
pub use transport::TransportExit;
pub use view::{Layout, Renderer};

use crate::config::ClientConfig;
use crate::terminal::{RawModeGuard, ScreenGuard, TerminalError};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("terminal error: {0}")]
    Terminal(#[from] TerminalError),

    #[error("input error: {0}")]
    Input(#[source] std::io::Error),

    #[error("task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Run the client until the operator exits.
pub async fn run_client(config: ClientConfig) -> Result<InputExit, ClientError> {
    tracing::info!(
        url = %config.server_url,
        username = %config.username,
        "client starting"
    );

    let buffer = SharedBuffer::new();
    let line = InputLine::new();
    let stop = CancellationToken::new();
    let (outbox, outgoing) = Outbox::new(config.username.clone(), config.outbox_capacity);

    let raw_guard = RawModeGuard::new()?;
    let screen_guard = ScreenGuard::new()?;

    let transport_task = tokio::spawn(transport::run(
        config.server_url.clone(),
        buffer.clone(),
        outgoing,
        stop.clone(),
    ));

    let renderer = Renderer::new(std::io::stdout(), buffer.clone(), line.clone());
    let renderer_task = tokio::spawn(renderer.run(stop.clone(), config.redraw_interval));

    let input_stop = stop.clone();
    let input_task = tokio::task::spawn_blocking(move || {
        let mut input_loop = InputLoop::new(TerminalLines::new(line, input_stop.clone()));
        let result = input_loop.run(&outbox);
        input_stop.cancel();
        result
    });

    let input_result = input_task.await;
    stop.cancel();

    match transport_task.await {
        Ok(exit) => tracing::debug!(?exit, "transport finished"),
        Err(e) => tracing::warn!(error = %e, "transport task failed"),
    }
    match renderer_task.await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "renderer failed"),
        Err(e) => tracing::warn!(error = %e, "renderer task failed"),
    }

    drop(screen_guard);
    drop(raw_guard);

    let exit = input_result?.map_err(ClientError::Input)?;
    tracing::info!(?exit, "client exiting");
    Ok(exit)
}
