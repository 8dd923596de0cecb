use std::{future::Future, path::PathBuf, sync::Arc};

use netlog_core::EventSink;
use probe_common::trace_pipe::{self, StopHandle};

use crate::{dispatcher::EventDispatcher, resolver::IdentityResolver, trace_event};

/// Feed every netlog event read from `trace_pipe` to `dispatcher`, until the
/// returned handle is dropped.
pub fn start<R, S>(trace_pipe: PathBuf, dispatcher: Arc<EventDispatcher<R, S>>) -> StopHandle
where
    R: IdentityResolver + 'static,
    S: EventSink + 'static,
{
    trace_pipe::start(trace_pipe, move |line| {
        let Ok(line) = std::str::from_utf8(line) else {
            return;
        };
        match trace_event::parse_line(line) {
            Some(raw) => dispatcher.on_socket_event(&raw),
            None => log::trace!("skipping trace line {line:?}"),
        }
    })
}

/// Run the pipeline until `shutdown` completes, returning its output.
///
/// The reader has exited and released `dispatcher` when this returns, no
/// event is dispatched afterwards.
pub async fn run<R, S, F>(
    trace_pipe: PathBuf,
    dispatcher: Arc<EventDispatcher<R, S>>,
    shutdown: F,
) -> F::Output
where
    R: IdentityResolver + 'static,
    S: EventSink + 'static,
    F: Future,
{
    let handle = start(trace_pipe, dispatcher);
    let output = shutdown.await;
    log::debug!("Stopping event pipeline");
    handle.stop().await;
    output
}
