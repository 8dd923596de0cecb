//! Streams the lines of tracefs `trace_pipe`, where the hits of the
//! attached netlog events show up.

use std::{
    os::unix::prelude::AsRawFd,
    path::{Path, PathBuf},
};

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_fd::AsyncFd;

/// Reading stops when this is dropped.
pub struct StopHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl StopHandle {
    /// Stop reading and wait for the reader task to exit. `on_line` has
    /// been dropped when this returns.
    pub async fn stop(self) {
        let Self { stop, task } = self;
        drop(stop);
        if let Err(e) = task.await {
            log::warn!("trace_pipe reader failed: {e}");
        }
    }
}

/// Spawn a task calling `on_line` for every complete line of `path`.
pub fn start<F>(path: PathBuf, mut on_line: F) -> StopHandle
where
    F: FnMut(&[u8]) + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        tokio::pin!(rx);
        // opening a fifo blocks until there's a writer
        let opened = tokio::select! {
            biased;
            _ = &mut rx => return,
            opened = open_trace_pipe(&path) => opened,
        };
        if let Some((mut async_fd, _open_file)) = opened {
            log::info!("Reading events from {}", path.display());

            let mut buf = BytesMut::with_capacity(4096);
            loop {
                let file_event = tokio::select! {
                    biased;
                    // exit when stop handle is dropped
                    _ = &mut rx => return,
                    // wait for a new event
                    f = async_fd.read_buf(&mut buf) => f,
                };
                match file_event {
                    Ok(0) => {
                        log::warn!("{} closed", path.display());
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("Error reading from {}: {:?}", path.display(), e);
                        return;
                    }
                }
                if let Some(last_newline) = buf[..].iter().rposition(|&x| x == b'\n') {
                    let completed_lines = buf.split_to(last_newline + 1);
                    for_each_line(&completed_lines, &mut on_line);
                }
            }
        }
    });

    StopHandle { stop: tx, task }
}

/// Open the trace pipe file and returns:
/// - An AsyncFd which can be used to read asynchronously from it.
///   NOTE: we can't just use tokio::fs::File because it uses blocking IO on
///   a different thread. If we do, Ctrl-C won't quit the application since
///   we're still stuck reading this file.
/// - The opened tokio::fs::File is returned and must not be dropped until
///   we're done reading from the async fd. Dropping it would close the FD,
///   resulting in EBADFD errors when trying to read.
async fn open_trace_pipe(path: &Path) -> Option<(AsyncFd, File)> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) => {
            log::warn!("Error opening {}: {:?}", path.display(), e);
            return None;
        }
    };
    let async_fd = match AsyncFd::try_from(file.as_raw_fd()) {
        Ok(async_fd) => async_fd,
        Err(e) => {
            log::warn!("Error opening {} as non-blocking: {:?}", path.display(), e);
            return None;
        }
    };
    Some((async_fd, file))
}

fn for_each_line<F: FnMut(&[u8])>(buf: &[u8], on_line: &mut F) {
    buf.split(|c| *c == b'\n')
        .filter(|bytes| !bytes.is_empty())
        .for_each(on_line);
}
