// SPDX-License-Identifier: MIT
//! PTY-backed shell sessions using portable-pty.
//!
//! portable-pty hands back blocking reader/writer handles, so each session
//! runs three plain threads (read, write, wait) bridged to tokio through
//! unbounded mpsc channels.

use std::io::{Read, Write};
use std::thread;

use anyhow::{anyhow, Result};
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Events flowing out of the PTY.
#[derive(Debug)]
pub enum PtyEvent {
    /// Output bytes from the shell.
    Output(Vec<u8>),
    /// Shell process exited.
    Exit(Option<i32>),
    /// I/O error on the PTY.
    Error(String),
}

/// A spawned interactive shell. Dropping the session closes the channels;
/// call [`ShellSession::kill`] to terminate the child process.
pub struct ShellSession {
    /// Bytes sent here are written to the shell's stdin.
    pub input: mpsc::UnboundedSender<Vec<u8>>,
    /// Shell output and lifecycle events.
    pub output: mpsc::UnboundedReceiver<PtyEvent>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

impl ShellSession {
    pub fn kill(&mut self) {
        if let Err(e) = self.killer.kill() {
            // Usually means the shell already exited on its own.
            debug!(err = %e, "shell kill failed");
        }
    }
}

/// Spawn `shell` under a fresh 80x24 PTY.
pub fn spawn_shell(shell: &str) -> Result<ShellSession> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows: 24,
            cols: 80,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(|e| anyhow!("failed to open PTY: {e}"))?;

    let cmd = CommandBuilder::new(shell);
    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| anyhow!("failed to spawn shell: {e}"))?;
    let killer = child.clone_killer();

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| anyhow!("failed to clone PTY reader: {e}"))?;
    let writer = pair
        .master
        .take_writer()
        .map_err(|e| anyhow!("failed to take PTY writer: {e}"))?;
    // Keep the master side alive for the lifetime of the I/O threads.
    let master = pair.master;

    let (input_tx, input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let (output_tx, output_rx) = mpsc::unbounded_channel::<PtyEvent>();

    let read_tx = output_tx.clone();
    thread::spawn(move || {
        read_pty_output(reader, read_tx);
        drop(master);
    });

    thread::spawn(move || {
        write_to_pty(writer, input_rx);
    });

    let mut child = child;
    let exit_tx = output_tx;
    thread::spawn(move || match child.wait() {
        Ok(status) => {
            let code = status.exit_code() as i32;
            debug!(code, "shell exited");
            let _ = exit_tx.send(PtyEvent::Exit(Some(code)));
        }
        Err(e) => {
            error!(err = %e, "failed to wait for shell");
            let _ = exit_tx.send(PtyEvent::Error(format!("wait failed: {e}")));
        }
    });

    Ok(ShellSession {
        input: input_tx,
        output: output_rx,
        killer,
    })
}

fn read_pty_output(mut reader: Box<dyn Read + Send>, tx: mpsc::UnboundedSender<PtyEvent>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("PTY reader got EOF");
                break;
            }
            Ok(n) => {
                if tx.send(PtyEvent::Output(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    // EIO here is the normal Linux signal that the slave side closed.
                    debug!(err = %e, "PTY read ended");
                    break;
                }
            }
        }
    }
}

fn write_to_pty(mut writer: Box<dyn Write + Send>, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(data) = rx.blocking_recv() {
        if let Err(e) = writer.write_all(&data) {
            error!(err = %e, "PTY write error");
            break;
        }
        if let Err(e) = writer.flush() {
            warn!(err = %e, "PTY flush error");
        }
    }
}
