//! Transport Server — accepts clients, performs the upgrade handshake, and
//! broadcasts telemetry frames to the connected set.
//!
//! One accept thread owns the listener; one detached handshake thread per
//! incoming connection closes itself after adding (or rejecting) a socket.
//! `broadcast` is the only path that touches more than one client at a
//! time, and it always runs under the clients mutex.

mod frame;
mod handshake;

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use crate::error::EngineError;

pub use frame::encode_text_frame;

/// Accepts clients and broadcasts text frames to them.
pub struct TransportServer {
    port: u16,
    clients: Arc<Mutex<Vec<TcpStream>>>,
    running: Arc<AtomicBool>,
    accept_handle: Option<JoinHandle<()>>,
    listener: Option<TcpListener>,
}

impl TransportServer {
    /// Create a server that will listen on `port` once started.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            clients: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            accept_handle: None,
            listener: None,
        }
    }

    /// Bind and listen, then spawn the accept thread. Returns `false` if
    /// binding fails; a second call while already running is a no-op that
    /// returns `true`.
    pub fn start(&mut self) -> bool {
        if self.running.load(Ordering::SeqCst) {
            return true;
        }

        let listener = match TcpListener::bind(("0.0.0.0", self.port)) {
            Ok(l) => l,
            Err(e) => {
                let err = EngineError::TransportSetupFailure { reason: e.to_string() };
                warn!(port = self.port, %err, "transport setup failed");
                return false;
            }
        };
        if let Err(e) = listener.set_nonblocking(true) {
            let err = EngineError::TransportSetupFailure {
                reason: format!("set_nonblocking: {e}"),
            };
            warn!(%err, "transport setup failed");
            return false;
        }

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let clients = self.clients.clone();
        let accept_listener = listener.try_clone().expect("clone listener for accept thread");

        self.listener = Some(listener);
        self.accept_handle = Some(std::thread::spawn(move || {
            accept_loop(accept_listener, clients, running);
        }));

        true
    }

    /// Stop accepting, close every client socket, join the accept thread.
    /// Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        self.listener = None;
        self.clients.lock().unwrap().clear();
    }

    /// Encode `payload` as one text frame and write it to every connected
    /// client. Clients whose write fails are dropped.
    pub fn broadcast(&self, payload: &[u8]) {
        let frame = encode_text_frame(payload);
        let mut clients = self.clients.lock().unwrap();
        clients.retain_mut(|client| match client.write_all(&frame) {
            Ok(()) => true,
            Err(e) => {
                let err = EngineError::ClientWriteFailure { reason: e.to_string() };
                debug!(%err, "dropping client");
                false
            }
        });
    }

    /// Number of currently accepted clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().unwrap().len()
    }
}

impl Drop for TransportServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, clients: Arc<Mutex<Vec<TcpStream>>>, running: Arc<AtomicBool>) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, addr)) => {
                debug!(%addr, "accepted connection");
                let clients = clients.clone();
                std::thread::spawn(move || handle_handshake(stream, clients));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
            Err(e) => {
                debug!(error = %e, "transient accept error");
            }
        }
    }
}

fn handle_handshake(mut stream: TcpStream, clients: Arc<Mutex<Vec<TcpStream>>>) {
    let cloned = match stream.try_clone() {
        Ok(cloned) => cloned,
        Err(e) => {
            debug!(error = %e, "failed to clone stream for handshake read");
            return;
        }
    };

    let key = match handshake::read_request_key(cloned) {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "handshake failed");
            return;
        }
    };

    let accept = handshake::accept_key(&key);
    if handshake::write_upgrade_response(&mut stream, &accept).is_err() {
        debug!("failed to write upgrade response");
        return;
    }

    clients.lock().unwrap().push(stream);
}
