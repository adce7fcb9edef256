use crate::comm::config::CommConfig;
use crate::comm::error::{CommError, CommInitError, Result};
use crate::comm::protocol::{
    HEADER_LEN, decode_header, decode_request_payload, encode_progress, encode_request_ack, encode_response,
};
use crate::comm::types::{MsgType, ProgressPayload, ResponsePayload, UserRequest, UserResponse};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Sequence deduplication entry
#[derive(Debug)]
struct DedupEntry {
    /// When this entry was created
    instant: Instant,
    /// Cached response to resend if duplicate
    cached_response: Option<Vec<u8>>,
}

/// Comm server - handles UDP communication with operator clients
pub struct Comm {
    socket: UdpSocket,
    config: CommConfig,
    /// Channel sender to forward UserRequests to the main loop
    loop_sender: mpsc::Sender<UserRequest>,
    /// Sequence deduplication table per client
    dedup: Arc<tokio::sync::Mutex<HashMap<SocketAddr, HashMap<u32, DedupEntry>>>>,
}

impl Comm {
    /// Create a new Comm instance and bind the UDP socket
    /// Returns the comm instance and the receiver for the main loop
    pub async fn new(config: CommConfig) -> std::result::Result<(Comm, mpsc::Receiver<UserRequest>), CommInitError> {
        let socket = UdpSocket::bind(config.bind_addr()?)
            .await
            .map_err(|e| CommInitError::BindFailed(e.to_string()))?;

        if let Ok(addr) = socket.local_addr() {
            info!(addr = %addr, "comm listening");
        }

        let (tx, rx) = mpsc::channel(1024);

        Ok((
            Self {
                socket,
                config,
                loop_sender: tx,
                dedup: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            },
            rx,
        ))
    }

    /// Get local socket address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Run the Comm server
    pub async fn run(self) -> Result<()> {
        let mut buf = vec![0u8; self.config.max_payload_bytes + 1024];
        let mut cleanup_interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, addr)) => {
                            let packet = &buf[..len];
                            if let Err(e) = self.handle_packet(packet, addr).await {
                                warn!(client = %addr, error = %e, "failed to handle packet");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "recv error");
                            return Err(CommError::RecvError(e.to_string()));
                        }
                    }
                }
                _ = cleanup_interval.tick() => {
                    self.cleanup_dedup().await;
                }
            }
        }
    }

    async fn send(&self, bytes: &[u8], client_addr: SocketAddr) -> Result<()> {
        self.socket
            .send_to(bytes, client_addr)
            .await
            .map(|_| ())
            .map_err(|e| CommError::SendError(e.to_string()))
    }

    async fn handle_packet(&self, packet: &[u8], client_addr: SocketAddr) -> Result<()> {
        if packet.len() < HEADER_LEN {
            warn!(client = %client_addr, len = packet.len(), "truncated packet");
            return Err(CommError::DecodeError("Packet too short".to_string()));
        }

        let payload_len = packet.len() - HEADER_LEN;
        if payload_len > self.config.max_payload_bytes {
            warn!(client = %client_addr, len = payload_len, "payload too large");
            return Err(CommError::PayloadTooLarge(payload_len));
        }

        let (msg_type, seq) = decode_header(packet)?;
        debug!(client = %client_addr, msg_type = msg_type as u8, seq, "received packet");

        match msg_type {
            MsgType::Request => self.handle_request(&packet[HEADER_LEN..], seq, client_addr).await,
            _ => {
                warn!(client = %client_addr, msg_type = msg_type as u8, "unexpected message type");
                Ok(())
            }
        }
    }

    /// Handle an incoming REQUEST
    ///
    /// Duplicates are answered from the cache (or with another ACK while the
    /// original is still running). New requests are forwarded to the main
    /// loop; their progress is relayed until the response arrives.
    async fn handle_request(&self, payload_bytes: &[u8], seq: u32, client_addr: SocketAddr) -> Result<()> {
        let mut dedup = self.dedup.lock().await;
        let client_entries = dedup.entry(client_addr).or_default();

        if client_entries.len() >= self.config.dedup_capacity {
            let oldest_seq = client_entries
                .iter()
                .min_by_key(|(_, e)| e.instant)
                .map(|(seq, _)| *seq);
            if let Some(seq_to_remove) = oldest_seq {
                client_entries.remove(&seq_to_remove);
                debug!(seq = seq_to_remove, "dedup table at capacity, dropped oldest entry");
            }
        }

        match client_entries.entry(seq) {
            Entry::Occupied(entry) => {
                let reply = match &entry.get().cached_response {
                    Some(cached) => {
                        info!(client = %client_addr, seq, "duplicate request, resending cached response");
                        cached.clone()
                    }
                    None => {
                        debug!(client = %client_addr, seq, "duplicate request still running, resending ACK");
                        encode_request_ack(seq)?
                    }
                };
                drop(dedup);
                self.send(&reply, client_addr).await
            }
            Entry::Vacant(entry) => {
                // Registered before processing so retries during the run are recognized
                entry.insert(DedupEntry {
                    instant: Instant::now(),
                    cached_response: None,
                });
                drop(dedup);

                let request_payload = decode_request_payload(payload_bytes)?;
                info!(
                    client = %client_addr,
                    seq,
                    content_len = request_payload.content.len(),
                    "new request"
                );

                self.send(&encode_request_ack(seq)?, client_addr).await?;
                debug!(client = %client_addr, seq, "sent REQUEST_ACK");

                let (reply_tx, reply_rx) = oneshot::channel::<UserResponse>();
                let (progress_tx, progress_rx) = mpsc::unbounded_channel::<ProgressPayload>();
                let user_request = UserRequest {
                    content: request_payload.content,
                    reply: reply_tx,
                    progress: progress_tx,
                    source_addr: client_addr,
                };

                if let Err(e) = self.loop_sender.send(user_request).await {
                    error!(error = %e, "failed to forward request to main loop");
                    let response = encode_response(seq, &ResponsePayload {
                        content: "Internal server error".to_string(),
                        is_error: true,
                    })?;
                    self.send(&response, client_addr).await?;
                    return Err(CommError::ChannelClosed);
                }

                let response = self.relay_until_response(seq, client_addr, reply_rx, progress_rx).await;
                let response_bytes = encode_response(seq, &response)?;
                self.send(&response_bytes, client_addr).await?;
                debug!(client = %client_addr, seq, is_error = response.is_error, "sent RESPONSE");

                let mut dedup = self.dedup.lock().await;
                if let Some(client_entries) = dedup.get_mut(&client_addr) {
                    client_entries.insert(
                        seq,
                        DedupEntry {
                            instant: Instant::now(),
                            cached_response: Some(response_bytes),
                        },
                    );
                }
                Ok(())
            }
        }
    }

    /// Forward progress packets until the main loop replies or time runs out
    ///
    /// Progress already queued when the reply lands is sent first; the
    /// receiver is dropped before returning, so nothing follows the response.
    async fn relay_until_response(
        &self,
        seq: u32,
        client_addr: SocketAddr,
        mut reply_rx: oneshot::Receiver<UserResponse>,
        mut progress_rx: mpsc::UnboundedReceiver<ProgressPayload>,
    ) -> ResponsePayload {
        let deadline = tokio::time::sleep(Duration::from_secs(self.config.response_timeout_secs));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                Some(update) = progress_rx.recv() => {
                    match encode_progress(seq, &update) {
                        Ok(bytes) => {
                            if let Err(e) = self.send(&bytes, client_addr).await {
                                warn!(client = %client_addr, seq, error = %e, "failed to send progress");
                            }
                        }
                        Err(e) => warn!(seq, error = %e, "failed to encode progress"),
                    }
                }
                response = &mut reply_rx => {
                    return match response {
                        Ok(response) => ResponsePayload {
                            content: response.content,
                            is_error: response.is_error,
                        },
                        Err(_) => {
                            warn!(seq, "channel closed without response");
                            ResponsePayload {
                                content: "No response from console".to_string(),
                                is_error: true,
                            }
                        }
                    };
                }
                _ = &mut deadline => {
                    warn!(seq, "timeout waiting for response");
                    return ResponsePayload {
                        content: "Response timeout".to_string(),
                        is_error: true,
                    };
                }
            }
        }
    }

    /// Cleanup expired entries from the deduplication table
    async fn cleanup_dedup(&self) {
        let mut dedup = self.dedup.lock().await;
        let ttl = Duration::from_secs(self.config.dedup_ttl_secs);
        let now = Instant::now();

        for entries in dedup.values_mut() {
            entries.retain(|_seq, entry| now.duration_since(entry.instant) < ttl);
        }
        dedup.retain(|_addr, entries| !entries.is_empty());

        debug!(clients = dedup.len(), "dedup table cleaned");
    }
}
