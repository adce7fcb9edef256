use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::{mpsc, oneshot};

/// Message types for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Client → console: operator command text
    Request = 0x01,
    /// Console → client: request received
    RequestAck = 0x02,
    /// Console → client: final reply, ends the sequence
    Response = 0x03,
    /// Console → client: interim output while the request runs
    Progress = 0x04,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::RequestAck),
            0x03 => Some(Self::Response),
            0x04 => Some(Self::Progress),
            _ => None,
        }
    }
}

/// Request payload from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Operator command text
    pub content: String,
}

/// Final reply payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub content: String,
    /// Whether the command was rejected or failed to dispatch
    pub is_error: bool,
}

/// Interim message for a running request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Time since the request started
    pub elapsed_ms: u64,
    pub content: String,
}

/// Request sent from Comm to the main loop
#[derive(Debug)]
pub struct UserRequest {
    /// Operator command text
    pub content: String,
    /// Channel for the final response
    pub reply: oneshot::Sender<UserResponse>,
    /// Interim messages; nothing sent here after `reply` is delivered
    pub progress: mpsc::UnboundedSender<ProgressPayload>,
    /// Client source address
    pub source_addr: SocketAddr,
}

/// Response sent from the main loop to Comm
#[derive(Debug)]
pub struct UserResponse {
    pub content: String,
    pub is_error: bool,
}

impl UserResponse {
    pub fn new(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: String) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}
