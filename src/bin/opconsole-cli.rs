//! opconsole CLI client
//!
//! Sends operator commands to the opconsole daemon over UDP and prints
//! progress updates while a command runs. Uses rustyline for line editing
//! and history; a line ending in `\` continues on the next one.

use clap::Parser;
use rmp_serde::decode::Deserializer;
use rmp_serde::encode::Serializer;
use rustyline::Editor;
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const HEADER_LEN: usize = 5;

/// Message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum MsgType {
    Request = 0x01,
    RequestAck = 0x02,
    Response = 0x03,
    Progress = 0x04,
}

impl MsgType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(MsgType::Request),
            0x02 => Some(MsgType::RequestAck),
            0x03 => Some(MsgType::Response),
            0x04 => Some(MsgType::Progress),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestPayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ResponsePayload {
    content: String,
    is_error: bool,
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    elapsed_ms: u64,
    content: String,
}

/// CLI arguments
#[derive(Debug, Parser)]
#[command(name = "opconsole-cli")]
#[command(about = "opconsole daemon CLI client")]
struct Args {
    /// Daemon address (e.g., 127.0.0.1:9710)
    #[arg(short, long, default_value = "127.0.0.1:9710")]
    target: SocketAddr,

    /// ACK timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,

    /// Seconds of silence (no progress, no response) before giving up
    #[arg(long, default_value = "660")]
    idle_timeout: u64,

    /// Maximum retry attempts
    #[arg(short, long, default_value = "3")]
    max_retries: u32,

    /// History file path
    #[arg(long)]
    history_file: Option<PathBuf>,

    /// Send one command, print the reply and exit
    #[arg(short, long)]
    command: Option<String>,
}

/// CLI configuration
#[derive(Debug, Clone)]
struct Config {
    target: SocketAddr,
    ack_timeout_secs: u64,
    idle_timeout_secs: u64,
    max_retries: u32,
    history_file: PathBuf,
}

impl Config {
    fn from_args(args: &Args) -> Self {
        let history_file = args.history_file.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|p| p.join(".opconsole_history"))
                .unwrap_or_else(|| PathBuf::from(".opconsole_history"))
        });

        Self {
            target: args.target,
            ack_timeout_secs: args.timeout,
            idle_timeout_secs: args.idle_timeout,
            max_retries: args.max_retries,
            history_file,
        }
    }
}

/// One packet from the daemon that belongs to the current request
enum Incoming {
    Ack,
    Progress(ProgressPayload),
    Response(ResponsePayload),
}

struct Client {
    socket: UdpSocket,
    config: Config,
    seq: AtomicU32,
}

impl Client {
    async fn new(config: Config) -> io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;

        Ok(Self {
            socket,
            config,
            seq: AtomicU32::new(1),
        })
    }

    /// Send a request, print progress as it arrives, return the response
    async fn send_request(&self, content: String) -> io::Result<ResponsePayload> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);

        let payload = RequestPayload { content };
        let mut payload_bytes = Vec::new();
        let mut ser = Serializer::new(&mut payload_bytes);
        payload
            .serialize(&mut ser)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut packet = vec![MsgType::Request as u8];
        packet.extend_from_slice(&seq.to_be_bytes());
        packet.extend_from_slice(&payload_bytes);

        for _attempt in 0..self.config.max_retries {
            self.socket.send_to(&packet, self.config.target).await?;

            let ack_wait = Duration::from_secs(self.config.ack_timeout_secs);
            match self.next_packet(seq, ack_wait).await? {
                // A fast command may answer before the ACK is read
                Some(Incoming::Response(response)) => return Ok(response),
                Some(Incoming::Ack) | Some(Incoming::Progress(_)) => {}
                None => continue,
            }

            match self.wait_for_response(seq).await? {
                Some(response) => return Ok(response),
                None => {
                    eprintln!("[warning] Response timeout, retrying...");
                    continue;
                }
            }
        }

        Err(io::Error::new(io::ErrorKind::TimedOut, "opconsole not responding"))
    }

    /// Print progress until the response lands or the daemon goes quiet
    async fn wait_for_response(&self, seq: u32) -> io::Result<Option<ResponsePayload>> {
        let idle = Duration::from_secs(self.config.idle_timeout_secs);
        loop {
            match self.next_packet(seq, idle).await? {
                Some(Incoming::Response(response)) => return Ok(Some(response)),
                Some(Incoming::Progress(update)) => {
                    print!("\r");
                    println!("[progress {:.1}s]", update.elapsed_ms as f64 / 1000.0);
                    println!("{}", update.content);
                    io::stdout().flush()?;
                }
                Some(Incoming::Ack) => {}
                None => return Ok(None),
            }
        }
    }

    /// Next packet for `expected_seq`; stale or foreign packets are skipped
    ///
    /// Returns `None` when nothing relevant arrives within `wait`.
    async fn next_packet(&self, expected_seq: u32, wait: Duration) -> io::Result<Option<Incoming>> {
        let mut buf = vec![0u8; 65536];
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let (len, addr) = match timeout(remaining, self.socket.recv_from(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };

            if addr != self.config.target || len < HEADER_LEN {
                continue;
            }
            let seq = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
            if seq != expected_seq {
                continue;
            }

            let body = &buf[HEADER_LEN..len];
            match MsgType::from_u8(buf[0]) {
                Some(MsgType::RequestAck) => return Ok(Some(Incoming::Ack)),
                Some(MsgType::Progress) => return Ok(Some(Incoming::Progress(decode(body)?))),
                Some(MsgType::Response) => return Ok(Some(Incoming::Response(decode(body)?))),
                _ => continue,
            }
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> io::Result<T> {
    let mut de = Deserializer::new(bytes);
    Deserialize::deserialize(&mut de).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn print_response(response: &ResponsePayload) {
    if response.is_error {
        println!("[error] {}", response.content);
    } else {
        println!("{}", response.content);
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let config = Config::from_args(&args);

    if let Ok(lang) = std::env::var("LANG")
        && !lang.to_lowercase().contains("utf-8")
        && !lang.to_lowercase().contains("utf8")
    {
        eprintln!("[warning] Terminal locale is not UTF-8. Non-ASCII characters may not display correctly.");
    }

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    rt.block_on(async {
        match args.command {
            Some(command) => run_once(config, command).await,
            None => run_client(config).await,
        }
    })
}

async fn run_once(config: Config, command: String) -> io::Result<()> {
    let client = Client::new(config).await?;
    let response = client.send_request(command).await?;
    print_response(&response);
    if response.is_error {
        std::process::exit(1);
    }
    Ok(())
}

/// Read one command, joining lines that end in a backslash
fn read_command(rl: &mut Editor<(), FileHistory>) -> Result<String, ReadlineError> {
    let mut lines = Vec::new();
    let mut prompt = "> ";
    loop {
        let line = rl.readline(prompt)?;
        match line.strip_suffix('\\') {
            Some(head) => {
                lines.push(head.to_string());
                prompt = ". ";
            }
            None => {
                lines.push(line);
                return Ok(lines.join("\n"));
            }
        }
    }
}

async fn run_client(config: Config) -> io::Result<()> {
    let client = Client::new(config.clone()).await?;

    let mut rl: Editor<(), FileHistory> = Editor::new().map_err(io::Error::other)?;

    if config.history_file.exists()
        && let Err(e) = rl.load_history(&config.history_file)
    {
        eprintln!("[warning] Failed to load history: {}", e);
    }

    println!("opconsole-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("Target: {}", client.config.target);
    println!("Type 'help' for commands. End a line with \\ to continue it. Ctrl+D to quit.");
    println!();

    loop {
        match read_command(&mut rl) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(input);

                print!("[waiting...]");
                io::stdout().flush()?;

                match client.send_request(input.to_string()).await {
                    Ok(response) => {
                        print!("\r");
                        print_response(&response);
                    }
                    Err(e) => {
                        print!("\r");
                        println!("[error] {}", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("[error] Readline error: {}", e);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(&config.history_file) {
        eprintln!("[warning] Failed to save history: {}", e);
    }

    println!("\nGoodbye!");
    Ok(())
}
