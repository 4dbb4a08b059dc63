// Copyright 2021 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::error::BatchTranslationError;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

pub const MASTER_ADDR_ENV: &str = "MASTER_ADDR";
pub const MASTER_PORT_ENV: &str = "MASTER_PORT";
pub const DEFAULT_MASTER_ADDR: &str = "localhost";
pub const DEFAULT_MASTER_PORT: u16 = 12355;
pub const DEFAULT_RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30 * 60);

const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Longest wait for the `Join` message of a freshly accepted connection
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// # Rendezvous address of the process group
#[derive(Clone, Debug, PartialEq)]
pub struct RendezvousConfig {
    pub master_addr: String,
    pub master_port: u16,
    /// Maximum time spent waiting for all ranks to join
    pub timeout: Duration,
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        RendezvousConfig {
            master_addr: DEFAULT_MASTER_ADDR.to_string(),
            master_port: DEFAULT_MASTER_PORT,
            timeout: DEFAULT_RENDEZVOUS_TIMEOUT,
        }
    }
}

impl RendezvousConfig {
    /// Reads `MASTER_ADDR` and `MASTER_PORT`, falling back to `localhost:12355`.
    pub fn from_env() -> Result<RendezvousConfig, BatchTranslationError> {
        let master_addr =
            std::env::var(MASTER_ADDR_ENV).unwrap_or_else(|_| DEFAULT_MASTER_ADDR.to_string());
        let master_port = match std::env::var(MASTER_PORT_ENV) {
            Ok(value) => value.parse::<u16>().map_err(|_| {
                BatchTranslationError::InvalidConfigurationError(format!(
                    "invalid {} value: {}",
                    MASTER_PORT_ENV, value
                ))
            })?,
            Err(_) => DEFAULT_MASTER_PORT,
        };
        Ok(RendezvousConfig {
            master_addr,
            master_port,
            ..Default::default()
        })
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
enum ControlMessage {
    Join { rank: usize, world_size: usize },
    Arrive { epoch: u64 },
    Release { epoch: u64 },
}

struct Peer {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Peer {
    fn new(stream: TcpStream) -> Result<Peer, BatchTranslationError> {
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Peer {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Bounds (or with `None`, lifts the bound on) the blocking reads of the peer.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), BatchTranslationError> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    fn send(&mut self, message: &ControlMessage) -> Result<(), BatchTranslationError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn receive(&mut self) -> Result<ControlMessage, BatchTranslationError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(BatchTranslationError::RendezvousError(
                "connection closed by peer".into(),
            ));
        }
        serde_json::from_str(line.trim_end()).map_err(|e| {
            BatchTranslationError::RendezvousError(format!("malformed control message: {}", e))
        })
    }
}

/// # Fixed-size group of worker processes
///
/// Rank 0 hosts a TCP rendezvous on `master_addr:master_port`; every other rank connects to it.
/// `init`, `barrier` and `destroy` block until all ranks have reached the same point.
/// A group of size 1 does not open any socket.
pub struct ProcessGroup {
    rank: usize,
    world_size: usize,
    epoch: u64,
    peers: Vec<Peer>,
}

impl ProcessGroup {
    /// Joins the process group, blocking until every rank has arrived.
    pub fn init(
        rank: usize,
        world_size: usize,
        config: &RendezvousConfig,
    ) -> Result<ProcessGroup, BatchTranslationError> {
        if world_size == 0 || rank >= world_size {
            return Err(BatchTranslationError::InvalidConfigurationError(format!(
                "invalid rank {} for world size {}",
                rank, world_size
            )));
        }
        let peers = if world_size == 1 {
            Vec::new()
        } else if rank == 0 {
            Self::host_rendezvous(world_size, config)?
        } else {
            vec![Self::join_rendezvous(rank, world_size, config)?]
        };
        tracing::info!(rank, world_size, "process group initialized");
        Ok(ProcessGroup {
            rank,
            world_size,
            epoch: 0,
            peers,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn world_size(&self) -> usize {
        self.world_size
    }

    fn host_rendezvous(
        world_size: usize,
        config: &RendezvousConfig,
    ) -> Result<Vec<Peer>, BatchTranslationError> {
        let listener = TcpListener::bind((config.master_addr.as_str(), config.master_port))
            .map_err(|e| {
                BatchTranslationError::RendezvousError(format!(
                    "could not bind {}:{}: {}",
                    config.master_addr, config.master_port, e
                ))
            })?;
        listener.set_nonblocking(true)?;
        let deadline = Instant::now() + config.timeout;

        let mut slots: Vec<Option<Peer>> = (1..world_size).map(|_| None).collect();
        let mut joined = 0;
        while joined < world_size - 1 {
            let (stream, address) = match listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() > deadline {
                        return Err(timed_out(joined, world_size));
                    }
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.as_millis() == 0 {
                return Err(timed_out(joined, world_size));
            }
            stream.set_nonblocking(false)?;
            let mut peer = Peer::new(stream)?;
            peer.set_read_timeout(Some(remaining.min(HANDSHAKE_TIMEOUT)))?;
            let message = match peer.receive() {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(
                        %address,
                        %error,
                        "ignoring connection without a join message"
                    );
                    continue;
                }
            };
            match message {
                ControlMessage::Join {
                    rank,
                    world_size: peer_world_size,
                } if peer_world_size == world_size && rank > 0 && rank < world_size => {
                    if slots[rank - 1].is_some() {
                        return Err(BatchTranslationError::RendezvousError(format!(
                            "rank {} joined twice",
                            rank
                        )));
                    }
                    peer.set_read_timeout(None)?;
                    tracing::debug!(rank, "rank joined the process group");
                    slots[rank - 1] = Some(peer);
                    joined += 1;
                }
                ControlMessage::Join {
                    rank,
                    world_size: peer_world_size,
                } => {
                    return Err(BatchTranslationError::RendezvousError(format!(
                        "rank {} joined with world size {}, expected rank < {}",
                        rank, peer_world_size, world_size
                    )));
                }
                message => {
                    tracing::warn!(
                        %address,
                        ?message,
                        "ignoring connection with unexpected message"
                    );
                }
            }
        }
        let mut peers: Vec<Peer> = slots.into_iter().flatten().collect();
        for peer in peers.iter_mut() {
            peer.send(&ControlMessage::Release { epoch: 0 })?;
        }
        Ok(peers)
    }

    fn join_rendezvous(
        rank: usize,
        world_size: usize,
        config: &RendezvousConfig,
    ) -> Result<Peer, BatchTranslationError> {
        let deadline = Instant::now() + config.timeout;
        let stream = loop {
            match TcpStream::connect((config.master_addr.as_str(), config.master_port)) {
                Ok(stream) => break stream,
                Err(e) => {
                    if Instant::now() > deadline {
                        return Err(BatchTranslationError::RendezvousError(format!(
                            "rank {} could not reach {}:{}: {}",
                            rank, config.master_addr, config.master_port, e
                        )));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };
        let mut peer = Peer::new(stream)?;
        peer.send(&ControlMessage::Join { rank, world_size })?;
        match peer.receive()? {
            ControlMessage::Release { epoch: 0 } => Ok(peer),
            message => Err(BatchTranslationError::RendezvousError(format!(
                "unexpected rendezvous reply {:?}",
                message
            ))),
        }
    }

    /// Blocks until every rank of the group has called `barrier`.
    pub fn barrier(&mut self) -> Result<(), BatchTranslationError> {
        self.epoch += 1;
        let epoch = self.epoch;
        if self.rank == 0 {
            for peer in self.peers.iter_mut() {
                match peer.receive()? {
                    ControlMessage::Arrive { epoch: arrived } if arrived == epoch => {}
                    message => {
                        return Err(BatchTranslationError::RendezvousError(format!(
                            "expected arrival at barrier {}, received {:?}",
                            epoch, message
                        )));
                    }
                }
            }
            for peer in self.peers.iter_mut() {
                peer.send(&ControlMessage::Release { epoch })?;
            }
        } else {
            for peer in self.peers.iter_mut() {
                peer.send(&ControlMessage::Arrive { epoch })?;
                match peer.receive()? {
                    ControlMessage::Release { epoch: released } if released == epoch => {}
                    message => {
                        return Err(BatchTranslationError::RendezvousError(format!(
                            "expected release of barrier {}, received {:?}",
                            epoch, message
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Waits for all ranks and releases the group.
    pub fn destroy(mut self) -> Result<(), BatchTranslationError> {
        self.barrier()?;
        tracing::info!(rank = self.rank, "process group destroyed");
        Ok(())
    }
}

fn timed_out(joined: usize, world_size: usize) -> BatchTranslationError {
    BatchTranslationError::RendezvousError(format!(
        "timed out with {} of {} ranks joined",
        joined + 1,
        world_size
    ))
}
