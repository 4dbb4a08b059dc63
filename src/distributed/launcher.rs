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
use crate::distributed::process_group::{RendezvousConfig, MASTER_ADDR_ENV, MASTER_PORT_ENV};
use std::process::{Child, Command, ExitStatus};
use std::thread;
use std::time::Duration;

pub const RANK_ENV: &str = "RANK";
pub const WORLD_SIZE_ENV: &str = "WORLD_SIZE";
pub const LOCAL_RANK_ENV: &str = "LOCAL_RANK";

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// # Rank assignment of a worker process
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkerEnvironment {
    pub rank: usize,
    pub world_size: usize,
    /// Device ordinal of the worker on its host
    pub local_rank: usize,
}

fn parse_variable(name: &str, value: &str) -> Result<usize, BatchTranslationError> {
    value.parse::<usize>().map_err(|_| {
        BatchTranslationError::InvalidConfigurationError(format!(
            "invalid value for {}: {}",
            name, value
        ))
    })
}

impl WorkerEnvironment {
    /// Reads the worker variables set by the launcher. Returns `None` in the launcher process
    /// itself (no `RANK` set).
    pub fn from_env() -> Result<Option<WorkerEnvironment>, BatchTranslationError> {
        let rank = match std::env::var(RANK_ENV) {
            Ok(value) => parse_variable(RANK_ENV, &value)?,
            Err(_) => return Ok(None),
        };
        let world_size = match std::env::var(WORLD_SIZE_ENV) {
            Ok(value) => parse_variable(WORLD_SIZE_ENV, &value)?,
            Err(_) => {
                return Err(BatchTranslationError::InvalidConfigurationError(format!(
                    "{} is set but {} is missing",
                    RANK_ENV, WORLD_SIZE_ENV
                )))
            }
        };
        let local_rank = match std::env::var(LOCAL_RANK_ENV) {
            Ok(value) => parse_variable(LOCAL_RANK_ENV, &value)?,
            Err(_) => rank,
        };
        if rank >= world_size {
            return Err(BatchTranslationError::InvalidConfigurationError(format!(
                "rank {} out of range for world size {}",
                rank, world_size
            )));
        }
        Ok(Some(WorkerEnvironment {
            rank,
            world_size,
            local_rank,
        }))
    }
}

/// Spawns one worker process per rank.
///
/// Each worker re-executes the current binary with the same command line arguments, and learns
/// its role from the `RANK`, `WORLD_SIZE`, `LOCAL_RANK`, `MASTER_ADDR` and `MASTER_PORT`
/// environment variables. All ranks run on the local host, `LOCAL_RANK` equals `RANK`.
pub fn spawn_workers(
    world_size: usize,
    rendezvous: &RendezvousConfig,
) -> Result<Vec<Child>, BatchTranslationError> {
    let current_exe = std::env::current_exe()?;
    let args: Vec<std::ffi::OsString> = std::env::args_os().skip(1).collect();

    let mut workers = Vec::with_capacity(world_size);
    for rank in 0..world_size {
        let mut command = Command::new(&current_exe);
        command.args(&args);
        tracing::info!(rank, world_size, "spawning translation worker");
        let child = configure_worker(&mut command, rank, world_size, rendezvous)
            .spawn()
            .map_err(|e| {
                BatchTranslationError::WorkerFailure(format!(
                    "failed to spawn worker rank {}: {}",
                    rank, e
                ))
            });
        match child {
            Ok(child) => workers.push(child),
            Err(error) => {
                kill_workers(&mut workers);
                return Err(error);
            }
        }
    }
    Ok(workers)
}

/// Sets the worker environment variables on `command`.
pub fn configure_worker<'a>(
    command: &'a mut Command,
    rank: usize,
    world_size: usize,
    rendezvous: &RendezvousConfig,
) -> &'a mut Command {
    command
        .env(RANK_ENV, rank.to_string())
        .env(WORLD_SIZE_ENV, world_size.to_string())
        .env(LOCAL_RANK_ENV, rank.to_string())
        .env(MASTER_ADDR_ENV, &rendezvous.master_addr)
        .env(MASTER_PORT_ENV, rendezvous.master_port.to_string())
}

fn kill_workers(workers: &mut [Child]) {
    for worker in workers.iter_mut() {
        let _ = worker.kill();
        let _ = worker.wait();
    }
}

/// Waits for all workers to exit.
///
/// As soon as one worker fails, the remaining workers are killed and an error naming the failed
/// rank is returned.
pub fn wait_for_workers(mut workers: Vec<Child>) -> Result<(), BatchTranslationError> {
    let mut statuses: Vec<Option<ExitStatus>> = workers.iter().map(|_| None).collect();
    loop {
        let mut failure = None;
        for (rank, worker) in workers.iter_mut().enumerate() {
            if statuses[rank].is_some() {
                continue;
            }
            if let Some(status) = worker.try_wait()? {
                if status.success() {
                    tracing::debug!(rank, "translation worker exited cleanly");
                    statuses[rank] = Some(status);
                } else {
                    tracing::error!(rank, ?status, "translation worker failed");
                    failure = Some((rank, status));
                    break;
                }
            }
        }
        if let Some((rank, status)) = failure {
            kill_workers(&mut workers);
            return Err(BatchTranslationError::WorkerFailure(format!(
                "worker rank {} exited with {}",
                rank, status
            )));
        }
        if statuses.iter().all(Option::is_some) {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}
