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

//! # Data-parallel process management
//!
//! The launcher process spawns one worker per device (`spawn_workers`) and joins them
//! (`wait_for_workers`). Each worker joins a `ProcessGroup` through a TCP rendezvous on the
//! loopback interface, and the group synchronizes all ranks at startup and teardown.
//!
//! Only one job can run per host with the default rendezvous port (`12355`); set `MASTER_PORT`
//! to run several jobs side by side.

mod launcher;
mod process_group;

pub use launcher::{
    configure_worker, spawn_workers, wait_for_workers, WorkerEnvironment, LOCAL_RANK_ENV,
    RANK_ENV, WORLD_SIZE_ENV,
};
pub use process_group::{
    ProcessGroup, RendezvousConfig, DEFAULT_MASTER_ADDR, DEFAULT_MASTER_PORT,
    DEFAULT_RENDEZVOUS_TIMEOUT, MASTER_ADDR_ENV, MASTER_PORT_ENV,
};
