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

use clap::Parser;
use tracing_subscriber::EnvFilter;
use translate_ddp::distributed::{RendezvousConfig, WorkerEnvironment};
use translate_ddp::pipelines::batch_translation::{launch, run_worker, TranslateArgs};
use translate_ddp::BatchTranslationError;

fn main() -> Result<(), BatchTranslationError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = TranslateArgs::parse().into_config();
    match WorkerEnvironment::from_env()? {
        Some(environment) => {
            let rendezvous = RendezvousConfig::from_env()?;
            run_worker(environment, &config, &rendezvous)?;
        }
        None => launch(&config)?,
    }
    Ok(())
}
