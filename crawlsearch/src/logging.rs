// Copyright 2024 Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::config::Configs;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::Config;

/// Configures structured logging for one binary. `component` names the
/// logger (`crawler`, `indexer`, `ranker`) so operators can filter by it.
pub fn configure_logging(component: &str, configs: &Configs) {
    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%dT%H:%M:%S%.3f)} {l} [{t}] - {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("out", Box::new(console)))
        .logger(Logger::builder().build(component, configs.log_level_filter()))
        .build(Root::builder().appender("out").build(configs.log_level_filter()));

    match config {
        Ok(config) => {
            if log4rs::init_config(config).is_err() {
                eprintln!("logging was already initialized");
            }
        }
        Err(err) => eprintln!("failed to configure logging: {err}"),
    }
}
