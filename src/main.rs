// Copyright 2026 Daniel Pelikan
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

//! Terminal Texting

use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use terminal_texting::bluetooth::{RfcommTransport, Session};
use terminal_texting::config::{Config, LoggingConfig};
use terminal_texting::console::{spawn_line_reader, Command, Console, ParseError, HELP};

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("terminal_texting={}", config.level).parse()?);

    // Keep log lines out of the conversation when a file is configured.
    let (file_layer, stderr_layer) = match &config.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

fn print_lines<I: IntoIterator<Item = String>>(lines: I) {
    let stamp = chrono::Local::now().format("%H:%M:%S");
    for line in lines {
        println!("[{}] {}", stamp, line);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_logging(&config.logging)?;

    info!(
        "Starting Terminal Texting v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let transport = Arc::new(RfcommTransport::new(config.bluetooth.channel).await?);
    info!("Bluetooth adapter: {}", transport.adapter_name());

    let (session, mut events) = Session::new(transport, config.session_config());
    let mut console = Console::new(session);

    println!("{}", HELP);
    let mut input = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));

    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else {
                    info!("Input closed");
                    break;
                };
                match Command::parse(&line) {
                    Ok(command) => {
                        let reply = console.apply(command).await;
                        print_lines(reply.lines);
                        if reply.quit {
                            break;
                        }
                    }
                    Err(ParseError::Empty) => {}
                    Err(e) => print_lines([e.to_string()]),
                }
            }
            batch = events.wait_and_drain() => {
                for event in batch {
                    print_lines(console.handle_event(event));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    console.shutdown().await;
    for event in events.try_drain() {
        print_lines(console.handle_event(event));
    }
    if console.pending_writes() > 0 {
        error!("{} write(s) unresolved at exit", console.pending_writes());
    }

    info!("Terminal Texting stopped");
    Ok(())
}
