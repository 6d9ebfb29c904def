//! scenelink studio — headless scene-sync client.
//!
//! Connects to the scene bridge, keeps the local scene in sync and takes
//! commands from stdin. `RUST_LOG` controls log output; `SCENELINK_*`
//! variables override the runtime config and the first argument, when
//! given, replaces the bridge URL.

mod console;
mod state;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

use scenelink_bridge::WsConnector;
use scenelink_core::config::RuntimeConfig;

use console::{parse_line, ConsoleInput, HELP};
use state::Studio;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let mut config = RuntimeConfig::from_env();
    if let Some(url) = std::env::args().nth(1) {
        config.bridge_url = url;
    }
    info!(
        "Starting scenelink studio: bridge {} scene {} profile {}",
        config.bridge_url,
        config.scene_id,
        config.capability_profile.as_str()
    );

    let mut studio = match Studio::new(config, WsConnector) {
        Ok(studio) => studio,
        Err(err) => {
            error!("capability setup failed: {err}");
            return;
        }
    };
    studio.start();
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            input = studio.next_input() => match input {
                Some(input) => studio.handle_input(input),
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_line(&line) {
                    Ok(Some(ConsoleInput::Command(command))) => {
                        let result = studio.dispatch(command);
                        for event in &result.emitted_events {
                            println!("{} {}", event.kind, event.payload);
                        }
                        for failure in &result.failures {
                            println!("capability {} failed: {}", failure.capability_id, failure.error);
                        }
                    }
                    Ok(Some(ConsoleInput::Status)) => println!("{}", studio.status_line()),
                    Ok(Some(ConsoleInput::Help)) => println!("{HELP}"),
                    Ok(Some(ConsoleInput::Quit)) => break,
                    Ok(None) => {}
                    Err(err) => println!("{err}"),
                },
                Ok(None) => break,
                Err(err) => {
                    warn!("stdin closed: {err}");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    studio.shutdown();
    info!(
        "scenelink studio stopped: {} events logged, bridge {}",
        studio.session().events().len(),
        studio.transport().status().as_str()
    );
}
