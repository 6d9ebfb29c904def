//! Console line parsing.
//!
//! One line, one command. Words are whitespace separated; the first word
//! picks the command.

use thiserror::Error;

use scenelink_core::commands::{AppCommand, SceneCommand};
use scenelink_core::config::parse_bool;
use scenelink_core::scene::Placement;

pub const HELP: &str = "\
commands:
  hold | hold on|off        toggle or set remote hold
  apply | discard           apply or drop deferred remote updates
  override_clear            clear the remote-override marker
  undo | redo | clear       local edit history / empty the scene
  place <id> <asset> <x> <z>
  move <id> <dx> <dz> | rotate <id> <deg> | remove <id>
  select <id>|none | edit   selection / toggle editing
  stats | sim               engine snapshots
  connect | disconnect | url <ws-url> | scene <id>
  cap_enable <id> | cap_disable <id>
  log_pause on|off | log_clear
  status | help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(AppCommand),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command '{0}', try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

fn number(word: Option<&str>, usage: &'static str) -> Result<f64, ConsoleError> {
    word.and_then(|word| word.parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .ok_or(ConsoleError::Usage(usage))
}

fn word(word: Option<&str>, usage: &'static str) -> Result<String, ConsoleError> {
    word.map(str::to_string).ok_or(ConsoleError::Usage(usage))
}

fn switch(word: Option<&str>, usage: &'static str) -> Result<bool, ConsoleError> {
    word.and_then(|word| parse_bool("console", word).ok())
        .ok_or(ConsoleError::Usage(usage))
}

fn scene(command: SceneCommand) -> ConsoleInput {
    ConsoleInput::Command(AppCommand::RunSceneCommand { command })
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let mut arg = || words.next();

    let input = match head.to_ascii_lowercase().as_str() {
        "hold" => match arg() {
            None => ConsoleInput::Command(AppCommand::ToggleSceneRemoteHold),
            some => ConsoleInput::Command(AppCommand::SetSceneRemoteHold {
                enabled: switch(some, "hold [on|off]")?,
            }),
        },
        "apply" => ConsoleInput::Command(AppCommand::ApplyDeferredSceneRemote),
        "discard" => ConsoleInput::Command(AppCommand::ClearSceneDeferredRemote),
        "override_clear" => ConsoleInput::Command(AppCommand::ClearSceneRemoteOverride),
        "undo" => ConsoleInput::Command(AppCommand::UndoSceneEdit),
        "redo" => ConsoleInput::Command(AppCommand::RedoSceneEdit),
        "clear" => ConsoleInput::Command(AppCommand::ClearScene),
        "stats" => ConsoleInput::Command(AppCommand::RequestEngineStats),
        "sim" => ConsoleInput::Command(AppCommand::RequestEngineSimPreview),
        "connect" => ConsoleInput::Command(AppCommand::SetBridgeEnabled { enabled: true }),
        "disconnect" => ConsoleInput::Command(AppCommand::SetBridgeEnabled { enabled: false }),
        "url" => ConsoleInput::Command(AppCommand::SetBridgeUrl {
            url: word(arg(), "url <ws-url>")?,
        }),
        "scene" => ConsoleInput::Command(AppCommand::SetSceneId {
            scene_id: word(arg(), "scene <id>")?,
        }),
        "edit" => ConsoleInput::Command(AppCommand::ToggleSceneEdit),
        "cap_enable" | "cap_disable" => ConsoleInput::Command(AppCommand::SetEngineCapabilityEnabled {
            capability_id: word(arg(), "cap_enable|cap_disable <id>")?,
            enabled: head.eq_ignore_ascii_case("cap_enable"),
        }),
        "place" => {
            const USAGE: &str = "place <id> <asset> <x> <z>";
            let id = word(arg(), USAGE)?;
            let asset_id = word(arg(), USAGE)?;
            let position_m = [number(arg(), USAGE)?, number(arg(), USAGE)?];
            scene(SceneCommand::UpsertPlacement {
                placement: Placement::new(id, asset_id, position_m),
            })
        }
        "move" => {
            const USAGE: &str = "move <id> <dx> <dz>";
            let id = word(arg(), USAGE)?;
            let delta_m = [number(arg(), USAGE)?, number(arg(), USAGE)?];
            scene(SceneCommand::MovePlacement { id, delta_m })
        }
        "rotate" => {
            const USAGE: &str = "rotate <id> <deg>";
            let id = word(arg(), USAGE)?;
            let delta_deg = number(arg(), USAGE)?;
            scene(SceneCommand::RotatePlacement { id, delta_deg })
        }
        "remove" => scene(SceneCommand::RemovePlacement {
            id: word(arg(), "remove <id>")?,
        }),
        "select" => {
            let target = word(arg(), "select <id>|none")?;
            let placement_id = (!target.eq_ignore_ascii_case("none")).then_some(target);
            ConsoleInput::Command(AppCommand::SetSelectedPlacement { placement_id })
        }
        "log_pause" => ConsoleInput::Command(AppCommand::SetSceneEventLogPaused {
            enabled: switch(arg(), "log_pause on|off")?,
        }),
        "log_clear" => ConsoleInput::Command(AppCommand::ClearSceneEventLog),
        "status" => ConsoleInput::Status,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(line: &str) -> AppCommand {
        match parse_line(line) {
            Ok(Some(ConsoleInput::Command(command))) => command,
            other => panic!("expected command for '{line}', got {other:?}"),
        }
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_line("   "), Ok(None));
    }

    #[test]
    fn test_hold_forms() {
        assert_eq!(command("hold"), AppCommand::ToggleSceneRemoteHold);
        assert_eq!(command("hold on"), AppCommand::SetSceneRemoteHold { enabled: true });
        assert_eq!(command("HOLD off"), AppCommand::SetSceneRemoteHold { enabled: false });
        assert_eq!(parse_line("hold maybe"), Err(ConsoleError::Usage("hold [on|off]")));
    }

    #[test]
    fn test_scene_edits() {
        assert_eq!(
            command("move chair 0.5 -1"),
            AppCommand::RunSceneCommand {
                command: SceneCommand::MovePlacement {
                    id: "chair".into(),
                    delta_m: [0.5, -1.0]
                }
            }
        );
        assert_eq!(
            command("rotate chair 90"),
            AppCommand::RunSceneCommand {
                command: SceneCommand::RotatePlacement {
                    id: "chair".into(),
                    delta_deg: 90.0
                }
            }
        );
        assert!(matches!(parse_line("move chair 1"), Err(ConsoleError::Usage(_))));
        assert!(matches!(parse_line("move chair 1 NaN"), Err(ConsoleError::Usage(_))));
    }

    #[test]
    fn test_place_builds_placement() {
        match command("place lamp lamp-2 1 2") {
            AppCommand::RunSceneCommand {
                command: SceneCommand::UpsertPlacement { placement },
            } => {
                assert_eq!(placement.id, "lamp");
                assert_eq!(placement.asset_id, "lamp-2");
                assert_eq!(placement.position_m, [1.0, 2.0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_selection_and_capabilities() {
        assert_eq!(command("select none"), AppCommand::SetSelectedPlacement { placement_id: None });
        assert_eq!(
            command("select sofa"),
            AppCommand::SetSelectedPlacement {
                placement_id: Some("sofa".into())
            }
        );
        assert_eq!(
            command("cap_disable engine.stats"),
            AppCommand::SetEngineCapabilityEnabled {
                capability_id: "engine.stats".into(),
                enabled: false
            }
        );
    }

    #[test]
    fn test_meta_inputs() {
        assert_eq!(parse_line("status"), Ok(Some(ConsoleInput::Status)));
        assert_eq!(parse_line("exit"), Ok(Some(ConsoleInput::Quit)));
        assert_eq!(parse_line("fly"), Err(ConsoleError::Unknown("fly".into())));
    }
}
