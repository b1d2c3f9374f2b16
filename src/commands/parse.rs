//! Command phrase parser.
//!
//! Phrase syntax: `[preamp] <command> [<args>] [add]`. The `preamp` prefix
//! may be omitted; an empty phrase reads the state. The trailing `add` token
//! turns the level-family commands into relative changes.

use crate::commands::{Command, GainControl, SwitchArg};
use crate::error::{PreampError, Result};
use crate::state::{Midside, Polarity, Solo};

/// Parse one request phrase into a [`Command`].
pub fn parse_phrase(phrase: &str) -> Result<Command> {
    let mut chunks: Vec<&str> = phrase.split_whitespace().collect();

    let add = if let Some(pos) = chunks.iter().position(|c| *c == "add") {
        chunks.remove(pos);
        true
    } else {
        false
    };

    // a bare phrase reads the state
    if chunks.is_empty() {
        return Ok(Command::State);
    }

    // the preamp prefix is optional; other surfaces live elsewhere
    match chunks[0] {
        "preamp" => {
            chunks.remove(0);
        }
        "player" | "aux" => {
            return Err(PreampError::validation(format!(
                "'{}' commands are not handled here",
                chunks[0]
            )));
        }
        _ => {}
    }

    let cmd = normalize(chunks.first().copied().unwrap_or("state"));
    let args = chunks.get(1..).unwrap_or(&[]).join(" ");

    build(cmd, &args, add)
}

/// Accepted aliases for some commands.
fn normalize(cmd: &str) -> &str {
    match cmd {
        "loudness" => "equal_loudness",
        "set_target" => "target",
        "drc" => "set_drc",
        "xo" => "set_xo",
        "input" => "set_input",
        other => other,
    }
}

fn build(cmd: &str, args: &str, add: bool) -> Result<Command> {
    let command = match cmd {
        "state" => Command::State,
        "get_inputs" => Command::GetInputs,
        "get_target_sets" => Command::GetTargetSets,
        "get_drc_sets" => Command::GetDrcSets,
        "get_xo_sets" => Command::GetXoSets,
        "get_engine_config" => Command::GetEngineConfig,
        "get_preamp_mixer" => Command::GetPreampMixer,
        "get_pipeline" => Command::GetPipeline,
        "get_drc_gain" => Command::GetDrcGain,

        "set_input" => Command::SetInput(args.to_string()),

        "mono" => Command::Mono(
            SwitchArg::parse(args)
                .ok_or_else(|| PreampError::validation("needs: on|off|toggle"))?,
        ),

        "midside" => Command::Midside(match args {
            "off" => Midside::Off,
            "mid" => Midside::Mid,
            "side" => Midside::Side,
            _ => return Err(PreampError::validation("must be in: off | mid | side")),
        }),

        "solo" => Command::Solo(match args.to_lowercase().as_str() {
            "l" => Solo::L,
            "r" => Solo::R,
            "off" => Solo::Off,
            _ => return Err(PreampError::validation("needs L|R|off")),
        }),

        "polarity" => Command::Polarity(
            Polarity::parse(args)
                .ok_or_else(|| PreampError::validation("must be in: ++ | -- | +- | -+"))?,
        ),

        "mute" => Command::Mute(
            SwitchArg::parse(args)
                .ok_or_else(|| PreampError::validation("needs: on|off|toggle"))?,
        ),

        "equal_loudness" => Command::EqualLoudness(
            SwitchArg::parse(args)
                .ok_or_else(|| PreampError::validation("needs: on|off|toggle"))?,
        ),

        "tone_defeat" => Command::ToneDefeat(
            SwitchArg::parse(args)
                .ok_or_else(|| PreampError::validation("needs: on|off|toggle"))?,
        ),

        "set_drc" => Command::SetDrc(args.to_string()),
        "set_xo" => Command::SetXo(args.to_string()),
        "target" => Command::Target(args.to_string()),

        "level" | "lu_offset" | "bass" | "treble" | "balance" => {
            let control = match cmd {
                "level" => GainControl::Level,
                "lu_offset" => GainControl::LuOffset,
                "bass" => GainControl::Bass,
                "treble" => GainControl::Treble,
                _ => GainControl::Balance,
            };
            Command::Gain {
                control,
                db: parse_db(args)?,
                add,
            }
        }

        _ => return Err(PreampError::validation("unknown command")),
    };

    Ok(command)
}

/// Parse a dB argument, rounded to 0.1 dB.
fn parse_db(args: &str) -> Result<f32> {
    let value: f32 = args
        .parse()
        .map_err(|_| PreampError::validation("needs a float value"))?;
    Ok((value * 10.0).round() / 10.0)
}
