/// A reviewer action typed on the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    /// Jump forward; the configured step when no count is given.
    Forward(Option<i64>),
    Back(Option<i64>),
    Jump(i64),
    Seek(i64),
    /// Set the start anchor, to the displayed frame when none is given.
    Start(Option<i64>),
    End(Option<i64>),
    Replay,
    Next,
    Save { label: String, commentary: String },
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  p                 play / pause
  f [n] | b [n]     jump forward / back (default: jump_step)
  j <offset>        jump by a signed offset
  g <frame>         go to frame
  s [frame]         set start anchor (default: current frame)
  e [frame]         set end anchor (default: current frame)
  r                 replay segment
  n                 next random segment
  w <label> [| commentary]
                    save the current segment
  ?                 status
  h                 help
  q                 quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word {
            "p" | "pause" | "play" => Self::TogglePause,
            "f" | "fwd" => Self::Forward(optional_number(rest)?),
            "b" | "back" => Self::Back(optional_number(rest)?),
            "j" | "jump" => Self::Jump(number(rest)?),
            "g" | "goto" => Self::Seek(number(rest)?),
            "s" | "start" => Self::Start(optional_number(rest)?),
            "e" | "end" => Self::End(optional_number(rest)?),
            "r" | "replay" => Self::Replay,
            "n" | "next" => Self::Next,
            "w" | "save" => {
                let (label, commentary) = rest.split_once('|').unwrap_or((rest, ""));
                let label = label.trim();
                if label.is_empty() {
                    return Err("save needs a label".to_string());
                }
                Self::Save {
                    label: label.to_string(),
                    commentary: commentary.trim().to_string(),
                }
            }
            "?" | "status" => Self::Status,
            "h" | "help" => Self::Help,
            "q" | "quit" => Self::Quit,
            "" => return Err("empty command".to_string()),
            other => return Err(format!("unknown command `{other}` (h for help)")),
        };
        Ok(command)
    }

    /// Signed frame offset of a relative move, `step` standing in for a
    /// missing count. `None` for every other command.
    pub fn offset(&self, step: i64) -> Option<i64> {
        match self {
            Self::Forward(count) => Some(count.unwrap_or(step)),
            Self::Back(count) => Some(count.unwrap_or(step).saturating_neg()),
            Self::Jump(offset) => Some(*offset),
            _ => None,
        }
    }
}

fn number(text: &str) -> Result<i64, String> {
    text.parse()
        .map_err(|_| format!("expected a frame number, got `{text}`"))
}

fn optional_number(text: &str) -> Result<Option<i64>, String> {
    if text.is_empty() {
        Ok(None)
    } else {
        number(text).map(Some)
    }
}
