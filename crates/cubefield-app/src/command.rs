//! Scripted user requests.

use std::str::FromStr;

use crate::error::CommandParseError;
use crate::renderer::CubeGridRenderer;

/// One user request against the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestCommand {
    /// Grow the lattice by one.
    Up,
    /// Shrink the lattice by one.
    Down,
    /// Flip between client-side arrays and GPU buffers.
    ToggleVbos,
    /// Flip between separate and interleaved buffers.
    ToggleStride,
}

impl RequestCommand {
    /// Forward to the matching renderer request. Returns whether a request
    /// was queued.
    pub fn apply(self, renderer: &mut CubeGridRenderer) -> bool {
        match self {
            Self::Up => renderer.increase_cube_count(),
            Self::Down => renderer.decrease_cube_count(),
            Self::ToggleVbos => renderer.toggle_vbos(),
            Self::ToggleStride => renderer.toggle_stride(),
        }
    }
}

impl FromStr for RequestCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" | "+" => Ok(Self::Up),
            "down" | "-" => Ok(Self::Down),
            "vbo" | "vbos" => Ok(Self::ToggleVbos),
            "stride" => Ok(Self::ToggleStride),
            other => Err(CommandParseError(other.to_string())),
        }
    }
}

/// Parse a comma-separated script such as `up,up,vbo,stride,down`.
/// Empty entries are skipped.
pub fn parse_script(script: &str) -> Result<Vec<RequestCommand>, CommandParseError> {
    script
        .split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script() {
        let commands = parse_script("up, UP,vbo,,stride,down").unwrap();
        assert_eq!(
            commands,
            vec![
                RequestCommand::Up,
                RequestCommand::Up,
                RequestCommand::ToggleVbos,
                RequestCommand::ToggleStride,
                RequestCommand::Down,
            ]
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let err = parse_script("up,sideways").unwrap_err();
        assert_eq!(err, CommandParseError("sideways".to_string()));
    }

    #[test]
    fn test_empty_script() {
        assert!(parse_script("").unwrap().is_empty());
    }
}
