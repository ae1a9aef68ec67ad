//! Terminal interaction surface.
//!
//! Parses line commands into session events and renders UI projections as
//! JSON lines on stdout. Diagnostics go to stderr through the logger.

use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::analysis::ImageCandidate;
use crate::error::ClientError;
use crate::state_machine::Event;
use crate::{StateLoopHandle, UiState};

pub const HELP: &str = "commands: select <path> | submit <path> | analyze | clear | audio | \
play | seek <0..1> | volume <0..1> | rate <0.5..2> | help | quit";

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(String),
    Submit(String),
    Analyze,
    Clear,
    Audio,
    TogglePlay,
    Seek(f32),
    Volume(f32),
    Rate(f32),
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };

    let path_arg = |verb: &str| {
        if arg.is_empty() {
            Err(format!("{} needs a file path", verb))
        } else {
            Ok(arg.to_string())
        }
    };
    let number_arg = |verb: &str| {
        arg.parse::<f32>()
            .map_err(|_| format!("{} needs a number, got {:?}", verb, arg))
    };

    match verb.to_ascii_lowercase().as_str() {
        "select" => path_arg("select").map(Command::Select),
        "submit" => path_arg("submit").map(Command::Submit),
        "analyze" => Ok(Command::Analyze),
        "clear" => Ok(Command::Clear),
        "audio" | "listen" => Ok(Command::Audio),
        "play" | "pause" => Ok(Command::TogglePlay),
        "seek" => number_arg("seek").map(Command::Seek),
        "volume" => number_arg("volume").map(Command::Volume),
        "rate" => number_arg("rate").map(Command::Rate),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command {:?}", other)),
    }
}

/// MIME type for a picked file, from its extension. Unknown types are empty.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "tif" | "tiff" => "image/tiff",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        _ => "",
    }
}

/// Read a file from disk into an unvalidated candidate.
pub async fn load_candidate(path: &Path) -> std::io::Result<ImageCandidate> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(ImageCandidate {
        file_name,
        mime_type: mime_from_path(path).to_string(),
        bytes,
    })
}

/// Output side of the surface.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, ui: &UiState);
    fn notice(&self, error: &ClientError);
}

/// Prints UI projections as JSON lines, the payload a frontend would receive.
pub struct TerminalRenderer;

impl Renderer for TerminalRenderer {
    fn render(&self, ui: &UiState) {
        match serde_json::to_string(ui) {
            Ok(json) => println!("{}", json),
            Err(e) => log::warn!("Failed to serialize UI state: {}", e),
        }
    }

    fn notice(&self, error: &ClientError) {
        println!(
            "{}",
            serde_json::json!({ "notice": error.kind(), "message": error.to_string() })
        );
    }
}

async fn command_to_event(command: Command) -> Option<Event> {
    match command {
        Command::Select(path) => load_for(&path).await.map(Event::SelectImage),
        Command::Submit(path) => load_for(&path).await.map(Event::SubmitImage),
        Command::Analyze => Some(Event::Analyze),
        Command::Clear => Some(Event::Clear),
        Command::Audio => Some(Event::RequestAudio),
        Command::TogglePlay => Some(Event::TogglePlayPause),
        Command::Seek(f) => Some(Event::Seek(f)),
        Command::Volume(v) => Some(Event::SetVolume(v)),
        Command::Rate(r) => Some(Event::SetRate(r)),
        Command::Help => {
            eprintln!("{}", HELP);
            None
        }
        Command::Quit => Some(Event::Exit),
    }
}

async fn load_for(path: &str) -> Option<ImageCandidate> {
    match load_candidate(Path::new(path)).await {
        Ok(candidate) => Some(candidate),
        Err(e) => {
            log::warn!("Could not read {}: {}", path, e);
            None
        }
    }
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run_input_loop(handle: StateLoopHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{}", HELP);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                break;
            }
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                if !line.trim().is_empty() {
                    eprintln!("{} ({})", e, HELP);
                }
                continue;
            }
        };

        let quitting = command == Command::Quit;
        if let Some(event) = command_to_event(command).await {
            if handle.send(event).await.is_err() {
                log::debug!("Input loop stopping - state loop gone");
                return;
            }
        }
        if quitting {
            return;
        }
    }

    log::info!("End of input, exiting");
    let _ = handle.send(Event::Exit).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_path_commands() {
        assert_eq!(
            parse_command("submit  photos/bottle 1.jpg "),
            Ok(Command::Submit("photos/bottle 1.jpg".to_string()))
        );
        assert!(parse_command("select").is_err());
    }

    #[test]
    fn parses_numeric_commands() {
        assert_eq!(parse_command("seek 0.25"), Ok(Command::Seek(0.25)));
        assert_eq!(parse_command("RATE 1.5"), Ok(Command::Rate(1.5)));
        assert!(parse_command("volume loud").is_err());
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("   ").is_err());
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_from_path(&PathBuf::from("a/B.JPG")), "image/jpeg");
        assert_eq!(mime_from_path(&PathBuf::from("notes.txt")), "text/plain");
        assert_eq!(mime_from_path(&PathBuf::from("README")), "");
    }

    #[tokio::test]
    async fn load_candidate_reads_bytes_and_labels_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("can.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let candidate = load_candidate(&path).await.unwrap();

        assert_eq!(candidate.file_name, "can.png");
        assert_eq!(candidate.mime_type, "image/png");
        assert_eq!(candidate.bytes.len(), 4);
    }
}
