//! Command-line interface for facelink
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Audio-driven facial animation streaming
#[derive(Parser, Debug)]
#[command(
    name = "facelink",
    version,
    about = "Audio-driven facial animation streaming"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to Unix socket (default: $XDG_RUNTIME_DIR/facelink.sock)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the animation pipeline in the foreground
    Daemon,

    /// Queue a WAV file for animated playback
    Submit {
        /// WAV file to play
        file: PathBuf,
    },

    /// Drop every clip waiting to be played
    Clear,

    /// Show queue depths and counters
    Status,

    /// Generate blendshapes for a WAV file without playing it
    Shapes {
        /// WAV file to animate
        file: PathBuf,

        /// Write a shapes CSV here instead of printing JSON rows
        #[arg(long, short = 'o', value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Rebuild shapes.csv for every saved clip
    Regen {
        /// Artifact directory (default: from configuration)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// List available audio output devices
    Devices,

    /// Stop the daemon
    Shutdown,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daemon() {
        let cli = Cli::try_parse_from(["facelink", "daemon"]).unwrap();
        assert!(matches!(cli.command, Commands::Daemon));
        assert!(cli.socket.is_none());
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_command_is_required() {
        assert!(Cli::try_parse_from(["facelink"]).is_err());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["facelink", "-vv", "status"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from([
            "facelink",
            "daemon",
            "--config",
            "/tmp/facelink.toml",
            "--socket",
            "/tmp/f.sock",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/facelink.toml")));
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/f.sock")));
        assert_eq!(cli.verbose, 1);
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from(["facelink", "submit", "hello.wav"]).unwrap();
        match cli.command {
            Commands::Submit { file } => assert_eq!(file, PathBuf::from("hello.wav")),
            other => panic!("Expected Submit, got {:?}", other),
        }
    }

    #[test]
    fn test_submit_requires_file() {
        assert!(Cli::try_parse_from(["facelink", "submit"]).is_err());
    }

    #[test]
    fn test_parse_shapes_with_output() {
        let cli =
            Cli::try_parse_from(["facelink", "shapes", "a.wav", "-o", "shapes.csv"]).unwrap();
        match cli.command {
            Commands::Shapes { file, output } => {
                assert_eq!(file, PathBuf::from("a.wav"));
                assert_eq!(output, Some(PathBuf::from("shapes.csv")));
            }
            other => panic!("Expected Shapes, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_regen_default_dir() {
        let cli = Cli::try_parse_from(["facelink", "regen"]).unwrap();
        assert!(matches!(cli.command, Commands::Regen { dir: None }));
    }

    #[test]
    fn test_parse_simple_commands() {
        let parse = |arg: &str| Cli::try_parse_from(["facelink", arg]).unwrap().command;
        assert!(matches!(parse("clear"), Commands::Clear));
        assert!(matches!(parse("status"), Commands::Status));
        assert!(matches!(parse("devices"), Commands::Devices));
        assert!(matches!(parse("shutdown"), Commands::Shutdown));
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["facelink", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }

    #[test]
    fn test_version_flag() {
        let err = Cli::try_parse_from(["facelink", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
