//! Command-Line Interface

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::record::CaptureMode;

/// Deskbench - Record, replay, and score desktop task demonstrations
#[derive(Parser, Debug)]
#[command(name = "deskbench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a task demonstration (input events are read as JSON lines on
    /// stdin)
    Record {
        /// Task identifier
        #[arg(short, long)]
        task: String,

        /// Task instruction shown to the demonstrator
        #[arg(short, long, default_value = "")]
        instruction: String,

        /// Recording duration in seconds (0 = until stopped)
        #[arg(short, long, default_value = "0")]
        duration: u64,

        /// Output directory (defaults to <sessions_dir>/<task>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Capture screen frames as well as input
        #[arg(long)]
        screen: bool,

        /// Keystroke capture mode
        #[arg(long, value_enum, default_value_t = ModeArg::Typing)]
        mode: ModeArg,
    },

    /// Replay a recorded session
    Replay {
        /// Session directory or session.json path
        session: PathBuf,

        /// Log actions instead of injecting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Reset and score a task
    Eval {
        /// Task config JSON file
        task: PathBuf,

        /// Skip the reset procedure
        #[arg(long)]
        no_reset: bool,

        /// Approve destructive reset steps without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// Validate a task config file
    Validate {
        /// Task config JSON file
        task: PathBuf,
    },

    /// List recorded sessions
    List {
        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Delete a recorded session
    Delete {
        /// Session directory name under the sessions directory
        name: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Initialize configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "record.fps", "replay.dry_run")
        key: String,

        /// Value to set
        value: String,
    },

    /// Get a specific configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Keystroke capture mode argument.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Keystrokes only feed the stop hotkey
    Init,
    /// Log every press and release
    Typing,
    /// Accumulate keystrokes into code actions
    Coding,
}

impl From<ModeArg> for CaptureMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Init => CaptureMode::Init,
            ModeArg::Typing => CaptureMode::Typing,
            ModeArg::Coding => CaptureMode::Coding,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_record_command_with_defaults() {
        let args = vec!["deskbench", "record", "--task", "open-editor"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Record {
                task,
                instruction,
                duration,
                output,
                screen,
                mode,
            } => {
                assert_eq!(task, "open-editor");
                assert_eq!(instruction, "");
                assert_eq!(duration, 0);
                assert!(output.is_none());
                assert!(!screen);
                assert_eq!(mode, ModeArg::Typing);
            }
            _ => panic!("Expected Record command"),
        }
    }

    #[test]
    fn test_cli_parse_record_command_with_all_options() {
        let args = vec![
            "deskbench",
            "record",
            "--task", "open-editor",
            "--instruction", "Open the text editor",
            "--duration", "120",
            "--output", "/tmp/sessions/open-editor",
            "--screen",
            "--mode", "coding",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Record {
                task,
                instruction,
                duration,
                output,
                screen,
                mode,
            } => {
                assert_eq!(task, "open-editor");
                assert_eq!(instruction, "Open the text editor");
                assert_eq!(duration, 120);
                assert_eq!(output, Some(PathBuf::from("/tmp/sessions/open-editor")));
                assert!(screen);
                assert_eq!(mode, ModeArg::Coding);
            }
            _ => panic!("Expected Record command"),
        }
    }

    #[test]
    fn test_cli_record_requires_task() {
        let args = vec!["deskbench", "record"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parse_replay_command() {
        let args = vec!["deskbench", "replay", "/tmp/sessions/open-editor"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Replay { session, dry_run } => {
                assert_eq!(session, PathBuf::from("/tmp/sessions/open-editor"));
                assert!(!dry_run);
            }
            _ => panic!("Expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_replay_dry_run() {
        let args = vec!["deskbench", "replay", "s.json", "--dry-run"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Replay { dry_run, .. } => assert!(dry_run),
            _ => panic!("Expected Replay command"),
        }
    }

    #[test]
    fn test_cli_parse_eval_command() {
        let args = vec!["deskbench", "eval", "task.json"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Eval {
                task,
                no_reset,
                yes,
            } => {
                assert_eq!(task, PathBuf::from("task.json"));
                assert!(!no_reset);
                assert!(!yes);
            }
            _ => panic!("Expected Eval command"),
        }
    }

    #[test]
    fn test_cli_parse_eval_flags() {
        let args = vec!["deskbench", "eval", "task.json", "--no-reset", "-y"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Eval { no_reset, yes, .. } => {
                assert!(no_reset);
                assert!(yes);
            }
            _ => panic!("Expected Eval command"),
        }
    }

    #[test]
    fn test_cli_parse_validate_command() {
        let args = vec!["deskbench", "validate", "task.json"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Validate { task } => {
                assert_eq!(task, PathBuf::from("task.json"));
            }
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_cli_parse_list_command() {
        let args = vec!["deskbench", "list", "--detailed"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::List { detailed } => assert!(detailed),
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_cli_parse_list_command_defaults() {
        let args = vec!["deskbench", "list"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::List { detailed } => assert!(!detailed),
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_cli_parse_delete_command() {
        let args = vec!["deskbench", "delete", "open-editor"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Delete { name, force } => {
                assert_eq!(name, "open-editor");
                assert!(!force);
            }
            _ => panic!("Expected Delete command"),
        }
    }

    #[test]
    fn test_cli_parse_delete_command_force() {
        let args = vec!["deskbench", "delete", "open-editor", "--force"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Delete { force, .. } => assert!(force),
            _ => panic!("Expected Delete command"),
        }
    }

    #[test]
    fn test_cli_parse_init_command() {
        let args = vec!["deskbench", "init", "--force"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Init { force } => assert!(force),
            _ => panic!("Expected Init command"),
        }
    }

    #[test]
    fn test_cli_global_verbose_flag() {
        let args = vec!["deskbench", "--verbose", "list"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_global_config_flag() {
        let args = vec!["deskbench", "--config", "/path/to/config.toml", "list"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/path/to/config.toml")));
    }

    #[test]
    fn test_cli_shorthand_flags() {
        let args = vec!["deskbench", "-v", "-c", "/custom/config.toml", "list"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_cli_record_shorthand_flags() {
        let args = vec![
            "deskbench", "record", "-t", "demo", "-i", "Do it", "-d", "30",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Record {
                task,
                instruction,
                duration,
                ..
            } => {
                assert_eq!(task, "demo");
                assert_eq!(instruction, "Do it");
                assert_eq!(duration, 30);
            }
            _ => panic!("Expected Record command"),
        }
    }

    #[test]
    fn test_cli_invalid_command_fails() {
        let args = vec!["deskbench", "invalid-command"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_invalid_mode_fails() {
        let args = vec!["deskbench", "record", "-t", "x", "--mode", "verbatim"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_cli_parse_config_show() {
        let args = vec!["deskbench", "config", "show"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Config {
                action: ConfigAction::Show,
            } => {}
            _ => panic!("Expected Config Show"),
        }
    }

    #[test]
    fn test_cli_parse_config_set() {
        let args = vec!["deskbench", "config", "set", "record.fps", "30"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, "record.fps");
                assert_eq!(value, "30");
            }
            _ => panic!("Expected Config Set"),
        }
    }

    #[test]
    fn test_cli_parse_config_get() {
        let args = vec!["deskbench", "config", "get", "record.ring_capacity"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Config {
                action: ConfigAction::Get { key },
            } => {
                assert_eq!(key, "record.ring_capacity");
            }
            _ => panic!("Expected Config Get"),
        }
    }

    #[test]
    fn test_cli_parse_config_reset() {
        let args = vec!["deskbench", "config", "reset", "--force"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Config {
                action: ConfigAction::Reset { force },
            } => assert!(force),
            _ => panic!("Expected Config Reset"),
        }
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();

        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        assert!(subcommands.contains(&"record"));
        assert!(subcommands.contains(&"replay"));
        assert!(subcommands.contains(&"eval"));
        assert!(subcommands.contains(&"validate"));
        assert!(subcommands.contains(&"list"));
        assert!(subcommands.contains(&"delete"));
        assert!(subcommands.contains(&"init"));
        assert!(subcommands.contains(&"config"));
    }

    #[test]
    fn test_mode_arg_conversion() {
        assert_eq!(CaptureMode::from(ModeArg::Init), CaptureMode::Init);
        assert_eq!(CaptureMode::from(ModeArg::Typing), CaptureMode::Typing);
        assert_eq!(CaptureMode::from(ModeArg::Coding), CaptureMode::Coding);
    }
}
