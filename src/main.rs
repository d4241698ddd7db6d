//! Deskbench - Desktop Task Benchmark Harness
//!
//! Records demonstrations, replays recorded sessions, and scores task
//! completion against declarative task configs.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use deskbench::app::cli::{Cli, Commands, ConfigAction};
use deskbench::app::config::Config;
use deskbench::eval::{build_comb, ConfirmationGate, TaskConfig, TaskPhase, TaskState};
use deskbench::record::{
    detect_remote, CaptureMode, EventData, Recorder, RecorderFeeds, RecorderOptions,
    ScreenOptions, SessionRecord, ShellGrabber, WindowManager, CHECKPOINT_INTERVAL, SESSION_FILE,
};
use deskbench::replay::Replayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first so we can use --verbose to set log level
    let cli = Cli::parse_args();

    // Initialize tracing (--verbose enables debug-level output)
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Load config
    let config = if let Some(path) = &cli.config {
        Config::load(path)?
    } else {
        Config::load_default()?
    };

    // Execute command
    match cli.command {
        Commands::Record {
            task,
            instruction,
            duration,
            output,
            screen,
            mode,
        } => {
            run_record(&task, &instruction, duration, output, screen, mode.into(), &config)?;
        }
        Commands::Replay { session, dry_run } => {
            run_replay(&session, dry_run, &config)?;
        }
        Commands::Eval {
            task,
            no_reset,
            yes,
        } => {
            run_eval(&task, no_reset, yes, &config)?;
        }
        Commands::Validate { task } => {
            run_validate(&task)?;
        }
        Commands::List { detailed } => {
            run_list(detailed, &config)?;
        }
        Commands::Delete { name, force } => {
            run_delete(&name, force, &config)?;
        }
        Commands::Init { force } => {
            run_init(force, &config)?;
        }
        Commands::Config { action } => {
            run_config(action, &config)?;
        }
    }

    Ok(())
}

fn run_record(
    task: &str,
    instruction: &str,
    duration: u64,
    output: Option<PathBuf>,
    screen: bool,
    mode: CaptureMode,
    config: &Config,
) -> anyhow::Result<()> {
    let out_dir = output.unwrap_or_else(|| config.storage.sessions_dir.join(task));
    std::fs::create_dir_all(&out_dir)?;

    recover_interrupted(&out_dir);

    let screen_options = if screen {
        if config.record.capture_command.is_empty() {
            anyhow::bail!("record.capture_command is not configured; cannot capture the screen");
        }
        let remote = config.record.remote || detect_remote();
        Some(ScreenOptions {
            region: config.record.region,
            source: Box::new(ShellGrabber::new(&config.record.capture_command)),
            wm: WindowManager::from_commands(
                &config.record.minimize_command,
                &config.record.restore_command,
                remote,
            ),
        })
    } else {
        None
    };

    let mut recorder = Recorder::new(
        task,
        instruction,
        RecorderOptions {
            fps: config.record.fps,
            ring_capacity: config.record.ring_capacity,
            stop_hotkey: config.record.stop_hotkey.clone(),
            screen: screen_options,
        },
    );
    recorder.reset()?;
    recorder.set_mode(mode);
    let mut feeds = recorder.start()?;

    info!("Recording task '{}'... Press Ctrl+C to stop", task);
    if duration > 0 {
        info!("Recording stops automatically after {}s", duration);
    }

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_handler.store(true, Ordering::SeqCst);
    })?;

    let events = spawn_stdin_feed()?;

    let started = Instant::now();
    let mut last_checkpoint = Instant::now();
    let mut stdin_open = true;

    // Recording loop
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            info!("Interrupted");
            break;
        }
        if duration > 0 && started.elapsed().as_secs() >= duration {
            info!("Duration limit reached");
            break;
        }
        if recorder.hotkey_pressed() {
            info!("Stop hotkey pressed");
            break;
        }

        loop {
            match events.try_recv() {
                Ok(data) => route_event(&mut recorder, &mut feeds, data),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    stdin_open = false;
                    break;
                }
            }
        }
        if !stdin_open {
            info!("Input stream closed");
            break;
        }

        if last_checkpoint.elapsed() >= CHECKPOINT_INTERVAL {
            if let Err(e) = recorder.checkpoint(&out_dir) {
                warn!("Checkpoint failed: {}", e);
            }
            last_checkpoint = Instant::now();
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    recorder.stop();
    let path = recorder.save(&out_dir)?;

    let stats = recorder.stats();
    info!("Recording stopped after {:.1}s", started.elapsed().as_secs_f64());
    println!("\nSession saved to {}", path.display());
    println!("  Frames: {}", stats.frames);
    println!(
        "  Input events: {} keyboard, {} mouse ({} dropped)",
        stats.keyboard.pushed,
        stats.mouse.pushed,
        stats.keyboard.dropped + stats.mouse.dropped
    );

    Ok(())
}

/// Route one decoded stdin event to the component that records it.
fn route_event(recorder: &mut Recorder, feeds: &mut RecorderFeeds, data: EventData) {
    match data {
        EventData::Pause => recorder.pause(),
        EventData::Resume => recorder.resume(),
        EventData::Command { command } => recorder.submit_code(&command),
        data if data.is_keyboard() => {
            feeds.keyboard.push(data);
        }
        data => {
            feeds.mouse.push(data);
        }
    }
}

/// Read JSON-encoded input events from stdin, one per line, until EOF.
fn spawn_stdin_feed() -> anyhow::Result<mpsc::Receiver<EventData>> {
    let (sender, receiver) = mpsc::channel();
    std::thread::Builder::new()
        .name("stdin-feed".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(_) => break,
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<EventData>(trimmed) {
                    Ok(data) => {
                        if sender.send(data).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed input line: {}", e),
                }
            }
        })?;
    Ok(receiver)
}

/// Promote checkpoints left behind by an interrupted recording to a
/// recovered session file.
fn recover_interrupted(dir: &Path) {
    for (tmp_path, session) in SessionRecord::recover_checkpoints(dir) {
        warn!(
            "Found checkpoint from an interrupted recording ({} actions)",
            session.action_count()
        );
        let recovered = dir.join("session.recovered.json");
        match session.save(&recovered) {
            Ok(()) => {
                let _ = std::fs::remove_file(&tmp_path);
                info!("Recovered session written to {}", recovered.display());
            }
            Err(e) => warn!("Could not recover checkpoint: {}", e),
        }
    }
}

fn run_replay(session: &Path, dry_run: bool, config: &Config) -> anyhow::Result<()> {
    let path = if session.is_dir() {
        session.join(SESSION_FILE)
    } else {
        session.to_path_buf()
    };
    if !path.exists() {
        anyhow::bail!("Session file not found: {}", path.display());
    }

    let record = SessionRecord::load(&path)?;
    info!(
        "Replaying '{}' ({} actions, {:.1}s)",
        record.task_id,
        record.action_count(),
        record.duration()
    );

    let mut replayer = if dry_run || config.replay.dry_run {
        Replayer::dry_run()
    } else {
        Replayer::shell(config.replay.commands.clone())
    };
    let stats = replayer.play(&record)?;

    println!(
        "Replayed {} actions ({} skipped)",
        stats.played, stats.skipped
    );

    Ok(())
}

fn run_eval(task: &Path, no_reset: bool, yes: bool, config: &Config) -> anyhow::Result<()> {
    let task_config = TaskConfig::from_file(task)?;
    info!(
        "Evaluating task '{}' ({} evaluators)",
        task_config.task_id,
        task_config.evals.len()
    );

    let state = Arc::new(TaskState::new());
    let required = config.eval.confirm_destructive && !yes;
    let gate = Arc::new(ConfirmationGate::new(Arc::clone(&state), required));
    let comb = build_comb(&task_config, gate)?;

    let done = Arc::new(AtomicBool::new(false));
    let responder = if required {
        Some(spawn_confirmation_responder(
            Arc::clone(&state),
            Arc::clone(&done),
        )?)
    } else {
        None
    };

    state.begin();
    let outcome = (|| -> deskbench::Result<(f64, String)> {
        if !no_reset {
            comb.reset()?;
        }
        comb.evaluate()
    })();
    done.store(true, Ordering::SeqCst);
    if let Some(handle) = responder {
        let _ = handle.join();
    }

    let (score, feedback) = outcome?;
    state.finish(&format!("{score}"));

    println!("Task: {}", task_config.task_id);
    println!("Score: {score}");
    if !feedback.is_empty() {
        println!("Feedback:\n{feedback}");
    }

    Ok(())
}

/// Answer pending confirmation prompts from stdin until the eval finishes.
fn spawn_confirmation_responder(
    state: Arc<TaskState>,
    done: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    let handle = std::thread::Builder::new()
        .name("confirmation".to_string())
        .spawn(move || {
            while !done.load(Ordering::SeqCst) {
                if state.phase() == TaskPhase::WaitForInput {
                    println!("{} [y/N]", state.message());
                    let mut answer = String::new();
                    if std::io::stdin().read_line(&mut answer).is_err() {
                        answer.clear();
                    }
                    state.respond(answer.trim());
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        })?;
    Ok(handle)
}

fn run_validate(task: &Path) -> anyhow::Result<()> {
    if !task.exists() {
        anyhow::bail!("Task config not found: {}", task.display());
    }

    // Building the comb checks the schema and the evaluator types; unknown
    // step actions are only caught when a procedure runs.
    let outcome = (|| -> deskbench::Result<_> {
        let task_config = TaskConfig::from_file(task)?;
        let state = Arc::new(TaskState::new());
        let gate = Arc::new(ConfirmationGate::new(state, false));
        let comb = build_comb(&task_config, gate)?;
        Ok((task_config, comb))
    })();

    match outcome {
        Ok((task_config, comb)) => {
            let resets: usize = task_config
                .evals
                .iter()
                .map(|e| e.reset_procedure.len())
                .sum();
            let checks: usize = task_config
                .evals
                .iter()
                .map(|e| e.eval_procedure.len())
                .sum();

            println!("Validation PASSED");
            println!("  Task: {}", task_config.task_id);
            println!("  Evaluators: {}", comb.len());
            println!("  Reset steps: {}", resets);
            println!("  Checks: {}", checks);
            Ok(())
        }
        Err(e) => {
            println!("Validation FAILED: {}", e);
            anyhow::bail!("Task config {} is invalid", task.display())
        }
    }
}

fn run_list(detailed: bool, config: &Config) -> anyhow::Result<()> {
    let sessions_dir = &config.storage.sessions_dir;

    if !sessions_dir.exists() {
        println!("No sessions found in {}", sessions_dir.display());
        println!("Start a recording with: deskbench record --task <id>");
        return Ok(());
    }

    println!("Sessions in {}:", sessions_dir.display());

    let mut entries: Vec<_> = std::fs::read_dir(sessions_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().join(SESSION_FILE).exists())
        .collect();
    entries.sort_by_key(|e| e.path());

    for entry in &entries {
        let path = entry.path();
        let name = path.file_name().unwrap_or_default().to_string_lossy();

        if detailed {
            match SessionRecord::load(&path.join(SESSION_FILE)) {
                Ok(session) => {
                    println!(
                        "  {}  ({} actions, {:.1}s, video: {})",
                        name,
                        session.action_count(),
                        session.duration(),
                        if session.video.is_some() { "yes" } else { "no" }
                    );
                }
                Err(_) => {
                    println!("  {}  (failed to parse)", name);
                }
            }
        } else {
            println!("  {}", name);
        }
    }

    if entries.is_empty() {
        println!("  (none)");
        println!("Start a recording with: deskbench record --task <id>");
    }

    Ok(())
}

fn run_delete(name: &str, force: bool, config: &Config) -> anyhow::Result<()> {
    let target = config.storage.sessions_dir.join(name);
    if !target.join(SESSION_FILE).exists() {
        anyhow::bail!(
            "Session '{}' not found in {}",
            name,
            config.storage.sessions_dir.display()
        );
    }

    if !force {
        let session = SessionRecord::load(&target.join(SESSION_FILE))?;
        println!(
            "Will delete: {} ({} actions, recorded {})",
            target.display(),
            session.action_count(),
            session.recorded_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("Use --force to skip this prompt, or re-run with -f");
        return Ok(());
    }

    std::fs::remove_dir_all(&target)?;
    info!("Deleted session: {}", target.display());
    println!("Deleted: {}", target.display());

    Ok(())
}

fn run_init(force: bool, config: &Config) -> anyhow::Result<()> {
    let config_path = Config::default_path();

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    config.save_default()?;
    println!("Created config at {}", config_path.display());
    println!("\nConfig content:\n{}", config.to_toml()?);

    std::fs::create_dir_all(&config.storage.sessions_dir)?;
    println!(
        "Sessions directory: {}",
        config.storage.sessions_dir.display()
    );

    Ok(())
}

fn run_config(action: ConfigAction, config: &Config) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("Configuration ({}):\n", Config::default_path().display());
            println!("{}", config.to_toml()?);
        }
        ConfigAction::Get { key } => {
            let root: toml::Value = toml::from_str(&config.to_toml()?)?;
            match toml_lookup(&root, &key) {
                Some(v) => println!("{} = {}", key, v),
                None => {
                    anyhow::bail!("Configuration key '{}' not found", key);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let config_path = Config::default_path();
            if !config_path.exists() {
                anyhow::bail!("No config file found. Run 'deskbench init' first.");
            }

            let content = std::fs::read_to_string(&config_path)?;
            let mut root: toml::Value = toml::from_str(&content)?;
            if !toml_set(&mut root, &key, &value) {
                anyhow::bail!("Failed to set '{}'. Key may not exist in config.", key);
            }

            // Reject values the config schema or validation does not accept.
            let updated: Config = root
                .try_into()
                .map_err(|e| anyhow::anyhow!("Invalid value for '{}': {}", key, e))?;
            updated.validate()?;
            updated.save(&config_path)?;
            println!("Set {} = {}", key, value);
        }
        ConfigAction::Reset { force } => {
            let config_path = Config::default_path();

            if config_path.exists() && !force {
                println!("Config exists at {}", config_path.display());
                println!("Use --force to reset to defaults");
                return Ok(());
            }

            Config::default().save_default()?;
            println!(
                "Configuration reset to defaults at {}",
                config_path.display()
            );
        }
    }

    Ok(())
}

/// Walk a dotted key through nested TOML tables.
fn toml_lookup<'a>(root: &'a toml::Value, key: &str) -> Option<&'a toml::Value> {
    let mut current = root;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Set a dotted key to a value parsed as the type of the existing entry.
/// Returns false when the key does not exist or the value does not parse.
fn toml_set(root: &mut toml::Value, key: &str, value: &str) -> bool {
    let mut parts: Vec<&str> = key.split('.').collect();
    let leaf = match parts.pop() {
        Some(leaf) if !leaf.is_empty() => leaf,
        _ => return false,
    };

    let mut current = root;
    for part in parts {
        current = match current.get_mut(part) {
            Some(v) => v,
            None => return false,
        };
    }
    let table = match current.as_table_mut() {
        Some(table) => table,
        None => return false,
    };

    let parsed = match table.get(leaf) {
        Some(toml::Value::Integer(_)) => value.parse::<i64>().ok().map(toml::Value::Integer),
        Some(toml::Value::Float(_)) => value.parse::<f64>().ok().map(toml::Value::Float),
        Some(toml::Value::Boolean(_)) => value.parse::<bool>().ok().map(toml::Value::Boolean),
        Some(toml::Value::String(_)) => Some(toml::Value::String(value.to_string())),
        _ => None,
    };
    match parsed {
        Some(parsed) => {
            table.insert(leaf.to_string(), parsed);
            true
        }
        None => false,
    }
}
