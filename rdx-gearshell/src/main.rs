use anyhow::Result;
use colored::Colorize;
use gearbox::prelude::*;
use gearbox::{LIBRARY_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

const COMMANDS: &[&str] = &[
    "create", "destroy", "list", "gear", "perf", "up", "down", "start", "stop", "save", "all",
    "watch", "help", "exit",
];

/// Colours the command word by whether the shell knows it.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        if command.is_empty() {
            return Cow::Borrowed(line);
        }
        let command = if COMMANDS.contains(&command) {
            command.green().bold()
        } else {
            command.red()
        };
        if line.contains(' ') {
            Cow::Owned(format!("{} {}", command, rest.white()))
        } else {
            Cow::Owned(command.to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var_os("GEARSHELL_QUIET").is_some() {
        return;
    }
    println!("{}", include_str!("../logo.log").cyan());
    let rule = "=".repeat(60);
    println!("{}", rule.dimmed());
    println!(
        "  gearshell {}  |  {} {}",
        SHELL_VERSION.bold(),
        LIBRARY_NAME,
        LIB_VERSION.bold()
    );
    println!("  {}", "Set GEARSHELL_QUIET to skip this banner.".dimmed());
    println!("{}", rule.dimmed());
}

fn print_help() {
    println!("Available commands:");
    println!("  create <NAME> [MS] [TOP] - Creates a gearbox ticking every MS ms up to gear TOP.");
    println!("  destroy <NAME>           - Stops and removes a gearbox.");
    println!("  list                     - Shows every gearbox with its gear and drift.");
    println!("  gear <NAME>              - Prints the current gear.");
    println!("  perf <NAME>              - Prints the latest drift in milliseconds.");
    println!("  up <NAME> | down <NAME>  - Shifts one gear by hand.");
    println!("  start <NAME> | stop <NAME>");
    println!("  save [NAME]              - Persists one gear, or all of them.");
    println!("  all <OP>                 - Runs start|stop|up|down|gear|perf on every gearbox.");
    println!("  watch <NAME>             - Toggles printing of shift events.");
    println!("  exit                     - Saves and quits the shell.");
}

/// Prints the shift events of one controller until aborted.
fn spawn_watcher(controller: Controller) -> JoinHandle<()> {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if let Event::Shift(shift) = event {
                println!(
                    "\n<-- [SHIFT] {} {} -> {} ({})\n>> ",
                    controller.name().yellow(),
                    shift.from,
                    shift.to,
                    shift.direction()
                );
            }
        }
    })
}

async fn lookup(registry: &Registry, name: Option<&&str>) -> Option<Controller> {
    let Some(name) = name else {
        println!("Error: a gearbox name is required.");
        return None;
    };
    let controller = registry.get(name).await;
    if controller.is_none() {
        println!("Error: no gearbox named '{}'. Use 'list' to see them.", name);
    }
    controller
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    let registry = Registry::from_settings(&settings).await?;
    if registry.get(DEFAULT_INSTANCE).await.is_none() {
        registry
            .create(DEFAULT_INSTANCE, settings.defaults.clone())
            .await?;
    }
    info!("{} ready with {} instance(s)", LIBRARY_NAME, registry.len().await);

    let mut watchers: HashMap<String, JoinHandle<()>> = HashMap::new();

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!(
        "{} shell is running. Type 'help' for commands or 'exit' to quit.",
        LIBRARY_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => break,
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "create" => {
                let Some(name) = args.get(1) else {
                    println!("Usage: create <NAME> [MS] [TOP]");
                    continue;
                };
                let mut config = settings.defaults.clone();
                if let Some(ms) = args.get(2) {
                    match ms.parse::<u64>() {
                        Ok(ms) => config = config.with_interval_ms(ms),
                        Err(_) => {
                            println!("Error: '{}' is not a valid interval in milliseconds.", ms);
                            continue;
                        }
                    }
                }
                if let Some(top) = args.get(3) {
                    match top.parse::<u32>() {
                        Ok(top) => config = config.with_top(top),
                        Err(_) => {
                            println!("Error: '{}' is not a valid top gear.", top);
                            continue;
                        }
                    }
                }
                match registry.create(name, config).await {
                    Ok(controller) => println!(
                        "--> Created '{}' in gear {}.",
                        name,
                        controller.current_gear().await
                    ),
                    Err(err) => println!("Error: {}", err),
                }
            }
            "destroy" => {
                let Some(name) = args.get(1) else {
                    println!("Usage: destroy <NAME>");
                    continue;
                };
                if let Some(watcher) = watchers.remove(*name) {
                    watcher.abort();
                }
                if registry.destroy(name).await {
                    println!("--> Gearbox '{}' destroyed.", name);
                } else {
                    println!("Error: no gearbox named '{}'.", name);
                }
            }
            "list" => {
                println!("Gearboxes:");
                for name in registry.names().await {
                    if let Some(controller) = registry.get(&name).await {
                        let snapshot = controller.snapshot().await;
                        println!(
                            "  {:<16} gear {:>2}/{:<2} drift {:>6}ms  {}",
                            snapshot.name.yellow(),
                            snapshot.gear,
                            snapshot.top,
                            snapshot.performance,
                            snapshot.status.to_string().dimmed()
                        );
                    }
                }
            }
            "gear" => {
                if let Some(controller) = lookup(&registry, args.get(1)).await {
                    println!("--> {}", controller.current_gear().await);
                }
            }
            "perf" => {
                if let Some(controller) = lookup(&registry, args.get(1)).await {
                    println!("--> {}ms", controller.performance().await);
                }
            }
            "up" | "down" => {
                if let Some(controller) = lookup(&registry, args.get(1)).await {
                    let shifted = if *command == "up" {
                        controller.shift_up().await
                    } else {
                        controller.shift_down().await
                    };
                    if shifted {
                        println!("--> Now in gear {}.", controller.current_gear().await);
                    } else {
                        println!("--> Already at the limit.");
                    }
                }
            }
            "start" => {
                if let Some(controller) = lookup(&registry, args.get(1)).await {
                    if controller.start().await {
                        println!("--> Started.");
                    } else {
                        println!("--> Already running.");
                    }
                }
            }
            "stop" => {
                if let Some(controller) = lookup(&registry, args.get(1)).await {
                    controller.stop().await;
                    println!("--> Stopped.");
                }
            }
            "save" => match registry.save(args.get(1).copied()).await {
                Ok(count) => println!("--> Saved {} gear(s).", count),
                Err(err) => println!("Error: {}", err),
            },
            "all" => {
                let Some(op) = args.get(1) else {
                    println!("Usage: all <start|stop|up|down|gear|perf>");
                    continue;
                };
                match op.parse::<RegistryOp>() {
                    Ok(op) => {
                        for (name, outcome) in registry.all(op).await {
                            println!("  {:<16} {}", name.yellow(), outcome);
                        }
                    }
                    Err(err) => println!("Error: {}", err),
                }
            }
            "watch" => {
                let Some(name) = args.get(1) else {
                    println!("Usage: watch <NAME>");
                    continue;
                };
                if let Some(watcher) = watchers.remove(*name) {
                    watcher.abort();
                    println!("--> Stopped watching '{}'.", name);
                } else if let Some(controller) = lookup(&registry, Some(name)).await {
                    watchers.insert(name.to_string(), spawn_watcher(controller));
                    println!("--> Watching shifts of '{}'.", name);
                }
            }
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
        }
    }

    println!("Exiting gearshell...");
    if let Err(err) = registry.save(None).await {
        println!("Error: failed to save gears: {}", err);
    }
    registry.all(RegistryOp::Stop).await;
    Ok(())
}
