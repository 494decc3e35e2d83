//! Console session: explorer commands in, process output out

use anyhow::Result;
use app_core::{AppError, Workspace};
use app_fs::{Node, NodeKey};
use app_sandbox::{OutputStream, ProcessEvent};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

const HELP: &str = "\
Explorer:  tree | touch <dir> <name> | mkdir <dir> <name> | mv <path> <name> | rm <path>
           cp <path> | cut <path> | paste <dir> | cat <path> | write <path> <text...>
Sandbox:   sync | exec <cmd> [args...] | start <id> <cmd> [args...] | script <name> | dev
           stop <id> | ps | install [-D] <pkg> | uninstall <pkg> | packages | status | probe
Other:     help | quit
Use / for the project root.";

/// A parsed console command
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Quit,
    Tree,
    Touch { dir: String, name: String },
    Mkdir { dir: String, name: String },
    Rename { path: String, name: String },
    Delete { path: String },
    Copy { path: String },
    Cut { path: String },
    Paste { dir: String },
    Show { path: String },
    Write { path: String, text: String },
    Sync,
    Exec { command: String, args: Vec<String> },
    Start { id: String, command: String, args: Vec<String> },
    Script { name: String },
    Dev,
    Stop { id: String },
    Processes,
    Install { package: String, dev: bool },
    Uninstall { package: String },
    Packages,
    Status,
    Probe,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let arg = |i: usize| -> Result<String, String> {
            rest.get(i)
                .map(|s| s.to_string())
                .ok_or_else(|| format!("{}: missing argument {}", verb, i + 1))
        };
        let tail = |from: usize| -> Vec<String> { rest.iter().skip(from).map(|s| s.to_string()).collect() };

        let cmd = match verb {
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "tree" | "ls" => Command::Tree,
            "touch" => Command::Touch { dir: arg(0)?, name: arg(1)? },
            "mkdir" => Command::Mkdir { dir: arg(0)?, name: arg(1)? },
            "mv" => Command::Rename { path: arg(0)?, name: arg(1)? },
            "rm" => Command::Delete { path: arg(0)? },
            "cp" => Command::Copy { path: arg(0)? },
            "cut" => Command::Cut { path: arg(0)? },
            "paste" => Command::Paste { dir: arg(0)? },
            "cat" => Command::Show { path: arg(0)? },
            "write" => {
                let path = arg(0)?;
                // keep the text verbatim after the path
                let text = line
                    .trim_start()
                    .splitn(3, char::is_whitespace)
                    .nth(2)
                    .unwrap_or("")
                    .to_string();
                Command::Write { path, text }
            }
            "sync" => Command::Sync,
            "exec" => Command::Exec { command: arg(0)?, args: tail(1) },
            "start" => Command::Start { id: arg(0)?, command: arg(1)?, args: tail(2) },
            "script" => Command::Script { name: arg(0)? },
            "dev" => Command::Dev,
            "stop" => Command::Stop { id: arg(0)? },
            "ps" => Command::Processes,
            "install" => match rest.as_slice() {
                ["-D", package] => Command::Install { package: package.to_string(), dev: true },
                [package] => Command::Install { package: package.to_string(), dev: false },
                _ => return Err("usage: install [-D] <pkg>".to_string()),
            },
            "uninstall" => Command::Uninstall { package: arg(0)? },
            "packages" => Command::Packages,
            "status" => Command::Status,
            "probe" => Command::Probe,
            other => return Err(format!("unknown command: {} (try help)", other)),
        };
        Ok(Some(cmd))
    }
}

/// Console path to node key; `/` and `.` are the root
fn key_for(path: &str) -> NodeKey {
    match path.trim_matches('/') {
        "" | "." => NodeKey::root(),
        trimmed => NodeKey::encode(trimmed),
    }
}

struct App {
    workspace: &'static Workspace,
}

impl App {
    fn new(workspace: &'static Workspace) -> Self {
        Self { workspace }
    }

    /// Execute one command; returns false when the session should end
    async fn execute_command(&self, cmd: Command) -> Result<bool, AppError> {
        let ws = self.workspace;

        match cmd {
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
            Command::Tree => self.print_tree(),
            Command::Touch { dir, name } => {
                let key = ws.create_file(&key_for(&dir), &name)?;
                println!("created {}", key.decode()?);
            }
            Command::Mkdir { dir, name } => {
                let key = ws.create_directory(&key_for(&dir), &name)?;
                println!("created {}/", key.decode()?);
            }
            Command::Rename { path, name } => {
                let key = ws.rename(&key_for(&path), &name)?;
                println!("renamed to {}", key.decode()?);
            }
            Command::Delete { path } => {
                let node = ws.delete(&key_for(&path))?;
                println!("deleted {}", node.path());
            }
            Command::Copy { path } => {
                let entry = ws.copy(&key_for(&path))?;
                println!("copied {}", entry.display_name);
            }
            Command::Cut { path } => {
                let entry = ws.cut(&key_for(&path))?;
                println!("cut {}", entry.display_name);
            }
            Command::Paste { dir } => {
                let outcome = ws.paste(&key_for(&dir))?;
                let verb = if outcome.moved { "moved" } else { "pasted" };
                let note = if outcome.renamed { " (renamed)" } else { "" };
                println!("{} {}{}", verb, outcome.key.decode()?, note);
            }
            Command::Show { path } => {
                let info = ws.get_file_content_by_key(&key_for(&path))?;
                println!("--- {} [{}]", info.path, info.language);
                println!("{}", info.content);
            }
            Command::Write { path, text } => {
                if !ws.save_file(&key_for(&path), &text) {
                    return Err(AppError::NotFound(path));
                }
            }
            Command::Sync => {
                let mounted = ws.sync_to_sandbox().await;
                println!("{}", if mounted { "synced" } else { "sandbox not available" });
            }
            Command::Exec { command, args } => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                let output = ws.run(&command, &args).await;
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
                println!("[exit {}]", output.exit_code);
            }
            Command::Start { id, command, args } => {
                ws.sync_to_sandbox().await;
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                let handle = ws.runner().start_tracked(&id, &command, &args).await.map_err(AppError::from)?;
                println!("started {}", handle.id());
            }
            Command::Script { name } => {
                ws.sync_to_sandbox().await;
                let handle = ws.runner().start_script(&name).await.map_err(AppError::from)?;
                println!("started {}", handle.id());
            }
            Command::Dev => {
                ws.sync_to_sandbox().await;
                let handle = ws.runner().start_dev_server().await.map_err(AppError::from)?;
                println!("started {}", handle.id());
            }
            Command::Stop { id } => {
                if !ws.runner().stop_tracked(&id) {
                    return Err(AppError::NotFound(id));
                }
                println!("stopped {}", id);
            }
            Command::Processes => {
                for info in ws.runner().list_tracked() {
                    let state = match info.exit_code {
                        Some(code) => format!("exited {}", code),
                        None => "running".to_string(),
                    };
                    println!(
                        "{:<16} {:<10} {:>8}ms  {} {}",
                        info.id,
                        state,
                        info.elapsed_ms,
                        info.command,
                        info.args.join(" ")
                    );
                }
            }
            Command::Install { package, dev } => {
                ws.sync_to_sandbox().await;
                let output = ws.runner().install_package(&package, dev).await;
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
                println!("[exit {}]", output.exit_code);
            }
            Command::Uninstall { package } => {
                let output = ws.runner().uninstall_package(&package).await;
                print!("{}", output.stdout);
                eprint!("{}", output.stderr);
                println!("[exit {}]", output.exit_code);
            }
            Command::Packages => {
                for package in ws.runner().list_packages().await.map_err(AppError::from)? {
                    println!("{} {}", package.name, package.version.as_deref().unwrap_or("?"));
                }
            }
            Command::Status => print_json(&ws.status()),
            Command::Probe => print_json(&ws.capability()),
        }

        Ok(true)
    }

    fn print_tree(&self) {
        let tree = self.workspace.tree();
        if tree.roots().is_empty() {
            println!("(empty project)");
        }
        for node in tree.roots() {
            print_node(node, 0, &|key| tree.is_cut_pending(key));
        }
    }
}

fn print_node(node: &Node, depth: usize, is_cut: &dyn Fn(&NodeKey) -> bool) {
    let marker = if is_cut(node.key()) { "  (cut)" } else { "" };
    match node {
        Node::Directory(dir) => {
            println!("{}{}/{}", "  ".repeat(depth), node.name(), marker);
            for child in dir.children() {
                print_node(child, depth + 1, is_cut);
            }
        }
        Node::File(_) => println!("{}{}{}", "  ".repeat(depth), node.name(), marker),
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("Failed to serialize: {}", e),
    }
}

/// Echo tracked process output as it arrives
async fn forward_events(mut events: broadcast::Receiver<ProcessEvent>) {
    loop {
        match events.recv().await {
            Ok(ProcessEvent::Output { id, chunk, .. }) => match chunk.stream {
                OutputStream::Stdout => print!("[{}] {}", id, chunk.data),
                OutputStream::Stderr => eprint!("[{}] {}", id, chunk.data),
            },
            Ok(ProcessEvent::Exited { id, exit_code, .. }) => {
                println!("[{}] exited with {}", id, exit_code);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Console fell behind, {} events dropped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run the console session
pub async fn run(workspace: &'static Workspace, project: Option<PathBuf>) -> Result<()> {
    let capability = workspace.capability();
    if !capability.supported {
        tracing::warn!("Sandbox not supported here: {:?}", capability.reasons);
    }

    tokio::spawn(forward_events(workspace.runner().subscribe()));

    if let Some(project) = &project {
        let imported = workspace.import_directory(project).await?;
        println!("Imported {} files from {}", imported, project.display());
    }

    if workspace.sync_to_sandbox().await {
        let script = workspace.config().general.run_script_on_open.clone();
        if !script.is_empty() {
            if let Err(e) = workspace.runner().start_script(&script).await {
                tracing::warn!("Could not start script {}: {}", script, e);
            }
        }
    }

    let app = App::new(workspace);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let cmd = match Command::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(usage) => {
                eprintln!("{}", usage);
                continue;
            }
        };

        match app.execute_command(cmd).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if e.is_recoverable() => eprintln!("{}", e.user_message()),
            Err(e) => return Err(e.into()),
        }
    }

    let stopped = workspace.runner().stop_all();
    tracing::info!("Codebox exiting, stopped {} processes", stopped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_explorer_commands() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("touch / index.js"),
            Ok(Some(Command::Touch { dir: "/".into(), name: "index.js".into() }))
        );
        assert_eq!(
            Command::parse("write src/a.js  console.log( 1 )"),
            Ok(Some(Command::Write { path: "src/a.js".into(), text: " console.log( 1 )".into() }))
        );
        assert!(Command::parse("mv a.txt").is_err());
        assert!(Command::parse("frobnicate").is_err());
    }

    #[test]
    fn test_parse_sandbox_commands() {
        assert_eq!(
            Command::parse("start web node server.js --port 3000"),
            Ok(Some(Command::Start {
                id: "web".into(),
                command: "node".into(),
                args: vec!["server.js".into(), "--port".into(), "3000".into()],
            }))
        );
        assert_eq!(
            Command::parse("install -D nodemon"),
            Ok(Some(Command::Install { package: "nodemon".into(), dev: true }))
        );
        assert!(Command::parse("install").is_err());
    }

    #[test]
    fn test_key_for_root() {
        assert!(key_for("/").is_root());
        assert!(key_for(".").is_root());
        assert_eq!(key_for("/src/a.js"), NodeKey::encode("src/a.js"));
    }
}
