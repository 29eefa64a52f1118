//! chatstream - a terminal client for streaming chat sessions.
//!
//! Reads commands from stdin, one per line:
//!
//! ```text
//! /list            list sessions
//! /new             create a session and switch to it
//! /open <id>       switch to a session
//! /delete <id>     delete a session
//! /cancel          stop the reply being streamed
//! /quit            exit
//! anything else    send it to the active session
//! ```

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;

use chatstream_core::{paths, ChatError, ClientConfig, Role, SessionId, StreamingChatClient};
use clap::Parser;

const STEP_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "chatstream", about = "Terminal client for streaming chat sessions")]
#[command(version)]
struct Args {
    /// Base URL of the chat API
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token
    #[arg(long)]
    token: Option<String>,

    /// Config file (default: ~/.config/chatstream/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write a transcript of every stream into this directory
    #[arg(long)]
    transcript_dir: Option<PathBuf>,

    /// Open this session on start
    #[arg(long)]
    session: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

enum Command {
    List,
    New,
    Open(String),
    Delete(String),
    Cancel,
    Quit,
    Send(String),
    Empty,
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }
        if !line.starts_with('/') {
            return Ok(Self::Send(line.to_string()));
        }

        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        let required = |what: &str| {
            if arg.is_empty() {
                Err(format!("usage: {} <{}>", name, what))
            } else {
                Ok(arg.to_string())
            }
        };

        match name {
            "/list" => Ok(Self::List),
            "/new" => Ok(Self::New),
            "/open" => required("id").map(Self::Open),
            "/delete" => required("id").map(Self::Delete),
            "/cancel" => Ok(Self::Cancel),
            "/quit" | "/exit" => Ok(Self::Quit),
            other => Err(format!("unknown command {}", other)),
        }
    }
}

fn resolve_config(args: &Args) -> Result<ClientConfig, Box<dyn Error>> {
    let path = match &args.config {
        Some(path) => path.clone(),
        None => paths::default_config_path()?,
    };

    let mut config = ClientConfig::load_or_default(&path)?.with_env();
    if let Some(base_url) = &args.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(token) = &args.token {
        config.auth_token = Some(token.clone());
    }
    if let Some(dir) = &args.transcript_dir {
        config.transcript_dir = Some(dir.clone());
    }
    Ok(config)
}

/// Read stdin on its own thread so `/cancel` works while a reply streams.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_sessions(client: &StreamingChatClient) {
    if client.sessions().is_empty() {
        println!("(no sessions)");
        return;
    }
    for session in client.sessions() {
        let marker = if client.active_session() == Some(&session.id) {
            "*"
        } else {
            " "
        };
        match session.message_count {
            Some(count) => println!(
                "{} {}  {}  ({} messages)",
                marker, session.id, session.created_at, count
            ),
            None => println!("{} {}  {}", marker, session.id, session.created_at),
        }
    }
}

fn list_sessions(client: &mut StreamingChatClient) -> Result<(), ChatError> {
    client.load_sessions()?;
    print_sessions(client);
    Ok(())
}

fn print_history(client: &StreamingChatClient) {
    for message in client.messages().iter() {
        let who = match message.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("{}> {}", who, message.content);
    }
}

/// Print the reply as it streams. Returns false if stdin closed.
fn stream_reply(client: &mut StreamingChatClient, input: &Receiver<String>) -> bool {
    let mut printed = 0usize;
    let mut stdin_open = true;
    print!("assistant> ");
    let _ = io::stdout().flush();

    while client.is_streaming() {
        let result = client.step(STEP_TIMEOUT);
        print_new_text(client, &mut printed);
        if let Err(err) = result {
            log::debug!("stream ended with {}", err);
            break;
        }

        match input.try_recv() {
            Ok(line) if line.trim() == "/cancel" => {
                client.cancel_streaming();
                println!("\n(cancelled)");
                return true;
            }
            Ok(_) => eprintln!("\n(busy; /cancel stops the reply)"),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => stdin_open = false,
        }
    }

    print_new_text(client, &mut printed);
    println!();
    if let Some(error) = client.last_error() {
        eprintln!("error: {}", error);
    }
    stdin_open
}

/// Print whatever the assistant reply gained since the last call.
fn print_new_text(client: &StreamingChatClient, printed: &mut usize) {
    let messages = client.messages();
    let Some(reply) = messages.last().filter(|m| m.role == Role::Assistant) else {
        return;
    };

    match reply.content.get(*printed..) {
        Some(rest) if !rest.is_empty() => {
            print!("{}", rest);
            *printed = reply.content.len();
        }
        Some(_) => {}
        // The final message differs from what was streamed.
        None => {
            print!("\n{}", reply.content);
            *printed = reply.content.len();
        }
    }
    let _ = io::stdout().flush();
}

fn run(client: &mut StreamingChatClient, input: Receiver<String>) {
    while let Ok(line) = input.recv() {
        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        let result = match command {
            Command::Empty => Ok(()),
            Command::Quit => break,
            Command::List => list_sessions(client),
            Command::New => client.create_session().map(|id| println!("created {}", id)),
            Command::Open(id) => client
                .load_session(&SessionId::from(id))
                .map(|_| print_history(client)),
            Command::Delete(id) => client
                .delete_session(&SessionId::from(id.as_str()))
                .map(|_| println!("deleted {}", id)),
            Command::Cancel => {
                if !client.cancel_streaming() {
                    println!("(nothing to cancel)");
                }
                Ok(())
            }
            Command::Send(content) => match client.send_message(&content) {
                Ok(Some(_)) => {
                    if !stream_reply(client, &input) {
                        break;
                    }
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(err) => Err(err),
            },
        };

        if let Err(err) = result {
            eprintln!("error: {}", err);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = resolve_config(&args)?;
    log::info!("Using chat API at {}", config.base_url);

    let mut client = StreamingChatClient::from_config(&config);
    if let Err(err) = client.load_sessions() {
        log::warn!("{}", err);
    }
    if let Some(id) = &args.session {
        client.load_session(&SessionId::from(id.as_str()))?;
        print_history(&client);
    } else {
        println!("/new to start a session, /list to see existing ones");
    }

    run(&mut client, spawn_stdin_reader());
    Ok(())
}
