//! Chat client: interactive command loop plus a background receive handler.
//!
//! The client announces itself with `join <name>`, then multiplexes two
//! event sources until it quits or the server disconnects it:
//!
//! - stdin lines, parsed by [`parse_command`] and turned into chat messages;
//! - server messages, handled by a spawned task that prints forwarded
//!   text, writes forwarded files to disk, and treats every `err_*` reply
//!   as a fatal disconnect.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;

use crate::message::ChatMessage;
use crate::socket::ReliableSocket;

// ---------------------------------------------------------------------------
// Command parsing
// ---------------------------------------------------------------------------

/// A parsed interactive command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    /// Raw `<N> <users…> <text>` arguments, passed to the server verbatim
    /// (the server validates the recipient count).
    Msg(String),
    /// Raw `<N> <users…> <filename>` arguments; the last token names the
    /// file to read and send.
    File(String),
    Help,
    Quit,
}

/// Parse one line of user input. `None` means the format is not recognised.
pub fn parse_command(line: &str) -> Option<Command> {
    match line {
        "list" => return Some(Command::List),
        "help" => return Some(Command::Help),
        "quit" => return Some(Command::Quit),
        _ => {}
    }
    if let Some(rest) = line.strip_prefix("msg ") {
        if !rest.is_empty() {
            return Some(Command::Msg(rest.to_string()));
        }
    }
    if let Some(rest) = line.strip_prefix("file ") {
        if !rest.is_empty() {
            return Some(Command::File(rest.to_string()));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The interactive chat client.
pub struct Client {
    socket: Arc<ReliableSocket>,
    server_addr: SocketAddr,
    name: String,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl Client {
    pub fn new(socket: ReliableSocket, server_addr: SocketAddr, name: impl Into<String>) -> Self {
        Self {
            socket: Arc::new(socket),
            server_addr,
            name: name.into(),
            connected: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Join the server and run the interactive loop until the user quits,
    /// stdin closes, or the server disconnects us.
    pub async fn run(self) -> io::Result<()> {
        self.send(ChatMessage::Join {
            name: self.name.clone(),
        })
        .await?;

        let recv_task = tokio::spawn(receive_handler(
            Arc::clone(&self.socket),
            self.name.clone(),
            Arc::clone(&self.connected),
            Arc::clone(&self.shutdown),
        ));

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    // The server may have disconnected us while the user
                    // was typing.
                    if !self.connected.load(Ordering::SeqCst) {
                        break;
                    }
                    self.handle_line(&line).await?;
                    if !self.connected.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }

        recv_task.abort();
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> io::Result<()> {
        match parse_command(line) {
            Some(Command::List) => self.send(ChatMessage::RequestUsersList).await?,
            Some(Command::Msg(args)) => self.send_raw(&format!("send_message {args}")).await?,
            Some(Command::File(args)) => self.send_file(&args).await?,
            Some(Command::Help) => print_help(),
            Some(Command::Quit) => {
                self.connected.store(false, Ordering::SeqCst);
                println!("quitting");
                // sendto blocks until the disconnect is delivered, so no
                // grace sleep is needed before exiting.
                self.send(ChatMessage::Disconnect {
                    name: self.name.clone(),
                })
                .await?;
            }
            None => println!("incorrect userinput format"),
        }
        Ok(())
    }

    /// Validate a `file` command, read the file, and ship it.
    async fn send_file(&self, args: &str) -> io::Result<()> {
        let parts: Vec<&str> = args.split(' ').collect();
        let Ok(num_users) = parts[0].parse::<usize>() else {
            println!("Number of users specified is not an integer.");
            return Ok(());
        };
        // Expected tokens: the count, the users, the filename.
        if parts.len() != num_users + 2 {
            println!("Number of users specified are not mentioned");
            return Ok(());
        }
        let filename = parts[parts.len() - 1];
        let content = match tokio::fs::read_to_string(filename).await {
            Ok(content) => content,
            Err(_) => {
                println!("The specified file does not exist.");
                return Ok(());
            }
        };
        self.send_raw(&format!("send_file {args} {content}")).await
    }

    async fn send(&self, msg: ChatMessage) -> io::Result<()> {
        self.send_raw(&msg.to_string()).await
    }

    async fn send_raw(&self, wire: &str) -> io::Result<()> {
        self.socket.sendto(self.server_addr, wire).await
    }
}

// ---------------------------------------------------------------------------
// Receive handler
// ---------------------------------------------------------------------------

async fn receive_handler(
    socket: Arc<ReliableSocket>,
    own_name: String,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    while connected.load(Ordering::SeqCst) {
        let Some((message, _addr)) = socket.recv().await else {
            break;
        };
        match message.parse::<ChatMessage>() {
            Ok(ChatMessage::ErrServerFull) => {
                println!("disconnected: server full");
                break_connection(&connected, &shutdown);
                return;
            }
            Ok(ChatMessage::ErrUsernameUnavailable) => {
                println!("disconnected: username not available");
                break_connection(&connected, &shutdown);
                return;
            }
            Ok(ChatMessage::ErrUnknownMessage) => {
                println!("disconnected: server received an unknown command");
                break_connection(&connected, &shutdown);
                return;
            }
            Ok(ChatMessage::ResponseUsersList { mut users }) => {
                users.sort();
                println!("list: {}", users.join(" "));
            }
            Ok(ChatMessage::ForwardMessage { from, text }) => {
                println!("msg: {from}: {text}");
            }
            Ok(ChatMessage::ForwardFile {
                from,
                filename,
                content,
            }) => {
                let path = format!("{own_name}_{filename}");
                if let Err(e) = tokio::fs::write(&path, &content).await {
                    log::warn!("[client] could not write {path}: {e}");
                } else {
                    println!("file: {from}: {filename}");
                }
            }
            Ok(other) => log::debug!("[client] ignoring unexpected message: {other:?}"),
            Err(e) => log::debug!("[client] ignoring unparsable message: {e}"),
        }
    }
}

fn break_connection(connected: &AtomicBool, shutdown: &Notify) {
    connected.store(false, Ordering::SeqCst);
    shutdown.notify_one();
}

fn print_help() {
    println!(
        "This is a list of all possible user inputs and their formats.

Message function format:
msg <number_of_users> <username1> <username2> ... <message>

Available users function format:
list

File sharing function format:
file <number_of_users> <username1> <username2> ... <file_name>

Help function:
help

Quitting function:
quit"
    );
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_commands_parse() {
        assert_eq!(parse_command("list"), Some(Command::List));
        assert_eq!(parse_command("help"), Some(Command::Help));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
    }

    #[test]
    fn msg_keeps_arguments_verbatim() {
        assert_eq!(
            parse_command("msg 2 bob carol hello  world"),
            Some(Command::Msg("2 bob carol hello  world".into()))
        );
    }

    #[test]
    fn file_keeps_arguments_verbatim() {
        assert_eq!(
            parse_command("file 1 bob notes.txt"),
            Some(Command::File("1 bob notes.txt".into()))
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("msg"), None);
        assert_eq!(parse_command("msg "), None);
        assert_eq!(parse_command("file"), None);
        assert_eq!(parse_command("shout hello"), None);
        assert_eq!(parse_command("listing"), None);
    }
}
