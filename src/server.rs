//! Chat server: user registry and message forwarding.
//!
//! The server is a single loop over [`ReliableSocket::recv`]. Clients are
//! identified by the address their reliable socket is bound to; the
//! registry keeps join order, which is also the order of the users list
//! (clients sort it for display).
//!
//! Protocol-visible events go to stdout (`join: <user>`, `msg: <user>`, …)
//! — that output is part of the observable interface, not diagnostics.

use std::io;
use std::net::SocketAddr;

use crate::message::ChatMessage;
use crate::socket::ReliableSocket;

/// Capacity of the user registry; joins beyond this get `err_server_full`.
pub const MAX_NUM_CLIENTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ClientEntry {
    username: String,
    addr: SocketAddr,
}

/// The chat server.
pub struct Server {
    socket: ReliableSocket,
    clients: Vec<ClientEntry>,
    max_clients: usize,
}

enum Payload {
    Text(String),
    File { filename: String, content: String },
}

impl Server {
    pub fn new(socket: ReliableSocket) -> Self {
        Self::with_capacity(socket, MAX_NUM_CLIENTS)
    }

    /// Server with a non-default registry capacity (used by tests).
    pub fn with_capacity(socket: ReliableSocket, max_clients: usize) -> Self {
        Self {
            socket,
            clients: Vec::new(),
            max_clients,
        }
    }

    /// Serve forever (until the underlying socket shuts down).
    pub async fn run(mut self) -> io::Result<()> {
        while let Some((message, addr)) = self.socket.recv().await {
            self.dispatch(&message, addr).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, raw: &str, addr: SocketAddr) -> io::Result<()> {
        match raw.parse::<ChatMessage>() {
            Ok(ChatMessage::Join { name }) => self.join(name, addr).await,
            Ok(ChatMessage::Disconnect { name }) => {
                self.disconnect(&name, addr);
                Ok(())
            }
            Ok(ChatMessage::RequestUsersList) => self.send_users_list(addr).await,
            Ok(ChatMessage::SendMessage { recipients, text }) => {
                self.forward(addr, recipients, Payload::Text(text)).await
            }
            Ok(ChatMessage::SendFile {
                recipients,
                filename,
                content,
            }) => {
                self.forward(addr, recipients, Payload::File { filename, content })
                    .await
            }
            // Anything else — a malformed message or a type only the server
            // itself may send — is an unknown command; the client treats
            // the reply as a fatal disconnect.
            Ok(_) | Err(_) => self.reject(addr).await,
        }
    }

    async fn join(&mut self, name: String, addr: SocketAddr) -> io::Result<()> {
        if self.clients.len() >= self.max_clients {
            println!("disconnected: server full");
            return self.reply(addr, ChatMessage::ErrServerFull).await;
        }
        if self.clients.iter().any(|c| c.username == name) {
            println!("disconnected: username not available");
            return self.reply(addr, ChatMessage::ErrUsernameUnavailable).await;
        }
        println!("join: {name}");
        self.clients.push(ClientEntry {
            username: name,
            addr,
        });
        Ok(())
    }

    fn disconnect(&mut self, name: &str, addr: SocketAddr) {
        let entry = ClientEntry {
            username: name.to_string(),
            addr,
        };
        if let Some(pos) = self.clients.iter().position(|c| *c == entry) {
            self.clients.remove(pos);
            println!("disconnected: {name}");
        }
    }

    async fn send_users_list(&self, addr: SocketAddr) -> io::Result<()> {
        println!("request_users_list: {}", self.username_of(addr));
        let users = self.clients.iter().map(|c| c.username.clone()).collect();
        self.reply(addr, ChatMessage::ResponseUsersList { users })
            .await
    }

    /// Forward a text or file payload to each named recipient, at most once
    /// per user no matter how often they are listed.
    async fn forward(
        &self,
        from_addr: SocketAddr,
        recipients: Vec<String>,
        payload: Payload,
    ) -> io::Result<()> {
        let from = self.username_of(from_addr);
        let (tag, forwarded) = match payload {
            Payload::Text(text) => (
                "msg",
                ChatMessage::ForwardMessage {
                    from: from.clone(),
                    text,
                },
            ),
            Payload::File { filename, content } => (
                "file",
                ChatMessage::ForwardFile {
                    from: from.clone(),
                    filename,
                    content,
                },
            ),
        };
        println!("{tag}: {from}");

        let wire = forwarded.to_string();
        let mut already_sent: Vec<&str> = Vec::new();
        for name in &recipients {
            if already_sent.contains(&name.as_str()) {
                continue;
            }
            match self.clients.iter().find(|c| c.username == *name) {
                Some(client) => {
                    self.socket.sendto(client.addr, &wire).await?;
                    already_sent.push(name);
                }
                None => println!("{tag}: {from} to non-existent user {name}"),
            }
        }
        Ok(())
    }

    /// Answer an unknown or malformed command.
    async fn reject(&self, addr: SocketAddr) -> io::Result<()> {
        println!(
            "disconnected: {} sent unknown command",
            self.username_of(addr)
        );
        self.reply(addr, ChatMessage::ErrUnknownMessage).await
    }

    async fn reply(&self, addr: SocketAddr, msg: ChatMessage) -> io::Result<()> {
        self.socket.sendto(addr, &msg.to_string()).await
    }

    /// Username registered for `addr`, or empty for an unregistered peer.
    fn username_of(&self, addr: SocketAddr) -> String {
        self.clients
            .iter()
            .find(|c| c.addr == addr)
            .map(|c| c.username.clone())
            .unwrap_or_default()
    }
}
