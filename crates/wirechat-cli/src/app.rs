//! Interactive chat application
//!
//! Wraps the client in a line-oriented terminal interface: one select loop
//! over stdin lines, client notifications, and ctrl-c. Plain input lines go
//! to the active session, slash commands drive the session lifecycle.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use wirechat_client::{ChatClient, ConnectionState, Notification, WsTransport};
use wirechat_core::{
    ChatMessage, ErrorKind, SessionId, SessionState, WirechatError, WirechatResult,
};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

/// Terminal chat application over a WebSocket client
pub struct ChatApp {
    client: ChatClient<WsTransport>,
    notifications: mpsc::Receiver<Notification>,
    config: AppConfig,
}

impl ChatApp {
    /// Build the client from configuration and start connecting.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let profile = config.profile()?;
        let client = ChatClient::websocket_with_policy(
            &config.connection.endpoint,
            profile,
            config.client.clone(),
            config.connection.reconnect.clone(),
        )?;
        let (_id, notifications) = client.subscribe().await;
        client.connect().await?;

        Ok(Self {
            client,
            notifications,
            config,
        })
    }

    /// The underlying client handle.
    pub fn client(&self) -> &ChatClient<WsTransport> {
        &self.client
    }

    fn startup_deadline(&self) -> Duration {
        Duration::from_secs(self.config.connection.startup_timeout_secs)
    }

    /// Wait until the transport reports a live connection.
    pub async fn wait_until_ready(&self) -> Result<()> {
        let mut connection = self.client.watch_connection();
        let ready = connection.wait_for(|state| *state == ConnectionState::Connected);

        match timeout(self.startup_deadline(), ready).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(CliError::Startup(
                "Transport stopped before a connection was established".to_string(),
            )),
            Err(_) => Err(CliError::Startup(format!(
                "No connection to {} within {}s",
                self.config.connection.endpoint, self.config.connection.startup_timeout_secs
            ))),
        }
    }

    /// Wait for the first session snapshot after connecting.
    pub async fn wait_for_sessions(&mut self) -> Result<()> {
        let deadline = self.startup_deadline();
        let arrived = async {
            while let Some(notification) = self.notifications.recv().await {
                if matches!(notification, Notification::SessionsUpdated { .. }) {
                    return true;
                }
            }
            false
        };

        match timeout(deadline, arrived).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CliError::Startup(
                "Notification stream ended before the session list arrived".to_string(),
            )),
            Err(_) => Err(CliError::Startup(format!(
                "No session list within {}s",
                self.config.connection.startup_timeout_secs
            ))),
        }
    }

    /// Wait for a pending join to be confirmed or rejected by the server.
    pub async fn wait_for_join(&mut self) -> Result<SessionId> {
        let deadline = self.startup_deadline();
        let outcome = async {
            while let Some(notification) = self.notifications.recv().await {
                match notification {
                    Notification::SessionJoined { session_id } => return Some(Ok(session_id)),
                    Notification::ErrorReported { report }
                        if report.kind == ErrorKind::ServerReported =>
                    {
                        return Some(Err(CliError::Client(WirechatError::server(report.detail))));
                    }
                    _ => {}
                }
            }
            None
        };

        match timeout(deadline, outcome).await {
            Ok(Some(result)) => result,
            Ok(None) => Err(CliError::Startup(
                "Notification stream ended before the join was confirmed".to_string(),
            )),
            Err(_) => Err(CliError::Startup(format!(
                "Join not confirmed within {}s",
                self.config.connection.startup_timeout_secs
            ))),
        }
    }

    /// Wait for the server to echo a sent message back into the session.
    pub async fn wait_for_echo(&mut self, content: &str) -> bool {
        let deadline = self.startup_deadline();
        let echoed = async {
            while let Some(notification) = self.notifications.recv().await {
                if let Notification::MessageAppended { message } = notification {
                    if message.content == content {
                        return true;
                    }
                }
            }
            false
        };

        matches!(timeout(deadline, echoed).await, Ok(true))
    }

    /// Disconnect and discard the session position.
    pub async fn shutdown(&self) {
        self.client.close().await;
    }

    // ------------------------------------------------------------------------
    // Interactive loop
    // ------------------------------------------------------------------------

    /// Run the interactive chat loop until quit, ctrl-c, or EOF.
    pub async fn run_interactive(mut self, initial_session: Option<SessionId>) -> Result<()> {
        self.wait_until_ready().await?;
        println!(
            "Connected to {} as {}",
            self.config.connection.endpoint,
            self.client.profile().username
        );
        println!("Type /help for commands; plain lines go to the active session.");

        if let Some(session_id) = initial_session {
            self.report(self.client.create_or_join(Some(session_id)).await);
        }

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        self.show_prompt();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    match line? {
                        Some(line) => {
                            if !self.handle_line(line.trim()).await {
                                break;
                            }
                            self.show_prompt();
                        }
                        None => break,
                    }
                }
                notification = self.notifications.recv() => {
                    match notification {
                        Some(notification) => self.render_notification(notification).await,
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Handle one input line; returns false when the loop should exit.
    async fn handle_line(&self, line: &str) -> bool {
        match line {
            "" => true,
            "/quit" | "/q" => false,
            "/help" => {
                self.print_help();
                true
            }
            "/sessions" => {
                self.print_sessions().await;
                true
            }
            "/refresh" => {
                self.client.refresh_sessions().await;
                true
            }
            "/new" => {
                self.report(self.client.create_or_join(None).await);
                true
            }
            "/leave" => {
                self.report(self.client.leave().await);
                true
            }
            "/status" => {
                self.print_status().await;
                true
            }
            "/error" => {
                match self.client.current_error().await {
                    Some(report) => println!("{}", report),
                    None => println!("No error"),
                }
                true
            }
            "/clear" => {
                self.client.clear_error().await;
                true
            }
            _ if line.starts_with("/join") => {
                let target = line.trim_start_matches("/join").trim();
                if target.is_empty() {
                    println!("Usage: /join <session-id>");
                } else {
                    self.report(self.client.create_or_join(Some(SessionId::new(target))).await);
                }
                true
            }
            _ if line.starts_with('/') => {
                println!("Unknown command: {} (try /help)", line);
                true
            }
            content => {
                self.report(self.client.send_message(content).await);
                true
            }
        }
    }

    fn report(&self, result: WirechatResult<()>) {
        if let Err(err) = result {
            println!("! {}", err);
        }
    }

    fn show_prompt(&self) {
        print!("{}", self.config.cli.prompt);
        let _ = std::io::stdout().flush();
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    async fn render_notification(&self, notification: Notification) {
        match notification {
            Notification::ConnectionChanged { state } => {
                println!("* connection {}", state);
            }
            Notification::SessionsUpdated { count } => {
                println!("* {} session(s) available", count);
            }
            Notification::SessionJoined { session_id } => {
                println!("* joined session {}", session_id);
                self.print_history(&session_id).await;
            }
            Notification::MessageAppended { message } => {
                // Only messages for the session we are in reach the screen;
                // the rest stay in the store.
                let in_session =
                    self.client.session_state().await == SessionState::Active(message.session.clone());
                if in_session {
                    self.print_message(&message);
                }
            }
            Notification::ErrorReported { report } => {
                println!("! {}", report);
            }
        }
    }

    async fn print_history(&self, session_id: &SessionId) {
        if let Some(messages) = self.client.messages(session_id).await {
            let start = messages.len().saturating_sub(self.config.cli.history_limit);
            for message in &messages[start..] {
                self.print_message(message);
            }
        }
    }

    fn print_message(&self, message: &ChatMessage) {
        if self.config.cli.show_timestamps {
            println!(
                "[{}] <{}> {}",
                message.created_at.format("%H:%M:%S"),
                message.sender_label(),
                message.content
            );
        } else {
            println!("<{}> {}", message.sender_label(), message.content);
        }
    }

    pub(crate) async fn print_sessions(&self) {
        let sessions = self.client.sessions().await;
        if sessions.is_empty() {
            println!("No sessions available (try /refresh or /new)");
            return;
        }

        let state = self.client.session_state().await;
        for session in sessions {
            let marker = if state == SessionState::Active(session.id.clone()) {
                "*"
            } else {
                " "
            };
            match self.client.messages(&session.id).await {
                Some(messages) => println!(
                    "{} {} (owner {}, {} message(s))",
                    marker,
                    session.id,
                    session.owner.username,
                    messages.len()
                ),
                None => println!("{} {} (owner {})", marker, session.id, session.owner.username),
            }
        }
    }

    pub(crate) async fn print_status(&self) {
        let stats = self.client.stats().await;
        println!("Connection: {}", self.client.connection_state());
        println!("Session: {}", self.client.session_state().await);
        println!("Sessions known: {}", self.client.sessions().await.len());
        println!("Server events: {}", stats.server_events);
        println!("Messages sent: {}", stats.messages_sent);
        println!("Protocol errors: {}", stats.protocol_errors);
        println!("Server errors: {}", stats.server_errors);
    }

    fn print_help(&self) {
        println!("Commands:");
        println!("  /sessions          list known sessions");
        println!("  /refresh           ask the server for the session list");
        println!("  /join <id>         join a session");
        println!("  /new               create a session and join it");
        println!("  /leave             leave the active session");
        println!("  /status            show connection and client statistics");
        println!("  /error             show the most recent error");
        println!("  /clear             dismiss the most recent error");
        println!("  /quit              exit");
        println!("Anything else is sent to the active session.");
    }
}
