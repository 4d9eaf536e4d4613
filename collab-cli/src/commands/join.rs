//! Join a session and drive it from stdin.

use anyhow::{Context, Result};
use collab_client::{
    ClientConfig, CollabSession, ConnectionEvent, LockRequest, MockTransport, PumpOutcome,
    SendOutcome, SessionConfig, SessionEvent, Transport, WebSocketTransport,
};
use collab_types::{NodeId, Payload, PresenceAction, SessionId};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::Identity;

/// One line of stdin input.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Lock(NodeId),
    Unlock(NodeId),
    Cursor(f64, f64),
    Who,
    Locks,
    Help,
    Quit,
}

/// Parse a stdin line. Blank lines yield `Ok(None)`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("lock", [node]) => Command::Lock(NodeId::from(*node)),
        ("unlock", [node]) => Command::Unlock(NodeId::from(*node)),
        ("cursor", [x, y]) => {
            let x = x.parse().map_err(|_| format!("not a number: {x}"))?;
            let y = y.parse().map_err(|_| format!("not a number: {y}"))?;
            Command::Cursor(x, y)
        }
        ("who", []) => Command::Who,
        ("locks", []) => Command::Locks,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        ("lock" | "unlock", _) => return Err(format!("usage: {verb} <node>")),
        ("cursor", _) => return Err("usage: cursor <x> <y>".to_string()),
        _ => return Err(format!("unknown command: {line}")),
    };
    Ok(Some(command))
}

/// Run the join command.
pub async fn run(
    config: ClientConfig,
    identity: Identity,
    session_id: SessionId,
    use_mock: bool,
) -> Result<()> {
    let session_config = SessionConfig::from_client_config(
        &config,
        session_id,
        identity.user_id,
        identity.user_name,
    );

    if use_mock {
        // Nobody is on the other end, so there is nothing to pump.
        run_with(session_config, MockTransport::new(), false).await
    } else {
        run_with(session_config, WebSocketTransport::new(), true).await
    }
}

async fn run_with<T: Transport + 'static>(
    config: SessionConfig,
    transport: T,
    pump: bool,
) -> Result<()> {
    let session = Arc::new(CollabSession::new(config, transport));
    let _events = session.subscribe(|event| println!("{}", describe(event)));

    session.join().await.context("Failed to join session")?;
    let me = session.local_user();
    println!(
        "Joined {} as {} ({})",
        session.session_id(),
        me.user_name,
        me.user_id
    );

    let receiver = pump.then(|| {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let outcome = session.run().await;
            if outcome == PumpOutcome::Exhausted {
                println!("Connection lost; type 'quit' and join again.");
            }
            outcome
        })
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_command(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(&session, command).await?,
            Ok(None) => {}
            Err(message) => println!("{message}"),
        }
    }

    session.leave().await;
    if let Some(receiver) = receiver {
        receiver.abort();
    }
    Ok(())
}

async fn execute<T: Transport>(session: &CollabSession<T>, command: Command) -> Result<()> {
    match command {
        Command::Lock(node_id) => {
            let outcome = match session.request_lock(node_id.clone()).await? {
                LockRequest::Granted => "granted".to_string(),
                LockRequest::AlreadyHeld => "already yours".to_string(),
                LockRequest::HeldBy(holder) => format!("held by {holder}"),
            };
            println!("lock {node_id}: {outcome}");
        }
        Command::Unlock(node_id) => {
            let outcome = session.release_lock(node_id.clone()).await?;
            println!("unlock {node_id}: {}", describe_send(outcome));
        }
        Command::Cursor(x, y) => {
            let outcome = session.move_cursor(x, y).await?;
            println!("cursor ({x}, {y}): {}", describe_send(outcome));
        }
        Command::Who => {
            for user in session.users() {
                println!(
                    "{} {} {} {}{}",
                    user.id,
                    user.name,
                    user.color,
                    if user.idle { "idle" } else { "active" },
                    if user.is_local { " (you)" } else { "" }
                );
            }
        }
        Command::Locks => {
            let locks = session.locks();
            if locks.is_empty() {
                println!("no locks");
            }
            for (node_id, holder) in locks {
                println!("{node_id} -> {holder}");
            }
        }
        Command::Help => {
            println!("commands: lock <node>, unlock <node>, cursor <x> <y>, who, locks, quit");
        }
        Command::Quit => {}
    }
    Ok(())
}

fn describe_send(outcome: SendOutcome) -> &'static str {
    match outcome {
        SendOutcome::Sent => "sent",
        SendOutcome::Dropped => "dropped (not connected)",
        SendOutcome::Throttled => "throttled",
    }
}

/// One line of output per session event.
fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Received(message) => match &message.payload {
            Payload::CursorMove(cursor) => {
                format!("<- {} moved to ({}, {})", message.user_name, cursor.x, cursor.y)
            }
            Payload::Lock(lock) => format!("<- {} locked {}", message.user_name, lock.node_id),
            Payload::Unlock(unlock) => {
                format!("<- {} unlocked {}", message.user_name, unlock.node_id)
            }
            Payload::UserPresence(presence) => format!(
                "<- {} {}",
                presence.user.user_name,
                match presence.action {
                    PresenceAction::Joined => "joined",
                    PresenceAction::Left => "left",
                }
            ),
            _ => format!("<- {} from {}", message.message_type(), message.user_name),
        },
        SessionEvent::Connection(event) => match event {
            ConnectionEvent::Connected => "connected".to_string(),
            ConnectionEvent::ConnectFailed { error } => format!("connect failed: {error}"),
            ConnectionEvent::Disconnected { reason } => format!("disconnected: {reason}"),
            ConnectionEvent::Reconnecting { attempt, delay } => {
                format!("reconnecting (attempt {attempt}) in {delay:?}")
            }
            ConnectionEvent::ReconnectFailed { attempt, error } => {
                format!("reconnect attempt {attempt} failed: {error}")
            }
            ConnectionEvent::ReconnectExhausted { attempts } => {
                format!("gave up after {attempts} reconnection attempts")
            }
        },
        SessionEvent::LockDenied { node_id, locked_by } => {
            format!("lock {node_id}: denied, held by {locked_by}")
        }
        SessionEvent::LockLost { node_id, locked_by } => {
            format!("lock {node_id}: lost to {locked_by}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_types::{CursorMove, Message, UserId};

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_command("lock n1"),
            Ok(Some(Command::Lock(NodeId::from("n1"))))
        );
        assert_eq!(
            parse_command("  unlock   n2 "),
            Ok(Some(Command::Unlock(NodeId::from("n2"))))
        );
        assert_eq!(
            parse_command("cursor 120 80.5"),
            Ok(Some(Command::Cursor(120.0, 80.5)))
        );
        assert_eq!(parse_command("who"), Ok(Some(Command::Who)));
        assert_eq!(parse_command("locks"), Ok(Some(Command::Locks)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_command("lock").is_err());
        assert!(parse_command("cursor 1").is_err());
        assert!(parse_command("cursor a b").is_err());
        assert!(parse_command("dance").is_err());
    }

    #[test]
    fn describes_events() {
        let message = Message::new(
            UserId::from("B"),
            "Bob",
            SessionId::from("room-1"),
            1,
            Payload::CursorMove(CursorMove { x: 1.0, y: 2.0 }),
        );
        assert_eq!(
            describe(&SessionEvent::Received(message)),
            "<- Bob moved to (1, 2)"
        );
        assert_eq!(
            describe(&SessionEvent::LockDenied {
                node_id: NodeId::from("n1"),
                locked_by: UserId::from("A"),
            }),
            "lock n1: denied, held by A"
        );
    }

    #[tokio::test]
    async fn lock_command_against_mock_session() {
        let session = CollabSession::new(
            SessionConfig::new(SessionId::from("room-1"), UserId::from("A"), "Ada"),
            MockTransport::new(),
        );
        session.join().await.unwrap();

        execute(&session, Command::Lock(NodeId::from("n1"))).await.unwrap();
        assert_eq!(session.lock_holder(&NodeId::from("n1")), Some(UserId::from("A")));

        execute(&session, Command::Unlock(NodeId::from("n1"))).await.unwrap();
        assert!(session.locks().is_empty());
    }
}
