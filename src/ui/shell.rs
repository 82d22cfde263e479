//! Line-based chat shell: reads stdin lines, drives the session, prints
//! arriving messages.

use std::{
    io::BufRead,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use anyhow::Result;

use crate::{
    domain::{
        events::AppEvent,
        message::UserId,
        typing::now_unix_ms,
    },
    usecases::{
        contracts::{ChatApi, ChatChannel, TokenSource},
        session::{RealtimeChatSession, SendMessageError},
    },
};

use super::render;

const EVENT_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Forwards stdin lines into the shell event loop. EOF quits the shell.
pub fn spawn_stdin_reader(tx: Sender<AppEvent>) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("rentchat-stdin".to_owned())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(AppEvent::InputLine(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(AppEvent::QuitRequested);
        })?;

    Ok(handle)
}

/// Runs the shell loop until the user quits or the event source closes.
///
/// Channel events and stdin lines arrive interleaved on one receiver; the
/// poll timeout doubles as the tick that lets the typing indicator expire
/// without any further events.
pub fn run<A, C, T>(
    session: &mut RealtimeChatSession<A, C, T>,
    me: UserId,
    events: &Receiver<AppEvent>,
) -> Result<()>
where
    A: ChatApi,
    C: ChatChannel,
    T: TokenSource,
{
    for line in render::transcript_lines(session.messages(), me) {
        println!("{line}");
    }
    println!("(type a message and press Enter; /quit to leave)");

    let mut printed = session.messages().len();
    let mut typing_shown = false;

    loop {
        let event = match events.recv_timeout(EVENT_POLL_TIMEOUT) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => AppEvent::Tick,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            AppEvent::Tick => {}
            AppEvent::QuitRequested => break,
            AppEvent::InputLine(line) => {
                if line.trim() == "/quit" {
                    break;
                }

                session.signal_typing();
                match session.send(&line) {
                    Ok(_) | Err(SendMessageError::EmptyMessage) => {}
                    Err(SendMessageError::SessionClosed) => {
                        eprintln!("No conversation is open.");
                    }
                    Err(SendMessageError::SendFailed(error)) => {
                        eprintln!(
                            "Message not sent ({error:?}); your draft is kept: {}",
                            session.draft()
                        );
                    }
                }
            }
            AppEvent::Channel(event) => {
                session.handle_channel_event(event, now_unix_ms());
            }
        }

        for message in &session.messages()[printed..] {
            println!("{}", render::message_line(message, me));
        }
        printed = session.messages().len();

        let typing = session.peer_typing(now_unix_ms());
        if typing && !typing_shown {
            println!("{}", render::TYPING_NOTICE);
        }
        typing_shown = typing;
    }

    session.close();
    Ok(())
}
