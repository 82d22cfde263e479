//! Application entry points: wires config, storage, the marketplace
//! adapters, and the chat shell together per CLI command.

use std::sync::mpsc;

use anyhow::{bail, Context as _, Result};
use tokio::runtime::Runtime;

use crate::{
    cli::{Cli, Command},
    domain::{self, events::AppEvent, session_state::SubscriptionState},
    infra::{self, error::AppError},
    marketplace::{self, HttpChatApi, WsChatChannel},
    ui,
    usecases::{
        self,
        bootstrap::bootstrap,
        context::AppContext,
        contracts::{AuthToken, TokenSource},
        session::{OpenSessionError, RealtimeChatSession},
        unread::{fetch_unread_count, UnreadCountError},
    },
};

const LOGIN_HINT: &str = "No stored token. Run `rentchat login --user-id <id>` first.";

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap(cli.config.as_deref())?;

    tracing::debug!(
        domain = domain::module_name(),
        usecases = usecases::module_name(),
        infra = infra::module_name(),
        marketplace = marketplace::module_name(),
        ui = ui::module_name(),
        "application layers loaded"
    );

    match cli.command {
        Command::Login { user_id } => login(&context, user_id),
        Command::Logout => logout(&context),
        Command::Unread { booking_id } => unread(&context, booking_id),
        Command::Open { booking_id } => open_chat(&context, booking_id),
    }
}

fn login(context: &AppContext, user_id: i64) -> Result<()> {
    let token = rpassword::prompt_password("Marketplace API token: ")
        .context("failed to read token from the terminal")?;
    let token = token.trim();
    if token.is_empty() {
        bail!("token must not be empty");
    }

    context.tokens.save(&AuthToken {
        bearer: token.to_owned(),
        user_id,
    })?;

    tracing::debug!(
        token = %infra::secrets::token_fingerprint(token),
        user_id,
        "auth session stored"
    );
    println!("Token stored. You can now open booking chats.");
    Ok(())
}

fn logout(context: &AppContext) -> Result<()> {
    if context.tokens.clear()? {
        println!("Logged out.");
    } else {
        println!("No stored session to remove.");
    }
    Ok(())
}

fn unread(context: &AppContext, booking_id: i64) -> Result<()> {
    let runtime = build_runtime()?;
    let api = HttpChatApi::new(runtime.handle().clone(), &context.config.api)?;

    match fetch_unread_count(&api, &context.tokens, booking_id) {
        Ok(count) => {
            println!("{}", unread_line(count, booking_id));
            Ok(())
        }
        Err(UnreadCountError::AuthMissing) => bail!("{LOGIN_HINT}"),
        Err(error) => bail!("unread count query failed: {error:?}"),
    }
}

fn open_chat(context: &AppContext, booking_id: i64) -> Result<()> {
    let Some(auth) = context.tokens.read_token() else {
        bail!("{LOGIN_HINT}");
    };

    let runtime = build_runtime()?;
    let api = HttpChatApi::new(runtime.handle().clone(), &context.config.api)?;

    let (tx, rx) = mpsc::channel();
    let channel_tx = tx.clone();
    let channel = WsChatChannel::connect(
        runtime.handle(),
        &context.config.channel.ws_url,
        move |event| {
            let _ = channel_tx.send(AppEvent::Channel(event));
        },
    )
    .with_context(|| {
        format!(
            "could not reach the realtime channel at {}",
            context.config.channel.ws_url
        )
    })?;

    ui::shell::spawn_stdin_reader(tx)?;

    let mut session = RealtimeChatSession::new(api, channel, context.tokens.clone());
    match session.open(booking_id) {
        Ok(()) => {}
        Err(OpenSessionError::AuthMissing) => bail!("{LOGIN_HINT}"),
        Err(OpenSessionError::HistoryFetchFailed(error)) => {
            bail!("could not load the chat history for booking {booking_id}: {error:?}")
        }
    }

    tracing::debug!(
        booking_id = session.booking_id(),
        subscription = session.subscription().as_label(),
        "chat session opened"
    );
    if session.subscription() == SubscriptionState::Failed {
        eprintln!("Live updates are unavailable; showing history only. Reopen to retry.");
    }

    ui::shell::run(&mut session, auth.user_id, &rx)
}

fn build_runtime() -> Result<Runtime, AppError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(AppError::RuntimeInit)
}

fn unread_line(count: u64, booking_id: i64) -> String {
    match count {
        0 => format!("No unread messages for booking {booking_id}."),
        1 => format!("1 unread message for booking {booking_id}."),
        n => format!("{n} unread messages for booking {booking_id}."),
    }
}
