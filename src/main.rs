use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use regattaboard_chat::api::models::UserData;
use regattaboard_chat::chat::format::{initials, last_message_time, time_to_string};
use regattaboard_chat::chat::CableConnector;
use regattaboard_chat::{ApiClient, ConversationStore, KeyValueStore, Settings};

#[derive(Parser)]
#[command(name = "regattaboard-chat")]
#[command(about = "RegattaBoard crew chat from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the access token
    Login { email: String, password: String },
    /// Forget the stored access token
    Logout,
    /// List conversations with unread counts
    List { user_id: String },
    /// Open a live chat with another user
    Chat {
        user_id: String,
        other_user_id: String,
        #[arg(long, default_value = "Me")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let settings = Settings::load();
    let tokens = KeyValueStore::open_default()?;
    let api = Arc::new(ApiClient::new(&settings, tokens.clone())?);
    let connector = Arc::new(CableConnector::new(&settings.ws_base)?);
    let mut store = ConversationStore::new(api.clone(), connector).with_environment(settings.api_environment());

    match cli.command {
        Command::Login { email, password } => {
            let token = api.login(&email, &password).await?;
            tokens.set_access_token(&token)?;
            log::info!("signed in as {}", email);
        }
        Command::Logout => {
            store.reset();
            tokens.clear_access_token()?;
            log::info!("signed out");
        }
        Command::List { user_id } => {
            store.load_conversations(false, None).await;
            if let Some(err) = store.error() {
                bail!("{}", err);
            }
            let now = Local::now();
            for conversation in store.conversations().unwrap_or_default() {
                println!(
                    "[{}] {} ({} unread) {}",
                    initials(&conversation.other_user.name),
                    conversation.other_user.name,
                    conversation.unread_count(&user_id),
                    last_message_time(conversation, now).unwrap_or_default(),
                );
            }
            println!("{} unread in total", store.unread_count(&UserData::reference(&user_id, "")));
        }
        Command::Chat {
            user_id,
            other_user_id,
            name,
        } => chat(&mut store, &tokens, UserData::reference(user_id, name), &other_user_id).await?,
    }
    Ok(())
}

async fn chat(
    store: &mut ConversationStore,
    tokens: &KeyValueStore,
    me: UserData,
    other_user_id: &str,
) -> anyhow::Result<()> {
    let token = tokens.access_token()?.context("not signed in, run `login` first")?;

    store.find_or_create_conversation(other_user_id, Some(&token)).await;
    if let Some(err) = store.error() {
        bail!("{}", err);
    }
    store.mark_messages_as_read(Some(&token)).await;

    for group in store.grouped_messages(Local::now()) {
        println!("--- {} ---", group.label);
        for message in group.messages {
            let at = time_to_string(message.created_at.with_timezone(&Local), true);
            println!("{} {}: {}", at, message.sender.name, message.content);
        }
    }

    let mut inbound = store.open_channel(&token, &me.id).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(text) if text.trim().is_empty() => {}
                Some(text) => store.send_message(&text, &me)?,
                None => break,
            },
            message = inbound.recv() => match message {
                Some(message) => {
                    if message.sender.id != me.id {
                        println!("{}: {}", message.sender.name, message.content);
                    }
                    store.receive_message(message, &me.id);
                }
                None => {
                    log::warn!("chat connection lost");
                    break;
                }
            },
        }
    }
    store.close_channel();
    Ok(())
}
