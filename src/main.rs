use std::sync::Arc;

use chatapp::backend::HttpBackend;
use chatapp::chats::ChatStore;
use chatapp::config::{ClientConfig, derive_ws_base_url};
use chatapp::error::ClientError;
use chatapp::format::{datetime_format, format_message_time_short};
use chatapp::members::MemberDraft;
use chatapp::route::Route;
use chatapp::session::{SESSION_EXPIRED_NOTICE, Session, SessionClient};
use chatapp::socket::SocketEvent;
use chatapp::types::{ChatMessage, ChatPreview};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{0}")]
    Rejected(String),
    #[error("chat {0} is not in your chat list")]
    UnknownChat(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chatapp", about = "ChatApp session, chat and live message CLI")]
struct Cli {
    #[arg(long, env = "CHATAPP_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "CHATAPP_WS_BASE_URL")]
    ws_base_url: Option<String>,

    #[arg(long, env = "CHATAPP_SESSION_ID")]
    session_id: Option<String>,

    #[arg(long, env = "CHATAPP_USERNAME", help = "Your username, used to reject adding yourself")]
    username: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether the session cookie is still valid.
    Session,
    Login {
        username: String,
        #[arg(long, env = "CHATAPP_PASSWORD")]
        password: String,
        #[arg(long, default_value_t = false)]
        remember_me: bool,
    },
    Signup {
        username: String,
        #[arg(long, env = "CHATAPP_PASSWORD")]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },
    Logout,
    Chats(ChatsCommand),
    Users(UsersCommand),
}

#[derive(Args, Debug)]
struct ChatsCommand {
    #[command(subcommand)]
    command: ChatsSubcommand,
}

#[derive(Subcommand, Debug)]
enum ChatsSubcommand {
    List {
        #[arg(long, default_value_t = false, help = "List public chats you can join")]
        available: bool,
    },
    Create {
        name: String,
        #[arg(long = "member", help = "Username to add; repeatable")]
        members: Vec<String>,
        #[arg(long, default_value_t = false)]
        public: bool,
    },
    History {
        chat_id: String,
        #[arg(long, default_value_t = 1)]
        pages: usize,
    },
    /// Stream new messages from every chat until interrupted.
    Watch,
    Send {
        chat_id: String,
        content: String,
    },
}

#[derive(Args, Debug)]
struct UsersCommand {
    #[command(subcommand)]
    command: UsersSubcommand,
}

#[derive(Subcommand, Debug)]
enum UsersSubcommand {
    Lookup { username: String },
}

struct CliContext {
    backend: Arc<HttpBackend>,
    session: Session,
    page_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("ignoring .env: {e}");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "chatapp=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = client_config(&cli)?;
    let backend = Arc::new(HttpBackend::new(&config)?);
    if let Some(session_id) = &cli.session_id {
        backend.restore_session(session_id);
    }
    let session = cli.username.as_deref().map_or_else(Session::restored, Session::for_user);
    let ctx = CliContext { backend, session, page_size: config.history_page_size };

    match cli.command {
        Command::Session => run_session(&ctx).await,
        Command::Login { username, password, remember_me } => run_login(&ctx, &username, &password, remember_me).await,
        Command::Signup { username, password, confirm_password } => {
            run_signup(&ctx, &username, &password, &confirm_password).await
        }
        Command::Logout => run_logout(&ctx).await,
        Command::Chats(chats) => run_chats(&ctx, chats).await,
        Command::Users(users) => run_users(&ctx, users).await,
    }
}

fn client_config(cli: &Cli) -> Result<ClientConfig, ClientError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_owned();
        config.ws_base_url = derive_ws_base_url(&config.base_url)?;
    }
    if let Some(ws_base_url) = &cli.ws_base_url {
        config.ws_base_url = ws_base_url.trim_end_matches('/').to_owned();
    }
    Ok(config)
}

// =============================================================================
// SESSION
// =============================================================================

fn auth_result(client: &SessionClient<HttpBackend>) -> Result<(), CliError> {
    if client.state().is_error() {
        return Err(CliError::Rejected(client.error().to_owned()));
    }
    Ok(())
}

async fn run_session(ctx: &CliContext) -> Result<(), CliError> {
    let mut client = SessionClient::new(ctx.backend.clone());
    client.check_session().await;
    auth_result(&client)?;
    println!("session valid");
    Ok(())
}

async fn run_login(ctx: &CliContext, username: &str, password: &str, remember_me: bool) -> Result<(), CliError> {
    let mut client = SessionClient::new(ctx.backend.clone());
    client.login(username, password, remember_me).await;
    auth_result(&client)?;
    print_session_id(&ctx.backend);
    Ok(())
}

async fn run_signup(ctx: &CliContext, username: &str, password: &str, confirm: &str) -> Result<(), CliError> {
    let mut client = SessionClient::new(ctx.backend.clone());
    client.signup(username, password, confirm).await;
    auth_result(&client)?;
    print_session_id(&ctx.backend);
    Ok(())
}

async fn run_logout(ctx: &CliContext) -> Result<(), CliError> {
    let mut client = SessionClient::new(ctx.backend.clone());
    client.logout().await;
    auth_result(&client)?;
    println!("logged out");
    Ok(())
}

fn print_session_id(backend: &HttpBackend) {
    match backend.session_id() {
        Some(session_id) => println!("session_id={session_id}"),
        None => eprintln!("logged in, but the backend set no session cookie"),
    }
}

// =============================================================================
// CHATS
// =============================================================================

async fn run_chats(ctx: &CliContext, chats: ChatsCommand) -> Result<(), CliError> {
    let mut store = ChatStore::new(ctx.backend.clone(), ctx.session.clone(), ctx.page_size);
    match chats.command {
        ChatsSubcommand::List { available } => chats_list(&mut store, available).await,
        ChatsSubcommand::Create { name, members, public } => {
            chats_create(ctx, &mut store, &name, &members, public).await
        }
        ChatsSubcommand::History { chat_id, pages } => chats_history(&mut store, &chat_id, pages).await,
        ChatsSubcommand::Watch => chats_watch(&mut store).await,
        ChatsSubcommand::Send { chat_id, content } => chats_send(&mut store, &chat_id, &content).await,
    }
}

/// Fail when the store asked for the expired-session login screen.
fn check_navigation(store: &mut ChatStore<HttpBackend>) -> Result<Option<Route>, CliError> {
    match store.take_navigation() {
        Some(Route::Login { session_expired: true }) => Err(CliError::Rejected(SESSION_EXPIRED_NOTICE.to_owned())),
        other => Ok(other),
    }
}

async fn load_previews(store: &mut ChatStore<HttpBackend>) -> Result<(), CliError> {
    store.fetch_chat_previews().await;
    check_navigation(store)?;
    if store.previews_state().is_error() {
        return Err(CliError::Rejected(store.previews_state().error().to_owned()));
    }
    Ok(())
}

async fn chats_list(store: &mut ChatStore<HttpBackend>, available: bool) -> Result<(), CliError> {
    let now = chrono::Local::now();
    if available {
        store.fetch_available_chats().await;
        check_navigation(store)?;
        if store.available_state().is_error() {
            return Err(CliError::Rejected(store.available_state().error().to_owned()));
        }
        for preview in store.available_chats() {
            print_preview(preview, &now);
        }
        return Ok(());
    }

    load_previews(store).await?;
    for preview in store.sorted_chat_previews() {
        print_preview(preview, &now);
    }
    Ok(())
}

async fn chats_create(
    ctx: &CliContext,
    store: &mut ChatStore<HttpBackend>,
    name: &str,
    usernames: &[String],
    public: bool,
) -> Result<(), CliError> {
    let mut draft = MemberDraft::new();
    for username in usernames {
        if !draft.add_member(ctx.backend.as_ref(), &ctx.session, username).await {
            return Err(CliError::Rejected(draft.error().unwrap_or_default().to_owned()));
        }
    }

    store.create_chat(name, draft.into_members(), public).await;
    match check_navigation(store)? {
        Some(Route::Chat(chat_id)) => {
            if let Some(preview) = store.chat_preview(&chat_id) {
                print_json(preview)?;
            }
            Ok(())
        }
        _ => Err(CliError::Rejected(store.previews_state().error().to_owned())),
    }
}

async fn chats_history(store: &mut ChatStore<HttpBackend>, chat_id: &str, pages: usize) -> Result<(), CliError> {
    for _ in 0..pages.max(1) {
        store.fetch_history(chat_id).await;
        check_navigation(store)?;
        if store.history_state().is_error() {
            return Err(CliError::Rejected(store.history_state().error().to_owned()));
        }
        if store.details(chat_id).is_some_and(|details| details.is_exhausted()) {
            break;
        }
    }

    let now = chrono::Local::now();
    for message in store.messages(chat_id) {
        print_message(chat_id, message, &now);
    }
    Ok(())
}

async fn chats_watch(store: &mut ChatStore<HttpBackend>) -> Result<(), CliError> {
    load_previews(store).await?;
    let opened = store.connect_sockets();
    eprintln!("watching {opened} chats; press Ctrl-C to stop");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            signal = &mut shutdown => {
                signal?;
                break;
            }
            event = store.next_socket_event() => {
                let Some(event) = event else { break };
                match &event {
                    SocketEvent::Message { chat_id, message, .. } => {
                        print_message(chat_id, message, &chrono::Local::now());
                    }
                    SocketEvent::Closed { chat_id, reason, .. } => {
                        eprintln!("chat {chat_id} closed: {}", reason.as_deref().unwrap_or("by server"));
                    }
                }
                store.apply_socket_event(event);
                if store.sockets().is_empty() {
                    eprintln!("all chat sockets closed");
                    break;
                }
            }
        }
    }
    store.reset();
    Ok(())
}

async fn chats_send(store: &mut ChatStore<HttpBackend>, chat_id: &str, content: &str) -> Result<(), CliError> {
    load_previews(store).await?;
    if store.chat_preview(chat_id).is_none() {
        return Err(CliError::UnknownChat(chat_id.to_owned()));
    }

    store.connect_socket(chat_id);
    store.send_message(chat_id, content)?;
    store.close_socket(chat_id).await;

    while let Some(event) = store.try_next_socket_event() {
        if let SocketEvent::Closed { chat_id: closed, reason: Some(reason), .. } = &event {
            if closed == chat_id {
                return Err(CliError::Rejected(reason.clone()));
            }
        }
        store.apply_socket_event(event);
    }
    println!("sent");
    Ok(())
}

// =============================================================================
// USERS
// =============================================================================

async fn run_users(ctx: &CliContext, users: UsersCommand) -> Result<(), CliError> {
    match users.command {
        UsersSubcommand::Lookup { username } => {
            let mut draft = MemberDraft::new();
            if !draft.add_member(ctx.backend.as_ref(), &ctx.session, &username).await {
                return Err(CliError::Rejected(draft.error().unwrap_or_default().to_owned()));
            }
            for user_id in draft.members() {
                println!("{user_id}");
            }
            Ok(())
        }
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_preview(preview: &ChatPreview, now: &chrono::DateTime<chrono::Local>) {
    let when = preview
        .activity_at()
        .map(|at| format_message_time_short(&at, now))
        .unwrap_or_default();
    let last = preview.last_message.as_ref().map_or("", |message| message.content.as_str());
    println!("{}\t{}\t{when}\t{last}", preview.chat_id, preview.chat_name);
}

fn print_message(chat_id: &str, message: &ChatMessage, now: &chrono::DateTime<chrono::Local>) {
    let sender = message.sender_username.as_deref().unwrap_or(&message.sender_id);
    println!("[{chat_id}] {} {sender}: {}", datetime_format(&message.timestamp, now, false), message.content);
}
