//! murmur: line-oriented chat client
//!
//! Commands:
//!   chat --room <name>   - join a room; stdin lines are broadcast
//!
//! Inside a chat:
//!   /msg <id> <text>          - private message
//!   /send <paths..>           - send files to the room
//!   /sendto <id> <paths..>    - send files to one peer
//!   /save <file id> [dir]     - write a completed transfer to disk
//!   /discard <file id>        - drop a transfer
//!   /peers, /transfers, /quit

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use murmur_client::{connect, ClientSession, Connection, SentFiles, SessionEvent};
use murmur_core::{FileControl, FileStart, ImagePayload, InnerMessage, MurmurConfig};
use murmur_crypto::RoomSecrets;
use murmur_transfer::media::{decode_data_url, extension_for};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "murmur",
    version,
    about = "murmur end-to-end encrypted chat",
    long_about = "murmur: chat and share files through a relay that never sees plaintext"
)]
struct Cli {
    /// Path to murmur.toml configuration file
    #[arg(long, short = 'c', env = "MURMUR_CONFIG", default_value = "murmur.toml")]
    config: PathBuf,

    /// Relay WebSocket URL (overrides client.relay_url)
    #[arg(long, env = "MURMUR_RELAY")]
    relay: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "MURMUR_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "MURMUR_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Join a room and chat
    Chat {
        /// Room name
        #[arg(long, short = 'r')]
        room: String,
        /// Room password (prompted when omitted)
        #[arg(long, env = "MURMUR_ROOM_PASSWORD")]
        password: Option<String>,
        /// Display name (overrides client.user_name)
        #[arg(long, short = 'n')]
        name: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let mut config = load_config(&cli.config).await?;
    if let Some(relay) = cli.relay {
        config.client.relay_url = relay;
    }

    match cli.command {
        Commands::Chat {
            room,
            password,
            name,
        } => cmd_chat(&config, &room, password, name).await,
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<MurmurConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        MurmurConfig::from_toml(&content)
            .with_context(|| format!("parsing config: {}", path.display()))
    } else {
        tracing::warn!("config file not found: {}  (using defaults)", path.display());
        Ok(MurmurConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("MURMUR_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_writer(std::io::stderr)).init(),
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).init(),
    }
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn fmt_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

// ── `murmur chat` ─────────────────────────────────────────────────────────────

/// Terminal-side view state: display names and progress bars.
struct View {
    progress: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    names: HashMap<String, String>,
    download_dir: PathBuf,
}

impl View {
    fn label(&self, client: &str) -> String {
        match self.names.get(client) {
            Some(name) => format!("{name}@{}", &client[..6.min(client.len())]),
            None => client.to_string(),
        }
    }

    fn say(&self, line: String) {
        let _ = self.progress.println(line);
    }

    fn bar(&mut self, file_id: &str, total: usize) -> &ProgressBar {
        let progress = &self.progress;
        self.bars.entry(file_id.to_string()).or_insert_with(|| {
            let pb = progress.add(ProgressBar::new(total as u64));
            pb.set_style(bar_style());
            pb.set_prefix(file_id.to_string());
            pb
        })
    }

    fn render(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Ready { client_id } => self.say(format!("connected as {client_id}")),
            SessionEvent::Joined { room_id, members } => self.say(format!(
                "joined room {} ({} other member{})",
                room_id.short(),
                members.len(),
                if members.len() == 1 { "" } else { "s" }
            )),
            SessionEvent::PeerJoined { client } => self.say(format!("* {client} joined")),
            SessionEvent::PeerReady { client, name } => {
                if !name.is_empty() {
                    self.names.insert(client.clone(), name);
                }
                self.say(format!("* {} is ready for private messages", self.label(&client)));
            }
            SessionEvent::PeerLeft {
                client,
                dropped_transfers,
            } => {
                self.say(format!("* {} left", self.label(&client)));
                for file_id in dropped_transfers {
                    if let Some(pb) = self.bars.remove(&file_id) {
                        pb.abandon_with_message("sender left");
                    }
                }
                self.names.remove(&client);
            }
            SessionEvent::Undeliverable { target } => {
                self.say(format!("! could not deliver to {target}"))
            }
            SessionEvent::Message {
                sender, message, ..
            } => self.render_message(&sender, message),
            SessionEvent::TransferProgress {
                file_id,
                done,
                total,
            } => {
                let pb = self.bar(&file_id, total);
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            }
            SessionEvent::TransferComplete { file_id } => {
                if let Some(pb) = self.bars.remove(&file_id) {
                    pb.finish_with_message("done");
                }
                self.say(format!("transfer {file_id} complete"));
            }
            SessionEvent::Disconnected => {
                self.say("disconnected from relay".to_string());
                return false;
            }
        }
        true
    }

    fn render_message(&mut self, sender: &str, message: InnerMessage) {
        let from = self.label(sender);
        match message {
            InnerMessage::Text(text) => self.say(format!("<{from}> {text}")),
            InnerMessage::TextPrivate(text) => self.say(format!("<{from} (private)> {text}")),
            InnerMessage::Image(images) => self.save_images(&from, sender, images, false),
            InnerMessage::ImagePrivate(images) => self.save_images(&from, sender, images, true),
            InnerMessage::FileStart(start) => self.offer(&from, &start, false),
            InnerMessage::FilePrivate(FileControl::FileStart(start)) => {
                self.offer(&from, &start, true)
            }
            other => tracing::debug!(kind = other.kind(), "not rendered"),
        }
    }

    fn offer(&mut self, from: &str, start: &FileStart, private: bool) {
        let what = match start.file_count {
            Some(n) if start.is_archive => format!("{n} files"),
            _ => start.file_name.clone(),
        };
        self.say(format!(
            "<{from}{}> offers {what} ({}), id {}",
            if private { " (private)" } else { "" },
            fmt_bytes(start.original_size),
            start.file_id
        ));
    }

    fn save_images(&self, from: &str, sender: &str, payload: ImagePayload, private: bool) {
        if !payload.text.is_empty() {
            self.say(format!("<{from}> {}", payload.text));
        }
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        for (i, url) in payload.images.iter().enumerate() {
            let saved = decode_data_url(url).and_then(|(mime, bytes)| {
                let path = self.download_dir.join(format!(
                    "image_{sender}_{stamp}_{i}.{}",
                    extension_for(&mime)
                ));
                std::fs::write(&path, &bytes)?;
                Ok((path, bytes.len()))
            });
            match saved {
                Ok((path, len)) => self.say(format!(
                    "<{from}{}> image saved to {} ({})",
                    if private { " (private)" } else { "" },
                    path.display(),
                    fmt_bytes(len as u64)
                )),
                Err(e) => self.say(format!("! image from {from} unreadable: {e}")),
            }
        }
    }
}

async fn cmd_chat(
    config: &MurmurConfig,
    room: &str,
    password: Option<String>,
    name: Option<String>,
) -> Result<()> {
    let password = match password {
        Some(p) => p,
        None => rpassword::prompt_password("room password: ").context("reading password")?,
    };
    let user_name = name.unwrap_or_else(|| config.client.user_name.clone());

    let spinner = make_spinner("room");
    spinner.set_message("deriving room key...");
    let room_name = room.to_string();
    let secrets = tokio::task::spawn_blocking(move || RoomSecrets::derive(&room_name, &password))
        .await
        .context("key derivation task")??;
    spinner.finish_with_message(format!("room id {}", secrets.id.short()));

    let session =
        ClientSession::new(secrets, user_name).with_transfer_config(config.transfer.clone());
    let (conn, mut events) = connect(&config.client.relay_url, session)
        .await
        .with_context(|| format!("connecting to {}", config.client.relay_url))?;
    let conn = Arc::new(conn);

    let mut view = View {
        progress: MultiProgress::new(),
        bars: HashMap::new(),
        names: HashMap::new(),
        download_dir: config.client.download_dir.clone(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if !view.render(event) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                if !run_command(&conn, &view, line.trim()).await {
                    break;
                }
            }
        }
    }

    if let Ok(conn) = Arc::try_unwrap(conn) {
        conn.close().await;
    }
    Ok(())
}

/// Execute one input line. Returns false on `/quit`.
async fn run_command(conn: &Arc<Connection>, view: &View, line: &str) -> bool {
    if line.is_empty() {
        return true;
    }
    let Some(command) = line.strip_prefix('/') else {
        if let Err(e) = conn.send_text(line).await {
            view.say(format!("! {e}"));
        }
        return true;
    };

    let mut parts = command.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    match (verb, args.as_slice()) {
        ("quit", _) => return false,
        ("msg", [target, ..]) => {
            let text = command
                .splitn(3, char::is_whitespace)
                .nth(2)
                .unwrap_or_default()
                .trim();
            if let Err(e) = conn.send_private_text(target, text).await {
                view.say(format!("! {e}"));
            }
        }
        ("send", paths) if !paths.is_empty() => spawn_send(conn, view, paths, None),
        ("sendto", [target, paths @ ..]) if !paths.is_empty() => {
            spawn_send(conn, view, paths, Some(target.to_string()))
        }
        ("save", [file_id, rest @ ..]) => {
            let dir = rest
                .first()
                .map(PathBuf::from)
                .unwrap_or_else(|| view.download_dir.clone());
            match conn.save(file_id, &dir).await {
                Ok(paths) => {
                    for path in paths {
                        view.say(format!("saved {}", path.display()));
                    }
                }
                Err(e) => view.say(format!("! {e}")),
            }
        }
        ("discard", [file_id]) => {
            if conn.discard(file_id).await {
                view.say(format!("discarded {file_id}"));
            } else {
                view.say(format!("! no transfer {file_id}"));
            }
        }
        ("peers", _) => {
            let peers = conn.peers().await;
            if peers.is_empty() {
                view.say("no peers".to_string());
            }
            for peer in peers {
                view.say(format!(
                    "  {}  {:<16}  {}",
                    peer.client,
                    peer.name.as_deref().unwrap_or("-"),
                    if peer.ready { "ready" } else { "no key yet" }
                ));
            }
        }
        ("transfers", _) => {
            let transfers = conn.transfers().await;
            if transfers.is_empty() {
                view.say("no transfers".to_string());
            }
            for t in transfers {
                view.say(format!(
                    "  {}  {:?}  {:<24}  {}  {}/{}",
                    t.file_id, t.direction, t.file_name, t.status, t.done, t.total
                ));
            }
        }
        _ => view.say(format!("! unknown command: /{command}")),
    }
    true
}

fn spawn_send(conn: &Arc<Connection>, view: &View, paths: &[&str], target: Option<String>) {
    let conn = conn.clone();
    let progress = view.progress.clone();
    let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
    tokio::spawn(async move {
        let line = match conn.send_files(paths, target).await {
            Ok(SentFiles::Inline { images }) => format!("sent {images} image(s) inline"),
            Ok(SentFiles::Transfer { file_id, volumes }) => {
                format!("sent {file_id} in {volumes} volume(s)")
            }
            Err(e) => format!("! send failed: {e}"),
        };
        let _ = progress.println(line);
    });
}
