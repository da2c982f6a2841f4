//! # steward-notify
//!
//! Terminal front end for Steward member notifications.
//!
//! - **watch** follows a member's feed live: bootstrap fetch, push channel
//!   and terminal alerts, with `read <id>`, `open <id>` and `all` typed on
//!   stdin
//! - **list** prints the current feed grouped by type
//! - **read** / **read-all** update read-state on the backend
//! - **send** composes a notification for a member, group, department or
//!   the whole congregation

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use steward_client::{
    group_by_type, open_notification, unread_summary, ClientConfig, LinkOpener, NotificationContext,
    TerminalAlerter,
};
use steward_net::{HttpBackend, NotificationBackend};
use steward_shared::{
    NotificationId, NotificationRecord, NotificationSnapshot, NotificationTarget, OutgoingNotification,
    RecipientId,
};

#[derive(Parser, Debug)]
#[command(name = "steward-notify")]
#[command(about = "Follow and manage Steward member notifications")]
#[command(version)]
struct Cli {
    /// REST API base URL (overrides STEWARD_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Push-channel origin (overrides STEWARD_SOCKET_URL)
    #[arg(long, global = true)]
    socket_url: Option<String>,

    /// Member whose notifications are used (overrides STEWARD_MEMBER_ID)
    #[arg(short, long, global = true)]
    member: Option<RecipientId>,

    /// Do not ring the terminal bell on new notifications
    #[arg(long, global = true)]
    no_sound: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the member's notifications until Ctrl+C
    Watch,

    /// Print the member's notifications grouped by type
    List {
        /// Print raw JSON instead of the grouped view
        #[arg(long)]
        json: bool,
    },

    /// Mark one notification read
    Read {
        id: String,
    },

    /// Mark all of the member's notifications read
    ReadAll,

    /// Send a notification
    Send(SendArgs),
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["to", "group", "department", "global"])
))]
struct SendArgs {
    /// Recipient member ID
    #[arg(long)]
    to: Option<RecipientId>,

    /// Recipient group ID
    #[arg(long)]
    group: Option<String>,

    /// Recipient department ID
    #[arg(long)]
    department: Option<String>,

    /// Send to every member
    #[arg(long)]
    global: bool,

    #[arg(long)]
    title: String,

    #[arg(long)]
    message: String,

    /// Skip the email copy
    #[arg(long)]
    no_email: bool,

    /// Also deliver by SMS
    #[arg(long)]
    sms: bool,
}

impl SendArgs {
    fn into_notification(self) -> OutgoingNotification {
        let target = if let Some(member) = self.to {
            NotificationTarget::Member(member)
        } else if let Some(group) = self.group {
            NotificationTarget::Group(group)
        } else if let Some(department) = self.department {
            NotificationTarget::Department(department)
        } else {
            NotificationTarget::Global
        };

        let mut notification = OutgoingNotification::new(target, self.title, self.message);
        notification.via_email = !self.no_email;
        notification.via_sms = self.sms;
        notification
    }
}

/// Prints deep links instead of launching a browser.
struct PrintOpener;

impl LinkOpener for PrintOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        println!("  -> {url}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,steward_client=debug,steward_net=debug")),
        )
        .init();

    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Load configuration, then apply command-line overrides
    // -----------------------------------------------------------------------
    let mut config = ClientConfig::from_env();
    if let Some(api_url) = &cli.api_url {
        config = config.with_api_url(api_url);
    }
    if let Some(socket_url) = &cli.socket_url {
        config.socket_url = socket_url.trim().to_string();
    }
    if cli.member.is_some() {
        config.member_id = cli.member;
    }
    if cli.no_sound {
        config.sound = false;
    }
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Run the command
    // -----------------------------------------------------------------------
    match cli.command {
        Command::Watch => watch(&config).await,
        Command::List { json } => list(&config, json).await,
        Command::Read { id } => {
            let backend = HttpBackend::new(&config.api_url, config.http_timeout)?;
            let id = NotificationId::new(id);
            backend.mark_read(&id).await.context("marking notification read")?;
            println!("Marked {id} read");
            Ok(())
        }
        Command::ReadAll => {
            let member = require_member(&config)?;
            let backend = HttpBackend::new(&config.api_url, config.http_timeout)?;
            backend
                .mark_all_read(member)
                .await
                .context("marking all notifications read")?;
            println!("Marked all notifications read for member {member}");
            Ok(())
        }
        Command::Send(args) => {
            let backend = HttpBackend::new(&config.api_url, config.http_timeout)?;
            let notification = args.into_notification();
            backend.send(&notification).await.context("sending notification")?;
            println!("Notification sent");
            Ok(())
        }
    }
}

fn require_member(config: &ClientConfig) -> anyhow::Result<RecipientId> {
    match config.member_id {
        Some(member) => Ok(member),
        None => bail!("no member selected; pass --member or set STEWARD_MEMBER_ID"),
    }
}

async fn list(config: &ClientConfig, json: bool) -> anyhow::Result<()> {
    let member = require_member(config)?;
    let backend = HttpBackend::new(&config.api_url, config.http_timeout)?;
    let records = backend
        .fetch_notifications(member)
        .await
        .context("fetching notifications")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let unread = records.iter().filter(|r| !r.is_read).count();
    println!("{}", unread_summary(unread));
    for group in group_by_type(&records) {
        println!();
        println!("{} ({})", group.kind, group.items.len());
        for record in group.items {
            print_record(record);
        }
    }
    Ok(())
}

async fn watch(config: &ClientConfig) -> anyhow::Result<()> {
    let member = require_member(config)?;
    let ctx = NotificationContext::from_config(config, Arc::new(TerminalAlerter::new(config.sound)))?;
    ctx.set_recipient(Some(member));

    let mut snapshots = ctx.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(member = %member, "Watching notifications (Ctrl+C to stop)");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                render(&snapshot);
            }
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if !run_interactive(&ctx, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => stdin_open = false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                    }
                }
            }
        }
    }

    ctx.deactivate();
    Ok(())
}

/// Handle one typed command. Returns `false` to stop watching.
async fn run_interactive(ctx: &NotificationContext, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (None, _) => {}
        (Some("quit" | "q"), _) => return false,
        (Some("all"), None) => match ctx.mark_all_as_read().await {
            Ok(true) => println!("All notifications marked read"),
            Ok(false) => println!("No member selected"),
            Err(e) => println!("Could not mark all read: {e}"),
        },
        (Some("read"), Some(id)) => {
            if let Err(e) = ctx.mark_as_read(&NotificationId::new(id)).await {
                println!("Could not mark {id} read: {e}");
            }
        }
        (Some("open"), Some(id)) => {
            if let Err(e) = open_notification(ctx, &NotificationId::new(id), &PrintOpener).await {
                println!("Could not mark {id} read: {e}");
            }
        }
        _ => println!("commands: read <id> | open <id> | all | quit"),
    }
    true
}

fn render(snapshot: &NotificationSnapshot) {
    println!();
    println!("{}", unread_summary(snapshot.unread_count));
    for record in snapshot.notifications.iter().take(10) {
        print_record(record);
    }
    if snapshot.notifications.len() > 10 {
        println!("  ... {} more", snapshot.notifications.len() - 10);
    }
}

fn print_record(record: &NotificationRecord) {
    let marker = if record.is_read { ' ' } else { '*' };
    let when = record
        .created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    println!("{marker} [{}] {} - {} {when}", record.id, record.title, record.message);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send_args(argv: &[&str]) -> SendArgs {
        let mut full = vec!["steward-notify", "send"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Command::Send(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_send_to_department() {
        let notification =
            send_args(&["--department", "youth", "--title", "Retreat", "--message", "Bus leaves at 8", "--sms"])
                .into_notification();
        assert_eq!(notification.target, NotificationTarget::Department("youth".into()));
        assert!(notification.via_email);
        assert!(notification.via_sms);
    }

    #[test]
    fn test_send_global_without_email() {
        let notification =
            send_args(&["--global", "--title", "Service", "--message", "Moved to 11am", "--no-email"]).into_notification();
        assert_eq!(notification.target, NotificationTarget::Global);
        assert!(!notification.via_email);
    }

    #[test]
    fn test_send_requires_a_single_target() {
        let base = ["steward-notify", "send", "--title", "t", "--message", "m"];
        assert!(Cli::try_parse_from(base).is_err());

        let mut both = base.to_vec();
        both.extend_from_slice(&["--to", "4", "--global"]);
        assert!(Cli::try_parse_from(both).is_err());
    }

    #[test]
    fn test_member_flag_parses_recipient() {
        let cli = Cli::try_parse_from(["steward-notify", "--member", "12", "read-all"]).unwrap();
        assert_eq!(cli.member.map(|m| m.get()), Some(12));
        assert!(Cli::try_parse_from(["steward-notify", "--member", "0", "read-all"]).is_err());
    }
}
