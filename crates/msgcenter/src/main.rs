//! `msgcenter` - message center demo
//!
//! Runs a scripted inbox session against session storage: loads the seeded
//! conversations, opens threads through the sanitizer, replies, and then
//! turns on failure injection to show optimistic rollback.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use msgcenter_core::{
    Config, ConversationId, OptimisticStore, SessionBackend, SessionStorage,
    ToastKind, seed_conversations,
};

type Store = OptimisticStore<SessionBackend>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "msgcenter=debug,msgcenter_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting msgcenter");

    let config = load_config().await?;
    let storage = SessionStorage::in_memory()
        .await
        .context("Failed to open session storage")?;
    let backend = SessionBackend::from_config(storage, &config);
    backend
        .initialize(&seed_conversations())
        .await
        .context("Failed to seed session storage")?;

    let store = OptimisticStore::from_config(Arc::new(backend), &config);
    run_session(&store).await?;

    store.backend().teardown().await?;
    info!("Session ended");
    Ok(())
}

/// Config file location: `<config dir>/msgcenter/config.json`.
fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("msgcenter")
        .join("config.json")
}

async fn load_config() -> anyhow::Result<Config> {
    let path = config_path();
    Config::load(&path)
        .await
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

async fn run_session(store: &Store) -> anyhow::Result<()> {
    store.load_conversations().await?;
    print_inbox(store);

    let Some(first) = store.conversations().first().map(|c| c.id.clone()) else {
        warn!("Inbox is empty, nothing to show");
        return Ok(());
    };

    store.select_conversation(Some(first.clone())).await?;
    print_thread(store);

    store
        .update_draft("<p>Thursday at 3pm works for me.</p>")
        .await?;
    match store
        .send_message("<p>Thursday at 3pm works for me.</p>")
        .await
    {
        Ok(message) => println!("Sent {} in {first}", message.id),
        Err(e) => println!("Send failed, draft kept: {e}"),
    }

    // The phishing thread only renders through the sanitizer.
    let hostile: Vec<ConversationId> = store
        .search("spam")
        .into_iter()
        .map(|c| c.id)
        .collect();
    for id in hostile {
        store.select_conversation(Some(id)).await?;
        print_thread(store);
    }
    store.select_conversation(None).await?;

    store.backend().failures().set_enabled(true);
    println!("\nFailure injection on");
    for conversation in store.conversations() {
        let outcome = store.toggle_star(&conversation.id).await?;
        println!("  star {:<4} {outcome:?}", conversation.id.as_str());
    }
    store.backend().failures().set_enabled(false);

    print_inbox(store);
    print_toasts(store);
    Ok(())
}

fn print_inbox(store: &Store) {
    println!("\nInbox ({} unread)", store.unread_count());
    for c in store.conversations() {
        println!(
            "  {} {} {:<32} {}",
            if c.is_read { ' ' } else { '*' },
            if c.is_starred { '★' } else { ' ' },
            c.subject,
            c.preview
        );
    }
}

fn print_thread(store: &Store) {
    let Some(thread) = store.selected_thread() else {
        return;
    };
    println!("\n{} [{}]", thread.subject, thread.labels.join(", "));
    for message in &thread.messages {
        let body = store.rendered_body(&message.id).unwrap_or_default();
        println!(
            "  {} at {}\n    {body}",
            message.sender.display(),
            message.timestamp.format("%Y-%m-%d %H:%M")
        );
        for attachment in &message.attachments {
            println!("    [{}] {}", attachment.name, attachment.url);
        }
    }
}

fn print_toasts(store: &Store) {
    let toasts = store.toasts();
    if toasts.is_empty() {
        return;
    }
    println!("\nNotifications");
    for toast in toasts {
        let marker = match toast.kind {
            ToastKind::Success => "ok",
            ToastKind::Error => "error",
            ToastKind::Info => "info",
        };
        println!("  [{marker}] {}", toast.message);
    }
}
